//! Generation-counted storage for components owned by the engine.
//!
//! A [`SlotKey`] combines an index with a generation so that a key handed out
//! for a component that has since been removed never resolves to whatever
//! component later reuses the same index.

/// Index plus generation identifying one occupied slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub index: u32,
    pub generation: u32,
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug, Clone)]
pub(crate) struct Slots<T> {
    entries: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Slots<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Stores `value`, reusing a freed slot (with a bumped generation) when one exists.
    pub fn insert(&mut self, value: T) -> SlotKey {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.entries[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.value = Some(value);
            SlotKey {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.entries.len() as u32;
            self.entries.push(Slot {
                generation: 0,
                value: Some(value),
            });
            SlotKey {
                index,
                generation: 0,
            }
        }
    }

    pub fn remove(&mut self, key: SlotKey) -> Option<T> {
        let slot = self.entries.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let value = slot.value.take()?;
        self.free.push(key.index);
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, key: SlotKey) -> Option<&T> {
        self.entries
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut T> {
        self.entries
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn contains(&self, key: SlotKey) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }
}
