//! Registry of sound-bearing components currently attached to entities.
//!
//! The registry holds handles only; the components themselves live in the
//! engine's slot storage. It performs no locking of its own: every call is made
//! with the engine's mixer lock held.

use crate::source::{ListenerHandle, SoundHandle};

#[derive(Debug, Default)]
pub struct Registry {
    sources: Vec<SoundHandle>,
    listeners: Vec<ListenerHandle>,
}

impl Registry {
    pub fn with_capacity(sources: usize, listeners: usize) -> Self {
        Self {
            sources: Vec::with_capacity(sources),
            listeners: Vec::with_capacity(listeners),
        }
    }

    /// Returns false if the source was already registered.
    pub fn add_source(&mut self, source: SoundHandle) -> bool {
        insert_unique(&mut self.sources, source)
    }

    /// Returns false if the source was not registered.
    pub fn remove_source(&mut self, source: SoundHandle) -> bool {
        swap_remove_item(&mut self.sources, source)
    }

    pub fn add_listener(&mut self, listener: ListenerHandle) -> bool {
        insert_unique(&mut self.listeners, listener)
    }

    pub fn remove_listener(&mut self, listener: ListenerHandle) -> bool {
        swap_remove_item(&mut self.listeners, listener)
    }

    /// Registered sources in unspecified order.
    pub fn sources(&self) -> &[SoundHandle] {
        &self.sources
    }

    /// Registered listeners in unspecified order.
    pub fn listeners(&self) -> &[ListenerHandle] {
        &self.listeners
    }

    pub fn contains_source(&self, source: SoundHandle) -> bool {
        self.sources.contains(&source)
    }

    pub fn contains_listener(&self, listener: ListenerHandle) -> bool {
        self.listeners.contains(&listener)
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.listeners.is_empty()
    }
}

fn insert_unique<T: PartialEq>(items: &mut Vec<T>, item: T) -> bool {
    if items.contains(&item) {
        return false;
    }
    items.push(item);
    true
}

fn swap_remove_item<T: PartialEq>(items: &mut Vec<T>, item: T) -> bool {
    match items.iter().position(|existing| *existing == item) {
        Some(index) => {
            items.swap_remove(index);
            true
        }
        None => false,
    }
}
