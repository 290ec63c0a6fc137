//! Event types reported to the host

use crate::source::SoundHandle;
use crossbeam_channel::{Receiver, Sender};

#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    /// A non-repeating source reached its last frame and stopped.
    SourceCompleted { source: SoundHandle },
    /// A repeating source wrapped back to frame 0.
    SourceLooped { source: SoundHandle },
    DeviceChanged { device_name: String },
    DeviceClosed,
}

impl AudioEvent {
    pub fn source(&self) -> Option<SoundHandle> {
        match self {
            Self::SourceCompleted { source } | Self::SourceLooped { source } => Some(*source),
            _ => None,
        }
    }

    pub fn is_device_event(&self) -> bool {
        matches!(self, Self::DeviceChanged { .. } | Self::DeviceClosed)
    }
}

/// Sending half of the bounded event queue.
///
/// `emit` never blocks; when the host stops polling, new events are dropped.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    sender: Sender<AudioEvent>,
}

impl EventSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<AudioEvent>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: AudioEvent) {
        let _ = self.sender.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::SlotKey;

    fn handle() -> SoundHandle {
        SoundHandle(SlotKey {
            index: 3,
            generation: 1,
        })
    }

    #[test]
    fn test_event_accessors() {
        let looped = AudioEvent::SourceLooped { source: handle() };
        assert_eq!(looped.source(), Some(handle()));
        assert!(!looped.is_device_event());

        let changed = AudioEvent::DeviceChanged {
            device_name: "Speakers".into(),
        };
        assert_eq!(changed.source(), None);
        assert!(changed.is_device_event());
    }

    #[test]
    fn test_full_queue_drops_events() {
        let (sink, receiver) = EventSink::bounded(1);
        sink.emit(AudioEvent::DeviceClosed);
        sink.emit(AudioEvent::SourceCompleted { source: handle() });

        let events: Vec<_> = receiver.try_iter().collect();
        assert_eq!(events, vec![AudioEvent::DeviceClosed]);
    }
}
