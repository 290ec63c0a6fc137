//! Configuration for the audio engine

use crate::error::{AudioError, Result};

#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Output channel count requested from every device (stereo by default)
    pub channels: u16,
    /// Fixed device block size in frames (None = backend default)
    pub block_size: Option<u32>,
    /// Initial registry capacity for sound and music sources
    pub max_sources: usize,
    /// Initial registry capacity for listeners
    pub max_listeners: usize,
    /// Capacity of the bounded event queue polled by the host
    pub event_capacity: usize,
    /// Open a device as part of `AudioEngine::initialize`
    pub open_default_device: bool,
    /// Device name preferred when opening a device automatically
    pub preferred_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            block_size: None,
            max_sources: 64,
            max_listeners: 4,
            event_capacity: 256,
            open_default_device: true,
            preferred_device: None,
        }
    }
}

impl AudioConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn block_size(mut self, frames: u32) -> Self {
        self.block_size = Some(frames);
        self
    }

    pub fn max_sources(mut self, max: usize) -> Self {
        self.max_sources = max;
        self
    }

    pub fn max_listeners(mut self, max: usize) -> Self {
        self.max_listeners = max;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn open_default_device(mut self, open: bool) -> Self {
        self.open_default_device = open;
        self
    }

    pub fn preferred_device(mut self, name: impl Into<String>) -> Self {
        self.preferred_device = Some(name.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(AudioError::Configuration(
                "Output channel count must be greater than 0".to_string(),
            ));
        }

        if self.block_size == Some(0) {
            return Err(AudioError::Configuration(
                "Block size must be greater than 0".to_string(),
            ));
        }

        if self.event_capacity == 0 {
            return Err(AudioError::Configuration(
                "Event capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_stereo_and_valid() {
        let config = AudioConfig::default();
        assert_eq!(config.channels, 2);
        assert!(config.block_size.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = AudioConfig::new()
            .channels(4)
            .block_size(256)
            .max_sources(8)
            .preferred_device("Headphones")
            .open_default_device(false);

        assert_eq!(config.channels, 4);
        assert_eq!(config.block_size, Some(256));
        assert_eq!(config.max_sources, 8);
        assert_eq!(config.preferred_device.as_deref(), Some("Headphones"));
        assert!(!config.open_default_device);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(AudioConfig::new().channels(0).validate().is_err());
        assert!(AudioConfig::new().block_size(0).validate().is_err());
        assert!(AudioConfig::new().event_capacity(0).validate().is_err());
    }
}
