//! Error types for soundstage

use crate::device::DeviceState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Audio output is not ready (state: {0:?})")]
    NotReady(DeviceState),

    #[error("Invalid device index {index} (device count: {count})")]
    InvalidDeviceIndex { index: usize, count: usize },

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Failed to start audio device: {0}")]
    DeviceStart(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("Resampling error: {0}")]
    Resample(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Property '{property}' expects {expected}, got {found}")]
    PropertyType {
        property: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid value for property '{property}': {reason}")]
    InvalidValue { property: String, reason: String },

    #[error("Unknown property '{0}'")]
    UnknownProperty(String),

    #[error("Property '{0}' is read-only")]
    ReadOnlyProperty(String),

    #[error("Stale binding: {0}")]
    StaleBinding(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;
