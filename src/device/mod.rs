//! Output device enumeration and lifecycle.
//!
//! [`DeviceManager`] owns the backend and at most one open [`OutputDevice`].
//! It has its own lock, separate from the engine's mixer lock, and never takes
//! the mixer lock itself: stopping a device waits for its callback thread to
//! finish, and that callback may be waiting for the mixer lock.

mod backend;
mod cpal_backend;
#[cfg(any(test, feature = "mock-audio"))]
pub mod mock;

use crate::error::{AudioError, Result};
use crate::sync::lock;
pub use backend::{AudioBackend, OutputDevice, RenderFn};
pub use cpal_backend::CpalBackend;
use std::sync::Mutex;

/// Backend-specific device identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub id: DeviceId,
}

/// What the engine asks every device for; the sample rate is the device's native rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    pub channels: u16,
    pub block_size: Option<u32>,
}

impl Default for StreamRequest {
    fn default() -> Self {
        Self {
            channels: 2,
            block_size: None,
        }
    }
}

/// Format negotiated with an open device. Samples are always `f32` on the mixer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub block_size: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Uninitialized,
    /// The backend could not be opened; audio stays silent for this session.
    Unavailable,
    Ready,
    Closed,
}

struct OpenDevice {
    index: usize,
    info: DeviceInfo,
    output: Box<dyn OutputDevice>,
}

struct DeviceInner {
    backend: Box<dyn AudioBackend>,
    state: DeviceState,
    devices: Vec<DeviceInfo>,
    current: Option<OpenDevice>,
}

impl DeviceInner {
    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            DeviceState::Ready => Ok(()),
            state => Err(AudioError::NotReady(state)),
        }
    }

    fn close_current(&mut self) -> Option<DeviceInfo> {
        let mut open = self.current.take()?;
        open.output.stop();
        open.output.close();
        log::info!("Closed audio device '{}'", open.info.name);
        Some(open.info)
    }
}

pub struct DeviceManager {
    inner: Mutex<DeviceInner>,
    request: StreamRequest,
}

impl DeviceManager {
    pub fn new(backend: Box<dyn AudioBackend>, request: StreamRequest) -> Self {
        Self {
            inner: Mutex::new(DeviceInner {
                backend,
                state: DeviceState::Uninitialized,
                devices: Vec::new(),
                current: None,
            }),
            request,
        }
    }

    /// Opens the backend context and enumerates output devices.
    ///
    /// Failure is not fatal to the host: the manager becomes
    /// [`DeviceState::Unavailable`] and every later device operation reports
    /// [`AudioError::NotReady`].
    pub fn initialize(&self) -> Result<()> {
        let mut inner = lock(&self.inner);
        match inner.state {
            DeviceState::Ready => return Ok(()),
            DeviceState::Uninitialized => {}
            state => return Err(AudioError::NotReady(state)),
        }

        let backend_name = inner.backend.name().to_string();
        let devices = inner
            .backend
            .initialize()
            .and_then(|()| inner.backend.enumerate_devices());

        match devices {
            Ok(devices) => {
                log::info!(
                    "Audio backend '{}' ready with {} output device(s)",
                    backend_name,
                    devices.len()
                );
                inner.devices = devices;
                inner.state = DeviceState::Ready;
                Ok(())
            }
            Err(e) => {
                log::warn!("Audio backend '{}' unavailable: {}", backend_name, e);
                inner.state = DeviceState::Unavailable;
                Err(e)
            }
        }
    }

    pub fn state(&self) -> DeviceState {
        lock(&self.inner).state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == DeviceState::Ready
    }

    /// Device list from the last enumeration.
    pub fn devices(&self) -> Vec<DeviceInfo> {
        lock(&self.inner).devices.clone()
    }

    /// Re-enumerates devices. The open device, if any, stays open.
    pub fn refresh_devices(&self) -> Result<Vec<DeviceInfo>> {
        let mut inner = lock(&self.inner);
        inner.ensure_ready()?;

        let devices = inner.backend.enumerate_devices()?;
        if let Some(open) = inner.current.as_mut() {
            if let Some(index) = devices.iter().position(|d| d.id == open.info.id) {
                open.index = index;
            }
        }
        inner.devices = devices.clone();
        Ok(devices)
    }

    pub fn default_device_index(&self) -> Option<usize> {
        lock(&self.inner).devices.iter().position(|d| d.is_default)
    }

    pub fn find_device(&self, name: &str) -> Option<usize> {
        lock(&self.inner).devices.iter().position(|d| d.name == name)
    }

    /// Closes the current device (if any) and opens and starts device `index`.
    ///
    /// On failure no device is left open.
    pub fn select_device(&self, index: usize, render: RenderFn) -> Result<OutputFormat> {
        let mut inner = lock(&self.inner);
        inner.ensure_ready()?;

        let count = inner.devices.len();
        let Some(info) = inner.devices.get(index).cloned() else {
            return Err(AudioError::InvalidDeviceIndex { index, count });
        };

        // The old stream must be fully quiesced before the new one exists
        inner.close_current();

        let mut output = inner.backend.open_device(&info, &self.request, render)?;
        if let Err(e) = output.start() {
            output.close();
            log::warn!("Failed to start audio device '{}': {}", info.name, e);
            return Err(e);
        }

        let format = output.format();
        log::info!(
            "Opened audio device '{}' ({} ch @ {} Hz)",
            info.name,
            format.channels,
            format.sample_rate
        );
        inner.current = Some(OpenDevice {
            index,
            info,
            output,
        });
        Ok(format)
    }

    /// Stops and closes the open device. Returns false if none was open.
    pub fn close_device(&self) -> bool {
        lock(&self.inner).close_current().is_some()
    }

    pub fn current_device_name(&self) -> Option<String> {
        lock(&self.inner)
            .current
            .as_ref()
            .map(|open| open.info.name.clone())
    }

    pub fn current_device_index(&self) -> Option<usize> {
        lock(&self.inner).current.as_ref().map(|open| open.index)
    }

    pub fn current_format(&self) -> Option<OutputFormat> {
        lock(&self.inner)
            .current
            .as_ref()
            .map(|open| open.output.format())
    }

    /// Closes the device and the backend context. Idempotent.
    pub fn shutdown(&self) {
        let mut inner = lock(&self.inner);
        if inner.state == DeviceState::Closed {
            return;
        }

        inner.close_current();
        if inner.state == DeviceState::Ready {
            inner.backend.shutdown();
        }
        inner.devices.clear();
        inner.state = DeviceState::Closed;
        log::info!("Audio device manager shut down");
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockBackend;
    use super::*;

    fn silent() -> RenderFn {
        Box::new(|buffer: &mut [f32], _channels: u16| buffer.fill(0.0))
    }

    fn manager(backend: MockBackend) -> DeviceManager {
        DeviceManager::new(Box::new(backend), StreamRequest::default())
    }

    #[test]
    fn test_initialize_enumerates() {
        let devices = manager(MockBackend::new(&["Speakers", "Headphones"]));
        assert_eq!(devices.state(), DeviceState::Uninitialized);
        devices.initialize().unwrap();

        assert!(devices.is_ready());
        let list = devices.devices();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "Speakers");
        assert_eq!(devices.default_device_index(), Some(0));
        assert_eq!(devices.find_device("Headphones"), Some(1));
        assert!(devices.current_device_name().is_none());
    }

    #[test]
    fn test_unavailable_backend_disables_operations() {
        let devices = manager(MockBackend::new(&["Speakers"]).failing_init());
        assert!(devices.initialize().is_err());
        assert_eq!(devices.state(), DeviceState::Unavailable);

        assert!(matches!(
            devices.select_device(0, silent()),
            Err(AudioError::NotReady(DeviceState::Unavailable))
        ));
        assert!(devices.refresh_devices().is_err());
        assert!(devices.current_device_name().is_none());
        devices.shutdown();
        assert_eq!(devices.state(), DeviceState::Closed);
    }

    #[test]
    fn test_invalid_index_keeps_current_device() {
        let devices = manager(MockBackend::new(&["Speakers"]));
        devices.initialize().unwrap();
        devices.select_device(0, silent()).unwrap();

        let err = devices.select_device(3, silent()).unwrap_err();
        assert!(matches!(
            err,
            AudioError::InvalidDeviceIndex { index: 3, count: 1 }
        ));
        assert_eq!(devices.current_device_name().as_deref(), Some("Speakers"));
    }

    #[test]
    fn test_switch_round_trip() {
        let backend = MockBackend::new(&["Speakers", "Headphones"]);
        let control = backend.control();
        let devices = manager(backend);
        devices.initialize().unwrap();

        devices.select_device(0, silent()).unwrap();
        let first = devices.current_device_name();
        devices.select_device(1, silent()).unwrap();
        assert_eq!(devices.current_device_name().as_deref(), Some("Headphones"));
        devices.select_device(0, silent()).unwrap();
        assert_eq!(devices.current_device_name(), first);
        assert_eq!(devices.current_device_index(), Some(0));

        // Only one stream is ever open, and every old one was stopped before closing
        assert_eq!(control.open_count(), 1);
        assert_eq!(control.closed_devices(), vec!["Speakers", "Headphones"]);
    }

    #[test]
    fn test_failed_open_leaves_no_device() {
        let backend = MockBackend::new(&["Speakers", "Broken"]).failing_open("Broken");
        let devices = manager(backend);
        devices.initialize().unwrap();
        devices.select_device(0, silent()).unwrap();

        assert!(matches!(
            devices.select_device(1, silent()),
            Err(AudioError::AudioDevice(_))
        ));
        assert!(devices.current_device_name().is_none());

        // Host may retry with another index
        devices.select_device(0, silent()).unwrap();
        assert_eq!(devices.current_device_name().as_deref(), Some("Speakers"));
    }

    #[test]
    fn test_failed_start_closes_stream() {
        let backend = MockBackend::new(&["Stuck"]).failing_start("Stuck");
        let control = backend.control();
        let devices = manager(backend);
        devices.initialize().unwrap();

        assert!(matches!(
            devices.select_device(0, silent()),
            Err(AudioError::DeviceStart(_))
        ));
        assert!(devices.current_device_name().is_none());
        assert_eq!(control.open_count(), 0);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let backend = MockBackend::new(&["Speakers"]);
        let control = backend.control();
        let devices = manager(backend);
        devices.initialize().unwrap();
        devices.select_device(0, silent()).unwrap();

        devices.shutdown();
        devices.shutdown();
        assert_eq!(devices.state(), DeviceState::Closed);
        assert!(devices.current_device_name().is_none());
        assert_eq!(control.open_count(), 0);
        assert_eq!(control.backend_shutdowns(), 1);
        assert!(devices.initialize().is_err());
    }

    #[test]
    fn test_refresh_keeps_open_device() {
        let backend = MockBackend::new(&["Speakers", "Headphones"]);
        let control = backend.control();
        let devices = manager(backend);
        devices.initialize().unwrap();
        devices.select_device(1, silent()).unwrap();

        control.set_devices(&["USB", "Speakers", "Headphones"]);
        let list = devices.refresh_devices().unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(devices.current_device_index(), Some(2));
        assert_eq!(devices.current_device_name().as_deref(), Some("Headphones"));
    }
}
