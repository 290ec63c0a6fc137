use super::{DeviceInfo, OutputFormat, StreamRequest};
use crate::error::Result;

/// Callback invoked on the backend's audio thread to fill one interleaved
/// `f32` block. The second argument is the block's channel count.
pub type RenderFn = Box<dyn FnMut(&mut [f32], u16) + Send + 'static>;

/// Native audio backend: context lifetime, enumeration and device creation.
pub trait AudioBackend: Send {
    /// Short backend identifier for logs.
    fn name(&self) -> &str;

    /// Opens the native audio context.
    fn initialize(&mut self) -> Result<()>;

    fn enumerate_devices(&mut self) -> Result<Vec<DeviceInfo>>;

    /// Creates an output stream on `device`. The stream must stay silent and
    /// must not call `render` until [`OutputDevice::start`].
    fn open_device(
        &mut self,
        device: &DeviceInfo,
        request: &StreamRequest,
        render: RenderFn,
    ) -> Result<Box<dyn OutputDevice>>;

    /// Tears down the native context. Called at most once, after every device is closed.
    fn shutdown(&mut self);
}

/// One open output stream.
pub trait OutputDevice: Send {
    /// Negotiated output format.
    fn format(&self) -> OutputFormat;

    fn start(&mut self) -> Result<()>;

    /// Stops invoking the render callback.
    fn stop(&mut self);

    /// Releases the stream; returns only once its callback can no longer run.
    fn close(self: Box<Self>);
}
