use super::backend::{AudioBackend, OutputDevice, RenderFn};
use super::{DeviceId, DeviceInfo, OutputFormat, StreamRequest};
use crate::error::{AudioError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Scratch space reserved up front so the callback does not allocate for typical block sizes.
const SCRATCH_SAMPLES: usize = 8192;

/// Backend over the platform's cpal host.
pub struct CpalBackend {
    host_id: Option<cpal::HostId>,
    host: Option<cpal::Host>,
}

impl CpalBackend {
    /// Uses the platform's default host.
    pub fn new() -> Self {
        Self {
            host_id: None,
            host: None,
        }
    }

    pub fn with_host(host_id: cpal::HostId) -> Self {
        Self {
            host_id: Some(host_id),
            host: None,
        }
    }

    fn host(&self) -> Result<&cpal::Host> {
        self.host.as_ref().ok_or_else(|| {
            AudioError::BackendUnavailable("cpal host not initialized".to_string())
        })
    }

    fn find_device(&self, info: &DeviceInfo) -> Result<cpal::Device> {
        let devices = self.host()?.output_devices().map_err(|e| {
            AudioError::AudioDevice(format!("Failed to enumerate devices: {}", e))
        })?;

        devices
            .into_iter()
            .find(|device| device.name().map(|name| name == info.id.0).unwrap_or(false))
            .ok_or_else(|| AudioError::AudioDevice(format!("Device '{}' not found", info.name)))
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: cpal::Host is only touched through &mut self under the device manager's lock
unsafe impl Send for CpalBackend {}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn initialize(&mut self) -> Result<()> {
        let host = match self.host_id {
            Some(id) => cpal::host_from_id(id)
                .map_err(|e| AudioError::BackendUnavailable(e.to_string()))?,
            None => cpal::default_host(),
        };
        log::debug!("Using cpal host {:?}", host.id());
        self.host = Some(host);
        Ok(())
    }

    fn enumerate_devices(&mut self) -> Result<Vec<DeviceInfo>> {
        let host = self.host()?;
        let default_name = host.default_output_device().and_then(|d| d.name().ok());

        let devices = host.output_devices().map_err(|e| {
            AudioError::AudioDevice(format!("Failed to enumerate devices: {}", e))
        })?;

        Ok(devices
            .map(|device| {
                let name = device
                    .name()
                    .unwrap_or_else(|_| "Unknown Device".to_string());
                DeviceInfo {
                    is_default: default_name.as_deref() == Some(name.as_str()),
                    id: DeviceId(name.clone()),
                    name,
                }
            })
            .collect())
    }

    fn open_device(
        &mut self,
        info: &DeviceInfo,
        request: &StreamRequest,
        render: RenderFn,
    ) -> Result<Box<dyn OutputDevice>> {
        let device = self.find_device(info)?;

        // Mix at the device's native rate
        let default_config = device.default_output_config().map_err(|e| {
            AudioError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let config = cpal::StreamConfig {
            channels: request.channels,
            sample_rate: default_config.sample_rate(),
            buffer_size: match request.block_size {
                Some(frames) => cpal::BufferSize::Fixed(frames),
                None => cpal::BufferSize::Default,
            },
        };

        let running = Arc::new(AtomicBool::new(false));
        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => {
                create_stream::<f32>(&device, &config, render, running.clone())?
            }
            cpal::SampleFormat::I16 => {
                create_stream::<i16>(&device, &config, render, running.clone())?
            }
            cpal::SampleFormat::U16 => {
                create_stream::<u16>(&device, &config, render, running.clone())?
            }
            other => {
                return Err(AudioError::AudioFormat(format!(
                    "Unsupported sample format {:?}",
                    other
                )));
            }
        };

        Ok(Box::new(CpalOutput {
            stream: Some(stream),
            running,
            format: OutputFormat {
                channels: config.channels,
                sample_rate: config.sample_rate.0,
                block_size: request.block_size,
            },
        }))
    }

    fn shutdown(&mut self) {
        self.host = None;
    }
}

/// Builds a stream that converts the mixer's `f32` output to the device sample type.
fn create_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut render: RenderFn,
    running: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels;
    let mut scratch = Vec::with_capacity(SCRATCH_SAMPLES);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if !running.load(Ordering::Acquire) {
                    data.fill(T::from_sample(0.0f32));
                    return;
                }

                scratch.resize(data.len(), 0.0f32);
                render(&mut scratch, channels);

                for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(sample);
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::AudioDevice(format!("Failed to build stream: {}", e)))
}

struct CpalOutput {
    stream: Option<cpal::Stream>,
    running: Arc<AtomicBool>,
    format: OutputFormat,
}

// SAFETY: the stream is only accessed from one thread at a time, under the device manager's lock
unsafe impl Send for CpalOutput {}

impl OutputDevice for CpalOutput {
    fn format(&self) -> OutputFormat {
        self.format
    }

    fn start(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| AudioError::DeviceStart("Stream already closed".to_string()))?;
        stream
            .play()
            .map_err(|e| AudioError::DeviceStart(format!("Failed to start stream: {}", e)))?;
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.pause() {
                log::warn!("Failed to pause audio stream: {}", e);
            }
        }
    }

    fn close(mut self: Box<Self>) {
        self.running.store(false, Ordering::Release);
        // Dropping the stream joins its callback
        drop(self.stream.take());
    }
}
