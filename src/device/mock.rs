//! In-process backend for tests and headless runs.
//!
//! Nothing reaches the OS. Audio is pulled on demand through [`MockControl::render`],
//! which plays the part of a device callback thread.

use super::backend::{AudioBackend, OutputDevice, RenderFn};
use super::{DeviceId, DeviceInfo, OutputFormat, StreamRequest};
use crate::error::{AudioError, Result};
use crate::sync::lock;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub const MOCK_SAMPLE_RATE: u32 = 48000;

struct MockStream {
    id: u64,
    name: String,
    format: OutputFormat,
    render: RenderFn,
    started: bool,
}

#[derive(Default)]
struct MockState {
    devices: Vec<String>,
    streams: Vec<MockStream>,
    next_id: u64,
    closed: Vec<String>,
    shutdowns: usize,
}

pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
    sample_rate: u32,
    fail_init: bool,
    fail_open: HashSet<String>,
    fail_start: HashSet<String>,
}

impl MockBackend {
    /// Backend exposing one device per name; the first is the default.
    pub fn new(names: &[&str]) -> Self {
        let state = MockState {
            devices: names.iter().map(|n| n.to_string()).collect(),
            ..MockState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            sample_rate: MOCK_SAMPLE_RATE,
            fail_init: false,
            fail_open: HashSet::new(),
            fail_start: HashSet::new(),
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn failing_open(mut self, name: &str) -> Self {
        self.fail_open.insert(name.to_string());
        self
    }

    pub fn failing_start(mut self, name: &str) -> Self {
        self.fail_start.insert(name.to_string());
        self
    }

    /// Handle for driving and inspecting the backend after it is moved into an engine.
    pub fn control(&self) -> MockControl {
        MockControl {
            state: self.state.clone(),
        }
    }
}

impl AudioBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn initialize(&mut self) -> Result<()> {
        if self.fail_init {
            return Err(AudioError::BackendUnavailable(
                "mock backend configured to fail".to_string(),
            ));
        }
        Ok(())
    }

    fn enumerate_devices(&mut self) -> Result<Vec<DeviceInfo>> {
        let state = lock(&self.state);
        Ok(state
            .devices
            .iter()
            .enumerate()
            .map(|(i, name)| DeviceInfo {
                name: name.clone(),
                is_default: i == 0,
                id: DeviceId(format!("mock:{}", name)),
            })
            .collect())
    }

    fn open_device(
        &mut self,
        device: &DeviceInfo,
        request: &StreamRequest,
        render: RenderFn,
    ) -> Result<Box<dyn OutputDevice>> {
        if self.fail_open.contains(&device.name) {
            return Err(AudioError::AudioDevice(format!(
                "Failed to open '{}'",
                device.name
            )));
        }

        let format = OutputFormat {
            channels: request.channels,
            sample_rate: self.sample_rate,
            block_size: request.block_size,
        };

        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        state.streams.push(MockStream {
            id,
            name: device.name.clone(),
            format,
            render,
            started: false,
        });

        Ok(Box::new(MockOutput {
            id,
            format,
            fail_start: self.fail_start.contains(&device.name),
            state: self.state.clone(),
        }))
    }

    fn shutdown(&mut self) {
        lock(&self.state).shutdowns += 1;
    }
}

struct MockOutput {
    id: u64,
    format: OutputFormat,
    fail_start: bool,
    state: Arc<Mutex<MockState>>,
}

impl MockOutput {
    fn set_started(&self, started: bool) {
        let mut state = lock(&self.state);
        if let Some(stream) = state.streams.iter_mut().find(|s| s.id == self.id) {
            stream.started = started;
        }
    }
}

impl OutputDevice for MockOutput {
    fn format(&self) -> OutputFormat {
        self.format
    }

    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(AudioError::DeviceStart(
                "mock device configured to fail".to_string(),
            ));
        }
        self.set_started(true);
        Ok(())
    }

    fn stop(&mut self) {
        self.set_started(false);
    }

    fn close(self: Box<Self>) {
        let mut state = lock(&self.state);
        if let Some(pos) = state.streams.iter().position(|s| s.id == self.id) {
            let stream = state.streams.remove(pos);
            state.closed.push(stream.name);
        }
    }
}

/// Test-side view of a [`MockBackend`].
#[derive(Clone)]
pub struct MockControl {
    state: Arc<Mutex<MockState>>,
}

impl MockControl {
    /// Runs one device callback of `frames` frames on the started stream.
    ///
    /// Returns `None` when no stream is started. The backend lock is held for
    /// the whole callback, so a concurrent close waits for it to return.
    pub fn render(&self, frames: usize) -> Option<Vec<f32>> {
        let mut state = lock(&self.state);
        let stream = state.streams.iter_mut().find(|s| s.started)?;
        let channels = stream.format.channels;
        let mut buffer = vec![0.0f32; frames * channels as usize];
        (stream.render)(&mut buffer, channels);
        Some(buffer)
    }

    /// Name of the stream currently started, if any.
    pub fn active_device(&self) -> Option<String> {
        lock(&self.state)
            .streams
            .iter()
            .find(|s| s.started)
            .map(|s| s.name.clone())
    }

    /// Number of streams opened and not yet closed.
    pub fn open_count(&self) -> usize {
        lock(&self.state).streams.len()
    }

    /// Device names in the order their streams were closed.
    pub fn closed_devices(&self) -> Vec<String> {
        lock(&self.state).closed.clone()
    }

    pub fn backend_shutdowns(&self) -> usize {
        lock(&self.state).shutdowns
    }

    /// Replaces the device list seen by the next enumeration.
    pub fn set_devices(&self, names: &[&str]) {
        lock(&self.state).devices = names.iter().map(|n| n.to_string()).collect();
    }
}
