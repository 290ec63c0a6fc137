//! The explicitly owned audio engine.
//!
//! One [`AudioEngine`] owns every sound, music and listener component, the
//! registry of what is mixed, the device manager and the event queue. The ECS
//! attaches and detaches components through [`AudioEngine::on_component_added`]
//! and [`AudioEngine::on_component_removed`]; scripts get weak bindings.

use crate::asset::AssetResolver;
use crate::binding::{ListenerBinding, SoundBinding};
use crate::config::AudioConfig;
use crate::device::{
    AudioBackend, CpalBackend, DeviceInfo, DeviceManager, DeviceState, OutputFormat, RenderFn,
    StreamRequest,
};
use crate::error::{AudioError, Result};
use crate::events::{AudioEvent, EventSink};
use crate::mixer::{self, MixerState};
use crate::source::{
    Component, ComponentHandle, ListenerHandle, ListenerSource, SoundHandle, SoundSource,
};
use crate::sync::lock;
use crossbeam_channel::Receiver;
use std::sync::{Arc, Mutex, MutexGuard};

/// State shared between the host threads and the audio callback.
pub(crate) struct Shared {
    state: Mutex<MixerState>,
    assets: Arc<dyn AssetResolver>,
    events: EventSink,
}

impl Shared {
    /// The mixer lock. Every read or write of source, listener or registry state goes through it.
    pub(crate) fn lock(&self) -> MutexGuard<'_, MixerState> {
        lock(&self.state)
    }

    /// One device callback: silence, then the mix of every registered source.
    fn render(&self, output: &mut [f32], channels: usize) {
        output.fill(0.0);
        let mut state = self.lock();
        mixer::mix_block(&mut state, self.assets.as_ref(), &self.events, output, channels);
    }
}

pub struct AudioEngine {
    shared: Arc<Shared>,
    devices: DeviceManager,
    events: Receiver<AudioEvent>,
    config: AudioConfig,
}

impl AudioEngine {
    pub fn new(
        config: AudioConfig,
        assets: Arc<dyn AssetResolver>,
        backend: Box<dyn AudioBackend>,
    ) -> Result<Self> {
        config.validate()?;

        let (sink, events) = EventSink::bounded(config.event_capacity);
        let shared = Arc::new(Shared {
            state: Mutex::new(MixerState::new(config.max_sources, config.max_listeners)),
            assets,
            events: sink,
        });
        let devices = DeviceManager::new(
            backend,
            StreamRequest {
                channels: config.channels,
                block_size: config.block_size,
            },
        );

        Ok(Self {
            shared,
            devices,
            events,
            config,
        })
    }

    /// Engine over the platform's default cpal host.
    pub fn with_default_backend(
        config: AudioConfig,
        assets: Arc<dyn AssetResolver>,
    ) -> Result<Self> {
        Self::new(config, assets, Box::new(CpalBackend::new()))
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Opens the backend and, when configured, a device.
    ///
    /// A backend failure is returned but leaves the engine usable: components
    /// can still be attached and edited, and no audio is produced. Failing to
    /// open the automatic device is only logged; the host can still pick one
    /// with [`AudioEngine::select_device`].
    pub fn initialize(&self) -> Result<()> {
        self.devices.initialize()?;

        if !self.config.open_default_device {
            return Ok(());
        }

        let preferred = self
            .config
            .preferred_device
            .as_deref()
            .and_then(|name| {
                let index = self.devices.find_device(name);
                if index.is_none() {
                    log::warn!("Preferred audio device '{}' not found", name);
                }
                index
            });
        let index = preferred
            .or_else(|| self.devices.default_device_index())
            .or_else(|| (!self.devices.devices().is_empty()).then_some(0));

        match index {
            Some(index) => {
                if let Err(e) = self.select_device(index) {
                    log::warn!("Failed to open default audio device: {}", e);
                }
            }
            None => log::info!("No audio output devices found"),
        }
        Ok(())
    }

    pub fn device_state(&self) -> DeviceState {
        self.devices.state()
    }

    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.devices.devices()
    }

    pub fn refresh_devices(&self) -> Result<Vec<DeviceInfo>> {
        self.devices.refresh_devices()
    }

    pub fn find_device(&self, name: &str) -> Option<usize> {
        self.devices.find_device(name)
    }

    /// Switches output to device `index`.
    ///
    /// The old device is stopped before the new one opens, so no two callbacks
    /// ever run together. On failure no device is open.
    pub fn select_device(&self, index: usize) -> Result<OutputFormat> {
        let was_open = self.devices.current_device_name().is_some();

        match self.devices.select_device(index, self.render_fn()) {
            Ok(format) => {
                if let Some(device_name) = self.devices.current_device_name() {
                    self.shared
                        .events
                        .emit(AudioEvent::DeviceChanged { device_name });
                }
                Ok(format)
            }
            Err(e) => {
                if was_open && self.devices.current_device_name().is_none() {
                    self.shared.events.emit(AudioEvent::DeviceClosed);
                }
                Err(e)
            }
        }
    }

    pub fn current_device_name(&self) -> Option<String> {
        self.devices.current_device_name()
    }

    pub fn current_device_index(&self) -> Option<usize> {
        self.devices.current_device_index()
    }

    /// Format of the open device. Its sample rate is the rate assets should be cached at.
    pub fn current_format(&self) -> Option<OutputFormat> {
        self.devices.current_format()
    }

    pub fn close_device(&self) -> bool {
        let closed = self.devices.close_device();
        if closed {
            self.shared.events.emit(AudioEvent::DeviceClosed);
        }
        closed
    }

    /// Closes the device and the backend. Components stay attached. Idempotent.
    pub fn shutdown(&self) {
        if self.devices.state() == DeviceState::Closed {
            return;
        }
        self.close_device();
        self.devices.shutdown();
    }

    /// ECS attach hook: takes ownership of `component` and registers it for mixing.
    pub fn on_component_added(&self, component: impl Into<Component>) -> ComponentHandle {
        let component = component.into();
        let kind = component.kind();

        let handle = {
            let mut state = self.shared.lock();
            match component {
                Component::Sound(source) => {
                    let handle = SoundHandle(state.sounds.insert(source));
                    state.registry.add_source(handle);
                    ComponentHandle::Sound(handle)
                }
                Component::Listener(listener) => {
                    let handle = ListenerHandle(state.listeners.insert(listener));
                    state.registry.add_listener(handle);
                    ComponentHandle::Listener(handle)
                }
            }
        };

        log::debug!("Attached {:?} component {:?}", kind, handle);
        handle
    }

    /// ECS detach hook. Unknown or stale handles are ignored.
    pub fn on_component_removed(&self, handle: impl Into<ComponentHandle>) -> Option<Component> {
        let handle = handle.into();
        let removed = {
            let mut state = self.shared.lock();
            match handle {
                ComponentHandle::Sound(sound) => {
                    state.registry.remove_source(sound);
                    state.sounds.remove(sound.0).map(Component::Sound)
                }
                ComponentHandle::Listener(listener) => {
                    state.registry.remove_listener(listener);
                    state.listeners.remove(listener.0).map(Component::Listener)
                }
            }
        };

        if removed.is_some() {
            log::debug!("Detached component {:?}", handle);
        }
        removed
    }

    /// ECS enable/disable hook. Returns false for stale handles.
    pub fn set_component_active(&self, handle: impl Into<ComponentHandle>, active: bool) -> bool {
        let mut state = self.shared.lock();
        match handle.into() {
            ComponentHandle::Sound(sound) => state
                .sounds
                .get_mut(sound.0)
                .map(|source| source.set_active(active))
                .is_some(),
            ComponentHandle::Listener(listener) => state
                .listeners
                .get_mut(listener.0)
                .map(|source| source.set_active(active))
                .is_some(),
        }
    }

    /// Runs `f` on a sound source under the mixer lock.
    pub fn with_sound<R>(
        &self,
        handle: SoundHandle,
        f: impl FnOnce(&mut SoundSource) -> R,
    ) -> Option<R> {
        let mut state = self.shared.lock();
        state.sounds.get_mut(handle.0).map(f)
    }

    /// Runs `f` on a listener under the mixer lock.
    pub fn with_listener<R>(
        &self,
        handle: ListenerHandle,
        f: impl FnOnce(&mut ListenerSource) -> R,
    ) -> Option<R> {
        let mut state = self.shared.lock();
        state.listeners.get_mut(handle.0).map(f)
    }

    pub fn sound_binding(&self, handle: SoundHandle) -> Result<SoundBinding> {
        if !self.shared.lock().sounds.contains(handle.0) {
            return Err(AudioError::StaleBinding(format!("sound {}", handle)));
        }
        Ok(SoundBinding::new(Arc::downgrade(&self.shared), handle))
    }

    pub fn listener_binding(&self, handle: ListenerHandle) -> Result<ListenerBinding> {
        if !self.shared.lock().listeners.contains(handle.0) {
            return Err(AudioError::StaleBinding(format!("listener {}", handle)));
        }
        Ok(ListenerBinding::new(Arc::downgrade(&self.shared), handle))
    }

    /// Mixes one block on the calling thread, exactly as a device callback would.
    ///
    /// Lets headless hosts and tools pull audio without any device open.
    pub fn render_block(&self, output: &mut [f32], channels: u16) {
        self.shared.render(output, channels as usize);
    }

    /// Drains every queued event.
    pub fn poll_events(&self) -> Vec<AudioEvent> {
        self.events.try_iter().collect()
    }

    /// Receiving end of the event queue, for hosts that select on it.
    pub fn events(&self) -> &Receiver<AudioEvent> {
        &self.events
    }

    pub fn source_count(&self) -> usize {
        self.shared.lock().registry.sources().len()
    }

    pub fn listener_count(&self) -> usize {
        self.shared.lock().registry.listeners().len()
    }

    fn render_fn(&self) -> RenderFn {
        let shared = Arc::downgrade(&self.shared);
        Box::new(move |output: &mut [f32], channels: u16| match shared.upgrade() {
            Some(shared) => shared.render(output, channels as usize),
            None => output.fill(0.0),
        })
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
