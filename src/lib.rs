//! # Soundstage
//!
//! A small real-time PCM mixer for game engines: sound, music and listener
//! components, output device management, and a script-facing property surface.
//!
//! One [`AudioEngine`] owns every component and the device manager. The ECS
//! attaches and detaches components through its hooks, scripts edit them through
//! weak bindings, and the device callback sums every playing source into the
//! output block.
//!
//! ## Quick Start
//!
//! ```no_run
//! use soundstage::*;
//! use std::sync::Arc;
//!
//! let assets = Arc::new(AssetCache::new());
//! assets.insert("beep", PcmAsset::new(vec![0.0, 0.5, 0.0, -0.5], 1, 48000)?);
//!
//! // Opens the default output device
//! let engine = AudioEngine::with_default_backend(AudioConfig::default(), assets.clone())?;
//! engine.initialize()?;
//!
//! engine.on_component_added(ListenerSource::new());
//! let beep = engine.on_component_added(SoundSource::sound("beep").with_repeat(true));
//!
//! // Scripts hold bindings; they go stale once the component is detached
//! if let ComponentHandle::Sound(handle) = beep {
//!     let binding = engine.sound_binding(handle)?;
//!     binding.set("volume", 50.0)?;
//!     binding.set_playing(true)?;
//! }
//!
//! for event in engine.poll_events() {
//!     if let AudioEvent::SourceCompleted { source } = event {
//!         println!("Finished: {}", source);
//!     }
//! }
//! # Ok::<(), AudioError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`AudioEngine`]**: Owns components, registry, devices and the event queue
//! - **[`SoundSource`] / [`ListenerSource`]**: Playback instances and the "ears" they are heard through
//! - **[`AssetCache`]**: Decoded PCM assets resolved by name on every mix block
//! - **[`DeviceManager`]**: Output device enumeration and switching over a pluggable [`AudioBackend`]
//! - **[`SoundBinding`] / [`ListenerBinding`]**: Property access by name for scripting runtimes
//! - **[`AudioEvent`]**: Completion, loop and device notifications
//!
//! ## Threading
//!
//! The device callback and the host threads share one mutex around all source,
//! listener and registry state. Every setter holds it for a single field write;
//! the callback holds it for one block. Device switching uses a separate lock and
//! never runs while the mixer lock is held.

pub mod asset;
pub mod binding;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod math;
mod mixer;
pub mod registry;
mod slots;
pub mod source;
mod sync;

pub use asset::{AssetCache, AssetResolver, AudioResampler, PcmAsset};
pub use binding::{ListenerBinding, PropertyValue, SoundBinding};
pub use config::AudioConfig;
pub use device::{
    AudioBackend, CpalBackend, DeviceInfo, DeviceManager, DeviceState, OutputDevice, OutputFormat,
};
pub use engine::AudioEngine;
pub use error::{AudioError, Result};
pub use events::AudioEvent;
pub use math::{Pose, Quat, Vec3};
pub use source::{
    Component, ComponentHandle, ComponentKind, ListenerHandle, ListenerSource, SoundHandle,
    SoundKind, SoundSource,
};
