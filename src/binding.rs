//! Script-facing property access for sources and listeners.
//!
//! A binding is a weak view: it holds a `Weak` reference to the engine's shared
//! state plus a generation-counted handle. Once the engine is dropped or the
//! component is detached, every call fails with [`AudioError::StaleBinding`]
//! no matter how many script references to the binding remain.
//!
//! Values are type-checked and validated before the mixer lock is taken, and a
//! rejected value leaves the property unchanged.

use crate::engine::Shared;
use crate::error::{AudioError, Result};
use crate::math::{Pose, Vec3};
use crate::source::{ListenerHandle, ListenerSource, SoundHandle, SoundKind, SoundSource};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Property names accepted by [`SoundBinding::get`] and [`SoundBinding::set`].
pub const SOUND_PROPERTIES: &[&str] = &[
    "asset",
    "volume",
    "playing",
    "repeat",
    "spatial",
    "crossfade",
    "active",
    "frame",
    "frame_count",
    "kind",
];

/// Property names accepted by [`ListenerBinding::get`] and [`ListenerBinding::set`].
pub const LISTENER_PROPERTIES: &[&str] = &[
    "volume",
    "spatial",
    "max_distance",
    "attenuation",
    "rolloff",
    "active",
];

/// Dynamically typed value exchanged with a scripting runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Nil,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Text(_) => "string",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<f32> for PropertyValue {
    fn from(value: f32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<usize> for PropertyValue {
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Nil, Into::into)
    }
}

fn type_error(property: &str, expected: &'static str, found: &PropertyValue) -> AudioError {
    AudioError::PropertyType {
        property: property.to_string(),
        expected,
        found: found.type_name(),
    }
}

fn invalid(property: &str, reason: impl Into<String>) -> AudioError {
    AudioError::InvalidValue {
        property: property.to_string(),
        reason: reason.into(),
    }
}

fn expect_bool(property: &str, value: &PropertyValue) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| type_error(property, "boolean", value))
}

fn expect_number(property: &str, value: &PropertyValue) -> Result<f64> {
    let number = value
        .as_number()
        .ok_or_else(|| type_error(property, "number", value))?;
    if number.is_nan() {
        return Err(invalid(property, "NaN is not a valid number"));
    }
    Ok(number)
}

fn expect_text(property: &str, value: PropertyValue) -> Result<String> {
    match value {
        PropertyValue::Text(text) => Ok(text),
        other => Err(type_error(property, "string", &other)),
    }
}

/// A validated write, ready to apply under the mixer lock.
enum SoundWrite {
    Asset(String),
    Volume(f32),
    Playing(bool),
    Repeat(bool),
    Spatial(bool),
    Crossfade(Duration),
}

impl SoundWrite {
    fn parse(property: &str, value: PropertyValue) -> Result<Self> {
        Ok(match property {
            "asset" => Self::Asset(expect_text(property, value)?),
            "volume" => Self::Volume(expect_number(property, &value)? as f32),
            "playing" => Self::Playing(expect_bool(property, &value)?),
            "repeat" => Self::Repeat(expect_bool(property, &value)?),
            "spatial" => Self::Spatial(expect_bool(property, &value)?),
            "crossfade" => {
                let seconds = expect_number(property, &value)?;
                if seconds < 0.0 {
                    return Err(invalid(property, "must not be negative"));
                }
                let duration = Duration::try_from_secs_f64(seconds)
                    .map_err(|e| invalid(property, e.to_string()))?;
                Self::Crossfade(duration)
            }
            "active" | "frame" | "frame_count" | "kind" => {
                return Err(AudioError::ReadOnlyProperty(property.to_string()));
            }
            _ => return Err(AudioError::UnknownProperty(property.to_string())),
        })
    }

    fn apply(self, source: &mut SoundSource) {
        match self {
            Self::Asset(asset) => source.set_asset(asset),
            Self::Volume(volume) => source.set_volume(volume),
            Self::Playing(playing) => source.set_playing(playing),
            Self::Repeat(repeat) => source.set_repeat(repeat),
            Self::Spatial(spatial) => source.set_spatial(spatial),
            Self::Crossfade(crossfade) => source.set_crossfade(crossfade),
        }
    }
}

/// Script view of one sound or music source.
#[derive(Debug, Clone)]
pub struct SoundBinding {
    shared: Weak<Shared>,
    handle: SoundHandle,
}

impl SoundBinding {
    pub(crate) fn new(shared: Weak<Shared>, handle: SoundHandle) -> Self {
        Self { shared, handle }
    }

    pub fn handle(&self) -> SoundHandle {
        self.handle
    }

    /// Whether the engine and the source both still exist.
    pub fn is_valid(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.lock().sounds.contains(self.handle.0))
    }

    pub fn get(&self, property: &str) -> Result<PropertyValue> {
        if !SOUND_PROPERTIES.contains(&property) {
            return Err(AudioError::UnknownProperty(property.to_string()));
        }

        self.with(|source| match property {
            "asset" => source.asset().into(),
            "volume" => source.volume().into(),
            "playing" => source.is_playing().into(),
            "repeat" => source.is_repeating().into(),
            "spatial" => source.is_spatial().into(),
            "crossfade" => source.crossfade().as_secs_f64().into(),
            "active" => source.is_active().into(),
            "frame" => source.current_frame().into(),
            "frame_count" => source.frame_count().into(),
            "kind" => source.kind().as_str().into(),
            _ => PropertyValue::Nil,
        })
    }

    pub fn set(&self, property: &str, value: impl Into<PropertyValue>) -> Result<()> {
        let write = SoundWrite::parse(property, value.into())?;
        self.with(|source| write.apply(source))
    }

    pub fn asset(&self) -> Result<String> {
        self.with(|source| source.asset().to_string())
    }

    /// Switches asset with a hard cut back to frame 0.
    pub fn set_asset(&self, asset: &str) -> Result<()> {
        self.set("asset", asset)
    }

    pub fn volume(&self) -> Result<f64> {
        self.with(|source| source.volume() as f64)
    }

    pub fn set_volume(&self, volume: f64) -> Result<()> {
        self.set("volume", volume)
    }

    pub fn is_playing(&self) -> Result<bool> {
        self.with(|source| source.is_playing())
    }

    pub fn set_playing(&self, playing: bool) -> Result<()> {
        self.set("playing", playing)
    }

    pub fn is_repeating(&self) -> Result<bool> {
        self.with(|source| source.is_repeating())
    }

    pub fn set_repeat(&self, repeat: bool) -> Result<()> {
        self.set("repeat", repeat)
    }

    pub fn is_spatial(&self) -> Result<bool> {
        self.with(|source| source.is_spatial())
    }

    pub fn set_spatial(&self, spatial: bool) -> Result<()> {
        self.set("spatial", spatial)
    }

    pub fn crossfade(&self) -> Result<Duration> {
        self.with(|source| source.crossfade())
    }

    pub fn set_crossfade(&self, seconds: f64) -> Result<()> {
        self.set("crossfade", seconds)
    }

    pub fn is_active(&self) -> Result<bool> {
        self.with(|source| source.is_active())
    }

    pub fn frame(&self) -> Result<usize> {
        self.with(|source| source.current_frame())
    }

    pub fn frame_count(&self) -> Result<usize> {
        self.with(|source| source.frame_count())
    }

    pub fn kind(&self) -> Result<SoundKind> {
        self.with(|source| source.kind())
    }

    pub fn position(&self) -> Result<Vec3> {
        self.with(|source| source.position())
    }

    pub fn set_position(&self, position: Vec3) -> Result<()> {
        if !position.is_finite() {
            return Err(invalid("position", "must be finite"));
        }
        self.with(|source| source.set_position(position))
    }

    fn with<R>(&self, f: impl FnOnce(&mut SoundSource) -> R) -> Result<R> {
        let shared = upgrade(&self.shared)?;
        let mut state = shared.lock();
        match state.sounds.get_mut(self.handle.0) {
            Some(source) => Ok(f(source)),
            None => Err(stale(format!("{} was removed", self.handle))),
        }
    }
}

enum ListenerWrite {
    Volume(f32),
    Spatial(bool),
    MaxDistance(f32),
    Attenuation(f32),
    Rolloff(f32),
}

impl ListenerWrite {
    fn parse(property: &str, value: PropertyValue) -> Result<Self> {
        Ok(match property {
            "volume" => Self::Volume(expect_number(property, &value)? as f32),
            "spatial" => Self::Spatial(expect_bool(property, &value)?),
            "max_distance" => {
                let distance = expect_number(property, &value)? as f32;
                if !distance.is_finite() || distance <= 0.0 {
                    return Err(invalid(property, "must be a finite number above 0"));
                }
                Self::MaxDistance(distance)
            }
            "attenuation" => Self::Attenuation(expect_number(property, &value)? as f32),
            "rolloff" => Self::Rolloff(expect_number(property, &value)? as f32),
            "active" => return Err(AudioError::ReadOnlyProperty(property.to_string())),
            _ => return Err(AudioError::UnknownProperty(property.to_string())),
        })
    }

    fn apply(self, listener: &mut ListenerSource) {
        match self {
            Self::Volume(volume) => listener.set_volume(volume),
            Self::Spatial(spatial) => listener.set_spatial(spatial),
            Self::MaxDistance(distance) => listener.set_max_distance(distance),
            Self::Attenuation(attenuation) => listener.set_attenuation(attenuation),
            Self::Rolloff(rolloff) => listener.set_rolloff(rolloff),
        }
    }
}

/// Script view of one listener.
#[derive(Debug, Clone)]
pub struct ListenerBinding {
    shared: Weak<Shared>,
    handle: ListenerHandle,
}

impl ListenerBinding {
    pub(crate) fn new(shared: Weak<Shared>, handle: ListenerHandle) -> Self {
        Self { shared, handle }
    }

    pub fn handle(&self) -> ListenerHandle {
        self.handle
    }

    pub fn is_valid(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.lock().listeners.contains(self.handle.0))
    }

    pub fn get(&self, property: &str) -> Result<PropertyValue> {
        if !LISTENER_PROPERTIES.contains(&property) {
            return Err(AudioError::UnknownProperty(property.to_string()));
        }

        self.with(|listener| match property {
            "volume" => listener.volume().into(),
            "spatial" => listener.is_spatial().into(),
            "max_distance" => listener.max_distance().into(),
            "attenuation" => listener.attenuation().into(),
            "rolloff" => listener.rolloff().into(),
            "active" => listener.is_active().into(),
            _ => PropertyValue::Nil,
        })
    }

    pub fn set(&self, property: &str, value: impl Into<PropertyValue>) -> Result<()> {
        let write = ListenerWrite::parse(property, value.into())?;
        self.with(|listener| write.apply(listener))
    }

    pub fn volume(&self) -> Result<f64> {
        self.with(|listener| listener.volume() as f64)
    }

    pub fn set_volume(&self, volume: f64) -> Result<()> {
        self.set("volume", volume)
    }

    pub fn is_spatial(&self) -> Result<bool> {
        self.with(|listener| listener.is_spatial())
    }

    pub fn set_spatial(&self, spatial: bool) -> Result<()> {
        self.set("spatial", spatial)
    }

    pub fn max_distance(&self) -> Result<f64> {
        self.with(|listener| listener.max_distance() as f64)
    }

    pub fn set_max_distance(&self, distance: f64) -> Result<()> {
        self.set("max_distance", distance)
    }

    pub fn attenuation(&self) -> Result<f64> {
        self.with(|listener| listener.attenuation() as f64)
    }

    pub fn set_attenuation(&self, attenuation: f64) -> Result<()> {
        self.set("attenuation", attenuation)
    }

    pub fn rolloff(&self) -> Result<f64> {
        self.with(|listener| listener.rolloff() as f64)
    }

    pub fn set_rolloff(&self, rolloff: f64) -> Result<()> {
        self.set("rolloff", rolloff)
    }

    pub fn is_active(&self) -> Result<bool> {
        self.with(|listener| listener.is_active())
    }

    pub fn pose(&self) -> Result<Pose> {
        self.with(|listener| listener.pose())
    }

    pub fn set_pose(&self, pose: Pose) -> Result<()> {
        if !pose.position.is_finite() || !pose.rotation.is_finite() {
            return Err(invalid("pose", "must be finite"));
        }
        self.with(|listener| listener.set_pose(pose))
    }

    fn with<R>(&self, f: impl FnOnce(&mut ListenerSource) -> R) -> Result<R> {
        let shared = upgrade(&self.shared)?;
        let mut state = shared.lock();
        match state.listeners.get_mut(self.handle.0) {
            Some(listener) => Ok(f(listener)),
            None => Err(stale(format!("{} was removed", self.handle))),
        }
    }
}

fn upgrade(shared: &Weak<Shared>) -> Result<Arc<Shared>> {
    shared
        .upgrade()
        .ok_or_else(|| stale("audio engine was dropped".to_string()))
}

fn stale(reason: String) -> AudioError {
    log::warn!("Stale audio binding used: {}", reason);
    AudioError::StaleBinding(reason)
}
