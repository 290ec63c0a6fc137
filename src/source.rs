//! Sound-bearing components and their handles.
//!
//! The engine owns every [`SoundSource`] and [`ListenerSource`] once the ECS
//! attaches them; the ECS and scripts keep only the generation-counted handles.

use crate::math::{Pose, Vec3};
use crate::slots::SlotKey;
use std::time::Duration;

pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 100.0;
pub const MIN_ROLLOFF: f32 = 0.1;
pub const MAX_ROLLOFF: f32 = 8.0;

/// Handle to a sound or music source stored in an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundHandle(pub(crate) SlotKey);

/// Handle to a listener stored in an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub(crate) SlotKey);

impl std::fmt::Display for SoundHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sound({}v{})", self.0.index, self.0.generation)
    }
}

impl std::fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Listener({}v{})", self.0.index, self.0.generation)
    }
}

/// Handle returned by [`AudioEngine::on_component_added`](crate::AudioEngine::on_component_added).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentHandle {
    Sound(SoundHandle),
    Listener(ListenerHandle),
}

impl From<SoundHandle> for ComponentHandle {
    fn from(handle: SoundHandle) -> Self {
        Self::Sound(handle)
    }
}

impl From<ListenerHandle> for ComponentHandle {
    fn from(handle: ListenerHandle) -> Self {
        Self::Listener(handle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundKind {
    /// One-shot or looping effect
    Sound,
    /// Background track; switching tracks is a hard cut
    Music,
}

impl SoundKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sound => "sound",
            Self::Music => "music",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Sound,
    Music,
    Listener,
}

/// One schedulable playback instance.
#[derive(Debug, Clone)]
pub struct SoundSource {
    pub(crate) kind: SoundKind,
    pub(crate) asset: String,
    pub(crate) active: bool,
    pub(crate) playing: bool,
    pub(crate) repeat: bool,
    pub(crate) spatial: bool,
    pub(crate) volume: f32,
    pub(crate) position: Vec3,
    pub(crate) current_frame: usize,
    pub(crate) frame_count: usize,
    pub(crate) crossfade: Duration,
}

impl SoundSource {
    pub fn new(kind: SoundKind, asset: impl Into<String>) -> Self {
        Self {
            kind,
            asset: asset.into(),
            active: true,
            playing: false,
            repeat: false,
            spatial: false,
            volume: MAX_VOLUME,
            position: Vec3::ZERO,
            current_frame: 0,
            frame_count: 0,
            crossfade: Duration::ZERO,
        }
    }

    pub fn sound(asset: impl Into<String>) -> Self {
        Self::new(SoundKind::Sound, asset)
    }

    pub fn music(asset: impl Into<String>) -> Self {
        Self::new(SoundKind::Music, asset)
    }

    pub fn with_playing(mut self, playing: bool) -> Self {
        self.playing = playing;
        self
    }

    pub fn with_repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_spatial(mut self, spatial: bool) -> Self {
        self.spatial = spatial;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.set_volume(volume);
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.set_position(position);
        self
    }

    pub fn with_start_frame(mut self, frame: usize) -> Self {
        self.current_frame = frame;
        self
    }

    pub fn kind(&self) -> SoundKind {
        self.kind
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_repeating(&self) -> bool {
        self.repeat
    }

    pub fn is_spatial(&self) -> bool {
        self.spatial
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Playback cursor in frames.
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Frame count of the asset as of the last mix block.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Stored for music tracks; the mixer always hard-cuts.
    pub fn crossfade(&self) -> Duration {
        self.crossfade
    }

    /// Switches to another asset, restarting from its first frame.
    pub fn set_asset(&mut self, asset: impl Into<String>) {
        self.asset = asset.into();
        self.current_frame = 0;
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    pub fn set_repeat(&mut self, repeat: bool) {
        self.repeat = repeat;
    }

    pub fn set_spatial(&mut self, spatial: bool) {
        self.spatial = spatial;
    }

    /// Clamped into `[0, 100]`. NaN is ignored.
    pub fn set_volume(&mut self, volume: f32) {
        if !volume.is_nan() {
            self.volume = volume.clamp(MIN_VOLUME, MAX_VOLUME);
        }
    }

    /// Non-finite positions are ignored.
    pub fn set_position(&mut self, position: Vec3) {
        if position.is_finite() {
            self.position = position;
        }
    }

    pub fn set_crossfade(&mut self, crossfade: Duration) {
        self.crossfade = crossfade;
    }

    pub(crate) fn is_audible(&self) -> bool {
        self.active && self.playing
    }

    /// Applies end-of-clip handling when the cursor has run past the asset.
    pub(crate) fn wrap_or_stop(&mut self) -> Option<EndOfClip> {
        if self.current_frame < self.frame_count {
            return None;
        }

        self.current_frame = 0;
        if self.repeat {
            Some(EndOfClip::Looped)
        } else {
            self.playing = false;
            Some(EndOfClip::Stopped)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndOfClip {
    Looped,
    Stopped,
}

/// The audio "ears" used for volume and distance attenuation.
#[derive(Debug, Clone)]
pub struct ListenerSource {
    pub(crate) active: bool,
    pub(crate) volume: f32,
    pub(crate) spatial: bool,
    pub(crate) max_distance: f32,
    pub(crate) attenuation: f32,
    pub(crate) rolloff: f32,
    pub(crate) pose: Pose,
}

impl Default for ListenerSource {
    fn default() -> Self {
        Self {
            active: true,
            volume: MAX_VOLUME,
            spatial: true,
            max_distance: 100.0,
            attenuation: 1.0,
            rolloff: 1.0,
            pose: Pose::identity(),
        }
    }
}

impl ListenerSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.set_pose(pose);
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.set_volume(volume);
        self
    }

    pub fn with_spatial(mut self, spatial: bool) -> Self {
        self.spatial = spatial;
        self
    }

    pub fn with_max_distance(mut self, max_distance: f32) -> Self {
        self.set_max_distance(max_distance);
        self
    }

    pub fn with_attenuation(mut self, attenuation: f32) -> Self {
        self.set_attenuation(attenuation);
        self
    }

    pub fn with_rolloff(mut self, rolloff: f32) -> Self {
        self.set_rolloff(rolloff);
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_spatial(&self) -> bool {
        self.spatial
    }

    pub fn max_distance(&self) -> f32 {
        self.max_distance
    }

    pub fn attenuation(&self) -> f32 {
        self.attenuation
    }

    pub fn rolloff(&self) -> f32 {
        self.rolloff
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Clamped into `[0, 100]`. NaN is ignored.
    pub fn set_volume(&mut self, volume: f32) {
        if !volume.is_nan() {
            self.volume = volume.clamp(MIN_VOLUME, MAX_VOLUME);
        }
    }

    pub fn set_spatial(&mut self, spatial: bool) {
        self.spatial = spatial;
    }

    /// Non-positive distances are raised to `f32::EPSILON`. NaN and infinity are ignored.
    pub fn set_max_distance(&mut self, max_distance: f32) {
        if max_distance.is_finite() {
            self.max_distance = max_distance.max(f32::EPSILON);
        }
    }

    /// Clamped into `[0, 1]`. NaN is ignored.
    pub fn set_attenuation(&mut self, attenuation: f32) {
        if !attenuation.is_nan() {
            self.attenuation = attenuation.clamp(0.0, 1.0);
        }
    }

    /// Clamped into `[0.1, 8.0]`. NaN is ignored.
    pub fn set_rolloff(&mut self, rolloff: f32) {
        if !rolloff.is_nan() {
            self.rolloff = rolloff.clamp(MIN_ROLLOFF, MAX_ROLLOFF);
        }
    }

    /// Poses with a non-finite position or rotation are ignored.
    pub fn set_pose(&mut self, pose: Pose) {
        if pose.position.is_finite() && pose.rotation.is_finite() {
            self.pose = pose;
        }
    }

    /// Distance falloff for a source at `position`, in `[1 - attenuation, 1]`.
    pub fn distance_gain(&self, position: Vec3) -> f32 {
        let ratio = (self.pose.distance_to(position) / self.max_distance).clamp(0.0, 1.0);
        1.0 - self.attenuation * ratio.powf(self.rolloff)
    }
}

/// Sound-bearing component as attached by the ECS.
#[derive(Debug, Clone)]
pub enum Component {
    Sound(SoundSource),
    Listener(ListenerSource),
}

impl Component {
    pub fn sound(asset: impl Into<String>) -> Self {
        Self::Sound(SoundSource::sound(asset))
    }

    pub fn music(asset: impl Into<String>) -> Self {
        Self::Sound(SoundSource::music(asset))
    }

    pub fn listener() -> Self {
        Self::Listener(ListenerSource::default())
    }

    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Sound(source) => match source.kind {
                SoundKind::Sound => ComponentKind::Sound,
                SoundKind::Music => ComponentKind::Music,
            },
            Self::Listener(_) => ComponentKind::Listener,
        }
    }
}

impl From<SoundSource> for Component {
    fn from(source: SoundSource) -> Self {
        Self::Sound(source)
    }
}

impl From<ListenerSource> for Component {
    fn from(listener: ListenerSource) -> Self {
        Self::Listener(listener)
    }
}
