//! Decoded PCM assets and how the mixer finds them.
//!
//! Decoding is the asset pipeline's job; this module starts from interleaved
//! `f32` samples. Assets are shared as `Arc<PcmAsset>`, so evicting one from
//! the cache never frees a buffer a mix block is still reading.

mod resampler;

use crate::error::{AudioError, Result};
use crate::sync::lock;
pub use resampler::AudioResampler;
use std::collections::HashMap;
use std::sync::{
    Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError,
};
use std::time::Duration;

/// Immutable decoded audio buffer.
///
/// # Data Format
/// Samples are **INTERLEAVED**: stereo is stored as `[L0, R0, L1, R1, ...]`,
/// mono as `[M0, M1, ...]`. Total length = `frame_count * channel_count`.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAsset {
    samples: Vec<f32>,
    channel_count: u16,
    sample_rate: u32,
    frame_count: usize,
}

impl PcmAsset {
    pub fn new(samples: Vec<f32>, channel_count: u16, sample_rate: u32) -> Result<Self> {
        if channel_count == 0 {
            return Err(AudioError::AudioFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }

        if sample_rate == 0 {
            return Err(AudioError::AudioFormat(
                "Sample rate must be greater than 0".to_string(),
            ));
        }

        if samples.len() % channel_count as usize != 0 {
            return Err(AudioError::AudioFormat(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channel_count
            )));
        }

        if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
            return Err(AudioError::AudioFormat(format!(
                "Sample {} is not a finite number",
                index
            )));
        }

        let frame_count = samples.len() / channel_count as usize;
        Ok(Self {
            samples,
            channel_count,
            sample_rate,
            frame_count,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample at `frame` for `channel`; callers guarantee both are in range.
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        self.samples[frame * self.channel_count as usize + channel]
    }

    /// Get samples for a specific channel (0-indexed)
    pub fn channel_samples(&self, channel: usize) -> Result<Vec<f32>> {
        if channel >= self.channel_count as usize {
            return Err(AudioError::AudioFormat(format!(
                "Channel {} out of range (max: {})",
                channel,
                self.channel_count - 1
            )));
        }

        Ok(self
            .samples
            .chunks(self.channel_count as usize)
            .map(|frame| frame[channel])
            .collect())
    }

    /// Convert to mono by averaging all channels
    pub fn to_mono(&self) -> Self {
        if self.channel_count == 1 {
            return self.clone();
        }

        let channels = self.channel_count as f32;
        let samples = self
            .samples
            .chunks(self.channel_count as usize)
            .map(|frame| frame.iter().sum::<f32>() / channels)
            .collect();

        Self {
            samples,
            channel_count: 1,
            sample_rate: self.sample_rate,
            frame_count: self.frame_count,
        }
    }

    /// Resample to a different sample rate using rubato
    pub fn resample(&self, target_sample_rate: u32) -> Result<Self> {
        if target_sample_rate == self.sample_rate {
            return Ok(self.clone());
        }

        let resampler = AudioResampler::new(
            self.sample_rate,
            target_sample_rate,
            self.channel_count,
            Some(1024),
        )?;

        let samples = resampler.resample_interleaved(&self.samples)?;
        Self::new(samples, self.channel_count, target_sample_rate)
    }
}

/// Resolves a logical sound name to its current decoded buffer.
///
/// Called from the audio thread once per playing source per mix block, with
/// the mixer lock held. Implementations must return quickly and must not wait
/// on a lock the host can hold. Returning `None` skips the source for that
/// block only.
///
/// The mixer drops its `Arc` at the end of the block. If that is the last
/// reference the buffer is freed on the audio thread, so resolvers should keep
/// replaced buffers alive until the host releases them (as [`AssetCache`] does).
pub trait AssetResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<PcmAsset>>;
}

impl<F> AssetResolver for F
where
    F: Fn(&str) -> Option<Arc<PcmAsset>> + Send + Sync,
{
    fn resolve(&self, name: &str) -> Option<Arc<PcmAsset>> {
        self(name)
    }
}

/// Name-keyed store of decoded assets.
///
/// Replacing an entry under the same name hot-swaps it: sources pick up the new
/// buffer on their next mix block. Replaced and evicted buffers are parked until
/// no mix block holds them and are then freed by the next `insert`, `remove` or
/// [`AssetCache::collect_retired`] call on a host thread.
///
/// [`AssetResolver::resolve`] never waits: while the host holds the write lock
/// the lookup misses and the source is skipped for one block.
#[derive(Debug, Default)]
pub struct AssetCache {
    assets: RwLock<HashMap<String, Arc<PcmAsset>>>,
    retired: Mutex<Vec<Arc<PcmAsset>>>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache with room for `capacity` names before the map has to grow.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            assets: RwLock::new(HashMap::with_capacity(capacity)),
            retired: Mutex::default(),
        }
    }

    pub fn insert(&self, name: impl Into<String>, asset: PcmAsset) -> Arc<PcmAsset> {
        self.collect_retired();

        let asset = Arc::new(asset);
        let previous = self.write().insert(name.into(), asset.clone());
        if let Some(previous) = previous {
            self.retire(previous);
        }
        asset
    }

    /// Inserts `asset` converted to `target_sample_rate` (usually the device rate).
    pub fn insert_resampled(
        &self,
        name: impl Into<String>,
        asset: &PcmAsset,
        target_sample_rate: u32,
    ) -> Result<Arc<PcmAsset>> {
        let resampled = asset.resample(target_sample_rate)?;
        Ok(self.insert(name, resampled))
    }

    /// Evicts an asset. Sources that still reference the name go silent.
    pub fn remove(&self, name: &str) -> Option<Arc<PcmAsset>> {
        self.collect_retired();

        let removed = self.write().remove(name)?;
        self.retire(removed.clone());
        Some(removed)
    }

    /// Frees every replaced or evicted buffer that no mix block still holds.
    /// Returns how many buffers are still waiting.
    pub fn collect_retired(&self) -> usize {
        let mut retired = lock(&self.retired);
        retired.retain(|asset| Arc::strong_count(asset) > 1);
        retired.len()
    }

    pub fn get(&self, name: &str) -> Option<Arc<PcmAsset>> {
        self.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn retire(&self, asset: Arc<PcmAsset>) {
        lock(&self.retired).push(asset);
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<PcmAsset>>> {
        self.assets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<PcmAsset>>> {
        self.assets.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AssetResolver for AssetCache {
    fn resolve(&self, name: &str) -> Option<Arc<PcmAsset>> {
        match self.assets.try_read() {
            Ok(assets) => assets.get(name).cloned(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().get(name).cloned(),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_validation() {
        assert!(PcmAsset::new(vec![0.0; 4], 0, 48000).is_err());
        assert!(PcmAsset::new(vec![0.0; 4], 2, 0).is_err());
        assert!(PcmAsset::new(vec![0.0; 5], 2, 48000).is_err());
        assert!(PcmAsset::new(vec![0.5, f32::NAN], 1, 48000).is_err());
        assert!(PcmAsset::new(vec![f32::INFINITY, 0.5], 1, 48000).is_err());

        let asset = PcmAsset::new(vec![0.0; 6], 2, 48000).unwrap();
        assert_eq!(asset.frame_count(), 3);
        assert_eq!(asset.channel_count(), 2);
    }

    #[test]
    fn test_interleaved_access() {
        let asset = PcmAsset::new(vec![0.1, -0.1, 0.2, -0.2], 2, 48000).unwrap();
        assert_eq!(asset.sample(1, 0), 0.2);
        assert_eq!(asset.sample(1, 1), -0.2);
        assert_eq!(asset.channel_samples(1).unwrap(), vec![-0.1, -0.2]);
        assert!(asset.channel_samples(2).is_err());
    }

    #[test]
    fn test_to_mono_averages_channels() {
        let asset = PcmAsset::new(vec![0.5, 0.1, -0.4, 0.0], 2, 44100).unwrap();
        let mono = asset.to_mono();
        assert_eq!(mono.channel_count(), 1);
        assert_eq!(mono.frame_count(), 2);
        assert!((mono.samples()[0] - 0.3).abs() < 1e-6);
        assert!((mono.samples()[1] + 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_duration() {
        let asset = PcmAsset::new(vec![0.0; 48000], 1, 48000).unwrap();
        assert_eq!(asset.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_cache_hot_swap_and_evict() {
        let cache = AssetCache::new();
        cache.insert("blip", PcmAsset::new(vec![0.1; 4], 1, 48000).unwrap());
        let old = cache.resolve("blip").unwrap();
        assert_eq!(old.frame_count(), 4);

        cache.insert("blip", PcmAsset::new(vec![0.2; 8], 1, 48000).unwrap());
        assert_eq!(cache.resolve("blip").unwrap().frame_count(), 8);
        // The previously resolved buffer stays valid.
        assert_eq!(old.samples()[0], 0.1);

        assert!(cache.remove("blip").is_some());
        assert!(cache.resolve("blip").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_replaced_buffer_outlives_cache_entry() {
        let cache = AssetCache::new();
        cache.insert("blip", PcmAsset::new(vec![0.1; 4], 1, 48000).unwrap());
        let in_use = cache.resolve("blip").unwrap();

        cache.insert("blip", PcmAsset::new(vec![0.2; 4], 1, 48000).unwrap());
        assert!(cache.remove("blip").is_some());

        // The mix block's copy is never the last one
        assert_eq!(cache.collect_retired(), 2);
        assert!(Arc::strong_count(&in_use) > 1);
        drop(in_use);
        assert_eq!(cache.collect_retired(), 0);
    }

    #[test]
    fn test_resolve_does_not_wait_for_writer() {
        let cache = AssetCache::with_capacity(4);
        cache.insert("blip", PcmAsset::new(vec![0.1; 4], 1, 48000).unwrap());

        let guard = cache.assets.write().unwrap();
        assert!(cache.resolve("blip").is_none());
        drop(guard);
        assert!(cache.resolve("blip").is_some());
    }

    #[test]
    fn test_insert_resampled() {
        let cache = AssetCache::new();
        let asset = PcmAsset::new(vec![0.0; 2205 * 2], 2, 22050).unwrap();
        let stored = cache.insert_resampled("wind", &asset, 44100).unwrap();
        assert_eq!(stored.sample_rate(), 44100);
        assert_eq!(stored.frame_count(), 4410);
        assert!(cache.contains("wind"));
    }

    #[test]
    fn test_closure_resolver() {
        let asset = Arc::new(PcmAsset::new(vec![0.5], 1, 8000).unwrap());
        let resolver = move |name: &str| (name == "one").then(|| asset.clone());
        assert!(resolver.resolve("one").is_some());
        assert!(resolver.resolve("two").is_none());
    }
}
