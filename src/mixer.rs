// Mixer module - sums every playing source into one interleaved output block.
// Runs on the audio thread with the engine's mixer lock held: no allocation,
// no logging, no waiting on anything but that lock.

use crate::asset::AssetResolver;
use crate::events::{AudioEvent, EventSink};
use crate::registry::Registry;
use crate::slots::Slots;
use crate::source::{EndOfClip, ListenerSource, SoundSource, MAX_VOLUME};

/// Everything guarded by the engine's mixer lock.
#[derive(Debug)]
pub(crate) struct MixerState {
    pub sounds: Slots<SoundSource>,
    pub listeners: Slots<ListenerSource>,
    pub registry: Registry,
}

impl MixerState {
    pub fn new(max_sources: usize, max_listeners: usize) -> Self {
        Self {
            sounds: Slots::with_capacity(max_sources),
            listeners: Slots::with_capacity(max_listeners),
            registry: Registry::with_capacity(max_sources, max_listeners),
        }
    }
}

/// Mix all registered sources into `output`, then hard-clip it.
///
/// # Arguments
/// * `state` - Sources, listeners and registry (mixer lock held by the caller)
/// * `assets` - Resolves each source's asset name; unresolved sources are skipped
/// * `events` - Receives loop/completion events
/// * `output` - Interleaved block, already zero-filled by the caller
/// * `channels` - Output channel count of the open device
///
/// # End of clip
/// When a source's cursor reaches its asset's frame count it either wraps to
/// frame 0 (`repeat`) or stops with the cursor reset to 0. A stopped source
/// contributes nothing for the rest of the block.
pub(crate) fn mix_block(
    state: &mut MixerState,
    assets: &dyn AssetResolver,
    events: &EventSink,
    output: &mut [f32],
    channels: usize,
) {
    if channels == 0 || state.registry.sources().is_empty() {
        return;
    }

    let MixerState {
        sounds,
        listeners,
        registry,
    } = state;

    let listener = registry
        .listeners()
        .iter()
        .filter_map(|handle| listeners.get(handle.0))
        .find(|listener| listener.is_active());

    for &handle in registry.sources() {
        let Some(source) = sounds.get_mut(handle.0) else {
            continue;
        };
        if !source.is_audible() {
            continue;
        }

        let Some(asset) = assets.resolve(&source.asset) else {
            continue;
        };
        let asset_channels = asset.channel_count() as usize;
        if asset.frame_count() == 0 || asset_channels == 0 {
            continue;
        }

        // Assets can be hot-swapped between blocks
        source.frame_count = asset.frame_count();
        let gain = source_gain(source, listener);

        // A short clip can wrap many times per block; report it once
        let mut looped = false;
        for frame in output.chunks_exact_mut(channels) {
            match source.wrap_or_stop() {
                Some(EndOfClip::Looped) => looped = true,
                Some(EndOfClip::Stopped) => {
                    events.emit(AudioEvent::SourceCompleted { source: handle });
                    break;
                }
                None => {}
            }

            let cursor = source.current_frame;
            for (channel, sample) in frame.iter_mut().enumerate() {
                // Mono feeds every output channel; wider assets clamp to their last channel
                *sample += asset.sample(cursor, channel.min(asset_channels - 1)) * gain;
            }
            source.current_frame += 1;
        }

        if source.playing {
            match source.wrap_or_stop() {
                Some(EndOfClip::Looped) => looped = true,
                Some(EndOfClip::Stopped) => {
                    events.emit(AudioEvent::SourceCompleted { source: handle })
                }
                None => {}
            }
        }
        if looped {
            events.emit(AudioEvent::SourceLooped { source: handle });
        }
    }

    clip(output);
}

/// Hard-limit every sample to `[-1.0, 1.0]`; NaN and infinite samples become silence.
pub(crate) fn clip(output: &mut [f32]) {
    for sample in output.iter_mut() {
        *sample = if sample.is_finite() {
            sample.clamp(-1.0, 1.0)
        } else {
            0.0
        };
    }
}

fn source_gain(source: &SoundSource, listener: Option<&ListenerSource>) -> f32 {
    let mut gain = source.volume / MAX_VOLUME;
    if let Some(listener) = listener {
        gain *= listener.volume / MAX_VOLUME;
        if source.spatial && listener.spatial {
            gain *= listener.distance_gain(source.position);
        }
    }
    gain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::PcmAsset;
    use crate::math::{Pose, Vec3};
    use crate::source::SoundHandle;
    use crossbeam_channel::Receiver;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct Fixture {
        state: MixerState,
        assets: HashMap<String, Arc<PcmAsset>>,
        events: EventSink,
        receiver: Receiver<AudioEvent>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_event_capacity(64)
        }

        fn with_event_capacity(capacity: usize) -> Self {
            let (events, receiver) = EventSink::bounded(capacity);
            Self {
                state: MixerState::new(8, 2),
                assets: HashMap::new(),
                events,
                receiver,
            }
        }

        fn asset(&mut self, name: &str, samples: Vec<f32>, channels: u16) {
            let asset = PcmAsset::new(samples, channels, 48000).unwrap();
            self.assets.insert(name.to_string(), Arc::new(asset));
        }

        fn add(&mut self, source: SoundSource) -> SoundHandle {
            let handle = SoundHandle(self.state.sounds.insert(source));
            self.state.registry.add_source(handle);
            handle
        }

        fn add_listener(&mut self, listener: ListenerSource) {
            let handle = crate::source::ListenerHandle(self.state.listeners.insert(listener));
            self.state.registry.add_listener(handle);
        }

        fn source(&self, handle: SoundHandle) -> &SoundSource {
            self.state.sounds.get(handle.0).unwrap()
        }

        fn mix(&mut self, frames: usize, channels: usize) -> Vec<f32> {
            let assets = self.assets.clone();
            let resolver = move |name: &str| assets.get(name).cloned();
            let mut output = vec![0.0; frames * channels];
            mix_block(
                &mut self.state,
                &resolver,
                &self.events,
                &mut output,
                channels,
            );
            output
        }

        fn events(&self) -> Vec<AudioEvent> {
            self.receiver.try_iter().collect()
        }
    }

    #[test]
    fn test_silence_with_empty_registry() {
        let mut fixture = Fixture::new();
        assert!(fixture.mix(64, 2).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_silence_when_nothing_plays() {
        let mut fixture = Fixture::new();
        fixture.asset("tone", vec![0.5; 16], 1);
        fixture.add(SoundSource::sound("tone"));
        let mut inactive = SoundSource::sound("tone").with_playing(true);
        inactive.set_active(false);
        fixture.add(inactive);

        assert!(fixture.mix(16, 2).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_mono_duplicated_to_every_channel() {
        let mut fixture = Fixture::new();
        fixture.asset("mono", vec![0.25, -0.5, 0.75], 1);
        fixture.add(SoundSource::sound("mono").with_playing(true));

        let output = fixture.mix(3, 2);
        assert_eq!(output, vec![0.25, 0.25, -0.5, -0.5, 0.75, 0.75]);
    }

    #[test]
    fn test_example_scenario() {
        let mut fixture = Fixture::new();
        fixture.asset("clip", vec![0.1, 0.2, 0.3, 0.4], 1);
        let handle = fixture.add(
            SoundSource::sound("clip")
                .with_playing(true)
                .with_repeat(true)
                .with_start_frame(2),
        );

        let output = fixture.mix(4, 1);
        assert_eq!(output, vec![0.3, 0.4, 0.1, 0.2]);
        assert_eq!(fixture.source(handle).current_frame(), 2);
        assert_eq!(
            fixture.events(),
            vec![AudioEvent::SourceLooped { source: handle }]
        );
    }

    #[test]
    fn test_loop_wraps_without_skipping_frames() {
        let mut fixture = Fixture::new();
        fixture.asset("loop", vec![1.0 / 8.0, 2.0 / 8.0, 3.0 / 8.0, 4.0 / 8.0], 1);
        let handle = fixture.add(
            SoundSource::sound("loop")
                .with_playing(true)
                .with_repeat(true)
                .with_start_frame(3),
        );

        let output = fixture.mix(3, 1);
        assert_eq!(output, vec![4.0 / 8.0, 1.0 / 8.0, 2.0 / 8.0]);
        assert_eq!(fixture.source(handle).current_frame(), 2);
        assert!(fixture.source(handle).is_playing());
    }

    #[test]
    fn test_stop_at_end_then_silence() {
        let mut fixture = Fixture::new();
        fixture.asset("shot", vec![0.5, 0.5, 0.5], 1);
        let handle = fixture.add(SoundSource::sound("shot").with_playing(true));

        let output = fixture.mix(5, 1);
        assert_eq!(output, vec![0.5, 0.5, 0.5, 0.0, 0.0]);

        let source = fixture.source(handle);
        assert!(!source.is_playing());
        assert_eq!(source.current_frame(), 0);
        assert_eq!(
            fixture.events(),
            vec![AudioEvent::SourceCompleted { source: handle }]
        );

        assert!(fixture.mix(5, 1).iter().all(|&s| s == 0.0));
        assert!(fixture.events().is_empty());

        // Replaying starts from the beginning
        fixture.state.sounds.get_mut(handle.0).unwrap().set_playing(true);
        assert_eq!(fixture.mix(2, 1), vec![0.5, 0.5]);
    }

    #[test]
    fn test_clip_ending_exactly_on_block_boundary_stops() {
        let mut fixture = Fixture::new();
        fixture.asset("shot", vec![0.5; 4], 1);
        let handle = fixture.add(SoundSource::sound("shot").with_playing(true));

        fixture.mix(4, 1);
        let source = fixture.source(handle);
        assert!(!source.is_playing());
        assert_eq!(source.current_frame(), 0);
    }

    #[test]
    fn test_sum_is_hard_clipped() {
        let mut fixture = Fixture::new();
        fixture.asset("up", vec![0.9; 2], 1);
        fixture.asset("down", vec![-0.9; 2], 1);
        fixture.add(SoundSource::sound("up").with_playing(true));
        fixture.add(SoundSource::sound("up").with_playing(true));
        assert_eq!(fixture.mix(2, 1), vec![1.0, 1.0]);

        let mut fixture_neg = Fixture::new();
        fixture_neg.asset("down", vec![-0.9; 2], 1);
        fixture_neg.add(SoundSource::sound("down").with_playing(true));
        fixture_neg.add(SoundSource::sound("down").with_playing(true));
        assert_eq!(fixture_neg.mix(2, 1), vec![-1.0, -1.0]);
    }

    #[test]
    fn test_non_finite_samples_become_silence() {
        let mut output = [f32::NAN, f32::INFINITY, f32::NEG_INFINITY, 1.5, -0.25];
        clip(&mut output);
        assert_eq!(output, [0.0, 0.0, 0.0, 1.0, -0.25]);

        let mut fixture = Fixture::new();
        fixture.asset("tone", vec![0.5; 4], 1);
        let handle = fixture.add(SoundSource::sound("tone").with_playing(true));
        fixture.state.sounds.get_mut(handle.0).unwrap().volume = f32::NAN;

        let output = fixture.mix(4, 1);
        assert!(output.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_short_loop_reports_once_per_block() {
        let mut fixture = Fixture::with_event_capacity(4);
        fixture.asset("tick", vec![0.1], 1);
        fixture.asset("shot", vec![0.2, 0.2], 1);
        let tick = fixture.add(SoundSource::sound("tick").with_playing(true).with_repeat(true));
        let shot = fixture.add(SoundSource::sound("shot").with_playing(true));

        fixture.mix(512, 1);
        let events = fixture.events();
        assert_eq!(events.len(), 2);
        assert!(events.contains(&AudioEvent::SourceLooped { source: tick }));
        assert!(events.contains(&AudioEvent::SourceCompleted { source: shot }));
        assert!(!fixture.source(shot).is_playing());

        fixture.mix(512, 1);
        assert_eq!(
            fixture.events(),
            vec![AudioEvent::SourceLooped { source: tick }]
        );
    }

    #[test]
    fn test_channel_clamp_not_wrap() {
        let mut fixture = Fixture::new();
        fixture.asset("stereo", vec![0.1, 0.2], 2);
        fixture.add(SoundSource::sound("stereo").with_playing(true));

        let output = fixture.mix(1, 4);
        assert_eq!(output, vec![0.1, 0.2, 0.2, 0.2]);
    }

    #[test]
    fn test_missing_asset_is_skipped() {
        let mut fixture = Fixture::new();
        fixture.asset("real", vec![0.5; 2], 1);
        let ghost = fixture.add(SoundSource::sound("not_loaded").with_playing(true));
        fixture.add(SoundSource::sound("real").with_playing(true));

        assert_eq!(fixture.mix(2, 1), vec![0.5, 0.5]);
        assert!(fixture.source(ghost).is_playing());
        assert_eq!(fixture.source(ghost).current_frame(), 0);
    }

    #[test]
    fn test_empty_asset_is_skipped() {
        let mut fixture = Fixture::new();
        fixture.asset("empty", Vec::new(), 2);
        let handle = fixture.add(SoundSource::sound("empty").with_playing(true));

        assert!(fixture.mix(4, 2).iter().all(|&s| s == 0.0));
        assert!(fixture.source(handle).is_playing());
    }

    #[test]
    fn test_hot_swap_refreshes_frame_count() {
        let mut fixture = Fixture::new();
        fixture.asset("bgm", vec![0.1; 8], 1);
        let handle = fixture.add(SoundSource::music("bgm").with_playing(true).with_repeat(true));

        fixture.mix(6, 1);
        assert_eq!(fixture.source(handle).frame_count(), 8);
        assert_eq!(fixture.source(handle).current_frame(), 6);

        // Shorter replacement: the cursor is already past its end and wraps
        fixture.asset("bgm", vec![0.2; 4], 1);
        let output = fixture.mix(2, 1);
        assert_eq!(output, vec![0.2, 0.2]);
        assert_eq!(fixture.source(handle).frame_count(), 4);
        assert_eq!(fixture.source(handle).current_frame(), 2);
    }

    #[test]
    fn test_volume_and_spatial_attenuation() {
        let mut fixture = Fixture::new();
        fixture.asset("tone", vec![0.8; 1], 1);
        fixture.add(SoundSource::sound("tone").with_playing(true).with_volume(50.0));
        assert_eq!(fixture.mix(1, 1), vec![0.4]);

        let mut spatial = Fixture::new();
        spatial.asset("tone", vec![0.8; 1], 1);
        spatial.add_listener(
            ListenerSource::new()
                .with_pose(Pose::from_position(Vec3::ZERO))
                .with_max_distance(10.0)
                .with_attenuation(1.0)
                .with_rolloff(1.0),
        );
        spatial.add(
            SoundSource::sound("tone")
                .with_playing(true)
                .with_spatial(true)
                .with_position(Vec3::new(5.0, 0.0, 0.0)),
        );
        let output = spatial.mix(1, 1);
        assert!((output[0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_non_spatial_source_ignores_distance() {
        let mut fixture = Fixture::new();
        fixture.asset("tone", vec![0.8; 1], 1);
        fixture.add_listener(ListenerSource::new().with_max_distance(1.0));
        fixture.add(
            SoundSource::sound("tone")
                .with_playing(true)
                .with_position(Vec3::new(500.0, 0.0, 0.0)),
        );
        assert_eq!(fixture.mix(1, 1), vec![0.8]);
    }
}
