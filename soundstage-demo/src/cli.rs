use anyhow::{Context, Result};
use soundstage::device::mock::{MockBackend, MockControl};
use soundstage::{
    AssetCache, AudioBackend, AudioConfig, AudioEngine, AudioEvent, ComponentHandle, CpalBackend,
    ListenerSource, PcmAsset, Pose, SoundSource, Vec3,
};
use std::sync::Arc;
use std::time::Duration;

const TONE_RATE: u32 = 44100;
const TONE_HZ: f32 = 440.0;

pub fn run(mock: bool) -> Result<()> {
    let (backend, control): (Box<dyn AudioBackend>, Option<MockControl>) = if mock {
        let backend = MockBackend::new(&["Mock Speakers", "Mock Headphones"]);
        let control = backend.control();
        (Box::new(backend) as Box<dyn AudioBackend>, Some(control))
    } else {
        (Box::new(CpalBackend::new()) as Box<dyn AudioBackend>, None)
    };

    let assets = Arc::new(AssetCache::new());
    let engine = AudioEngine::new(AudioConfig::default(), assets.clone(), backend)?;

    if let Err(e) = engine.initialize() {
        log::error!("Audio unavailable, nothing to play: {}", e);
        return Ok(());
    }

    for (index, device) in engine.devices().iter().enumerate() {
        log::info!(
            "Device {}: {}{}",
            index,
            device.name,
            if device.is_default { " (default)" } else { "" }
        );
    }

    let format = engine
        .current_format()
        .context("No output device could be opened")?;
    log::info!(
        "Playing on '{}' at {} Hz",
        engine.current_device_name().unwrap_or_default(),
        format.sample_rate
    );

    // Generated at a fixed rate and converted to whatever the device runs at
    let tone = PcmAsset::new(sine(TONE_HZ, TONE_RATE, 0.5), 1, TONE_RATE)?;
    assets.insert_resampled("tone", &tone, format.sample_rate)?;

    engine.on_component_added(ListenerSource::new().with_pose(Pose::from_position(Vec3::ZERO)));
    let ComponentHandle::Sound(handle) = engine.on_component_added(
        SoundSource::sound("tone")
            .with_repeat(true)
            .with_spatial(true)
            .with_position(Vec3::new(0.0, 0.0, -10.0)),
    ) else {
        anyhow::bail!("Expected a sound handle");
    };

    let binding = engine.sound_binding(handle)?;
    binding.set("volume", 60.0)?;
    binding.set_playing(true)?;

    play_for(&engine, control.as_ref(), Duration::from_secs(2));

    if engine.devices().len() > 1 {
        let next = (engine.current_device_index().unwrap_or(0) + 1) % engine.devices().len();
        match engine.select_device(next) {
            Ok(_) => log::info!(
                "Switched to '{}'",
                engine.current_device_name().unwrap_or_default()
            ),
            Err(e) => log::warn!("Device switch failed: {}", e),
        }
        play_for(&engine, control.as_ref(), Duration::from_secs(2));
    }

    binding.set_repeat(false)?;
    play_for(&engine, control.as_ref(), Duration::from_secs(1));

    engine.shutdown();
    log::info!("Demo finished");
    Ok(())
}

/// Lets audio play while reporting events. With the mock backend, blocks are pulled here.
fn play_for(engine: &AudioEngine, control: Option<&MockControl>, duration: Duration) {
    let step = Duration::from_millis(10);
    let mut elapsed = Duration::ZERO;

    while elapsed < duration {
        if let Some(control) = control {
            control.render(480);
        }
        std::thread::sleep(step);
        elapsed += step;

        for event in engine.poll_events() {
            match event {
                AudioEvent::SourceLooped { .. } => log::debug!("{:?}", event),
                other => log::info!("{:?}", other),
            }
        }
    }
}

fn sine(frequency: f32, sample_rate: u32, seconds: f32) -> Vec<f32> {
    let frames = (sample_rate as f32 * seconds) as usize;
    (0..frames)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.5 * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}
