use crate::error::{AudioError, Result};
use rubato::{FftFixedIn, Resampler};

/// Offline sample-rate converter for decoded assets.
pub struct AudioResampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    channels: u16,
    chunk_size: usize,
}

impl AudioResampler {
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: u16,
        chunk_size: Option<usize>,
    ) -> Result<Self> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(AudioError::AudioFormat(
                "Sample rates must be greater than 0".to_string(),
            ));
        }

        if channels == 0 {
            return Err(AudioError::AudioFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            channels,
            chunk_size: chunk_size.unwrap_or(1024).max(1),
        })
    }

    /// Number of frames `source_frames` occupies at the target rate (rounded up).
    pub fn output_frames(&self, source_frames: usize) -> usize {
        let numerator = source_frames as u64 * self.target_sample_rate as u64;
        numerator.div_ceil(self.source_sample_rate as u64) as usize
    }

    pub fn resample_channel(&self, channel_samples: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            return Ok(channel_samples.to_vec());
        }

        let mut resampler = FftFixedIn::<f32>::new(
            self.source_sample_rate as usize,
            self.target_sample_rate as usize,
            self.chunk_size,
            2, // sub_chunks
            1, // single channel
        )
        .map_err(|e| AudioError::Resample(format!("Failed to create resampler: {}", e)))?;

        let expected = self.output_frames(channel_samples.len());
        let delay = resampler.output_delay();
        let mut output = Vec::with_capacity(delay + expected + 2 * self.chunk_size);
        let mut input_chunk = vec![0.0f32; self.chunk_size];
        let mut chunks = channel_samples.chunks(self.chunk_size);

        // Keep feeding silence after the input until the delayed tail is out
        while output.len() < delay + expected {
            match chunks.next() {
                Some(chunk) => {
                    // Zero-pad the tail chunk to the fixed input size
                    input_chunk[..chunk.len()].copy_from_slice(chunk);
                    input_chunk[chunk.len()..].fill(0.0);
                }
                None => input_chunk.fill(0.0),
            }

            let waves_out = resampler
                .process(&[&input_chunk[..]], None)
                .map_err(|e| AudioError::Resample(format!("Resampling error: {}", e)))?;

            match waves_out.first() {
                Some(first_channel) if !first_channel.is_empty() => {
                    output.extend_from_slice(first_channel)
                }
                _ => break,
            }
        }

        output.drain(..delay.min(output.len()));
        output.resize(expected, 0.0);
        Ok(output)
    }

    pub fn resample_interleaved(&self, interleaved_samples: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            return Ok(interleaved_samples.to_vec());
        }

        let channels = self.channels as usize;
        let resampled_channels = (0..channels)
            .map(|ch| {
                let channel_data: Vec<f32> = interleaved_samples
                    .chunks(channels)
                    .map(|frame| frame.get(ch).copied().unwrap_or(0.0))
                    .collect();
                self.resample_channel(&channel_data)
            })
            .collect::<Result<Vec<_>>>()?;

        let new_frames = resampled_channels.first().map_or(0, Vec::len);
        let mut interleaved = Vec::with_capacity(new_frames * channels);
        for frame_idx in 0..new_frames {
            for channel in &resampled_channels {
                interleaved.push(channel[frame_idx]);
            }
        }

        Ok(interleaved)
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    pub fn resample_ratio(&self) -> f64 {
        self.target_sample_rate as f64 / self.source_sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resampler_creation() {
        let resampler = AudioResampler::new(44100, 48000, 2, None);
        assert!(resampler.is_ok());

        let resampler = resampler.unwrap();
        assert_eq!(resampler.source_sample_rate(), 44100);
        assert_eq!(resampler.target_sample_rate(), 48000);
    }

    #[test]
    fn test_resampler_no_resampling_needed() {
        let resampler = AudioResampler::new(44100, 44100, 1, None).unwrap();
        let samples = vec![0.1, 0.2, 0.3, 0.4];
        let result = resampler.resample_channel(&samples).unwrap();
        assert_eq!(result, samples);
    }

    #[test]
    fn test_invalid_sample_rates() {
        assert!(AudioResampler::new(0, 48000, 2, None).is_err());
        assert!(AudioResampler::new(44100, 0, 2, None).is_err());
        assert!(AudioResampler::new(44100, 48000, 0, None).is_err());
    }

    #[test]
    fn test_output_length_matches_rate_ratio() {
        let resampler = AudioResampler::new(24000, 48000, 2, Some(256)).unwrap();
        assert_eq!(resampler.output_frames(1000), 2000);

        let interleaved = vec![0.25f32; 1000 * 2];
        let result = resampler.resample_interleaved(&interleaved).unwrap();
        assert_eq!(result.len(), 2000 * 2);
    }

    #[test]
    fn test_constant_signal_keeps_level_at_both_ends() {
        let resampler = AudioResampler::new(24000, 48000, 1, Some(256)).unwrap();
        let result = resampler.resample_channel(&vec![0.5f32; 1024]).unwrap();
        assert_eq!(result.len(), 2048);

        // No ramp-in at the start and no lost tail at the end
        for (frame, &sample) in result.iter().enumerate().take(16) {
            assert!(sample > 0.3, "frame {}: {}", frame, sample);
        }
        for (frame, &sample) in result.iter().enumerate().skip(2032) {
            assert!(sample > 0.1, "frame {}: {}", frame, sample);
        }
        for &sample in &result[256..1792] {
            assert!((sample - 0.5).abs() < 0.02);
        }
    }
}
