//! Audio buffers, decoding, resampling, level normalisation and WAV export.
//!
//! Every stage consumes an [`AudioBuffer`] by reference and returns a fresh
//! one, so no two pipeline stages ever alias the same sample storage.
//!
//! ```text
//! file ──► decode::load ──► mono @ native rate ──► resample ──► AudioBuffer @ target rate
//! ```

pub mod decode;
pub mod export;
pub mod resample;

pub use decode::load;
pub use export::export;
pub use resample::{resample, RateConverter};

use tracing::debug;

/// A block of mono PCM samples at a known sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000, 24000, 44100).
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration of this buffer in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples covering `seconds` at this buffer's rate.
    pub fn samples_for(&self, seconds: f64) -> usize {
        (seconds.max(0.0) * self.sample_rate as f64).round() as usize
    }

    /// Copy of `samples[start..end]`, clamped to the buffer bounds.
    pub fn slice(&self, start: usize, end: usize) -> AudioBuffer {
        let end = end.min(self.samples.len());
        let start = start.min(end);
        AudioBuffer::new(self.samples[start..end].to_vec(), self.sample_rate)
    }

    /// Root-mean-square level over the whole buffer.
    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        peak(&self.samples)
    }
}

/// Root-mean-square of a sample slice (0 for an empty slice).
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Largest absolute value of a sample slice (0 for an empty slice).
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// Scale `buffer` so its RMS equals `10^(target_db / 20)`, then hard-clip to [-1, 1].
///
/// Silent input (RMS 0) is returned unchanged.
pub fn normalize_level(buffer: &AudioBuffer, target_db: f32) -> AudioBuffer {
    let current = buffer.rms();
    if current <= 0.0 {
        return buffer.clone();
    }

    let target = 10f32.powf(target_db / 20.0);
    let gain = target / current;
    let mut clipped = 0usize;
    let samples = buffer
        .samples
        .iter()
        .map(|&s| {
            let v = s * gain;
            if v.abs() > 1.0 {
                clipped += 1;
            }
            v.clamp(-1.0, 1.0)
        })
        .collect();

    debug!(target_db, gain, clipped, "level normalised");
    AudioBuffer::new(samples, buffer.sample_rate)
}
