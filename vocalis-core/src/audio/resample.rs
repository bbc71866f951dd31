//! Whole-clip sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! ## Design
//!
//! Sources arrive at whatever rate they were recorded at (44.1 kHz MP3s,
//! 48 kHz stems from the separator, …) while analysis runs at 24 kHz and the
//! speech detector at 16 kHz. `RateConverter` bridges that gap for complete
//! clips: it feeds fixed-size chunks to rubato, flushes the filter tail,
//! strips the resampler's output delay and trims the result to
//! `round(len · to / from)` samples, so duration is preserved to ±1 sample.
//!
//! When source rate == target rate, `RateConverter` is a passthrough and no
//! rubato session is created at all.
//!
//! ## Usage
//!
//! ```ignore
//! let mut rc = RateConverter::new(48_000, 16_000, 1024)?;
//! let out = rc.convert(&raw_samples)?; // Vec<f32> at 16 kHz
//! ```

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

use super::AudioBuffer;
use crate::error::{Result, VocalisError};

/// Input frame count per rubato call.
const CHUNK_SIZE: usize = 1024;
/// Upper bound on tail-flush calls; the delay of a polynomial resampler is tiny.
const MAX_FLUSH_CALLS: usize = 8;

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when source rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    source_rate: u32,
    target_rate: u32,
    /// How many input samples rubato expects per process call.
    chunk_size: usize,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// Create a new converter.
    ///
    /// # Errors
    /// Returns `VocalisError::Resample` if either rate is zero or rubato
    /// fails to initialise.
    pub fn new(source_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(VocalisError::Resample(format!(
                "invalid rates from={source_rate} to={target_rate}"
            )));
        }

        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                source_rate,
                target_rate,
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / source_rate as f64;

        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio, no dynamic adjustment
            PolynomialDegree::Cubic,
            chunk_size,
            1, // mono
        )
        .map_err(|e| VocalisError::Resample(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        let output_buf = vec![vec![0f32; max_out]; 1];

        debug!(
            source_rate,
            target_rate,
            chunk_size,
            max_out,
            delay = resampler.output_delay(),
            "resampler ready"
        );

        Ok(Self {
            resampler: Some(resampler),
            source_rate,
            target_rate,
            chunk_size,
            output_buf,
        })
    }

    /// Returns `true` when source rate == target rate (no resampling occurs).
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    /// Number of output samples a `len`-sample input maps to.
    pub fn expected_len(&self, len: usize) -> usize {
        let exact = len as f64 * self.target_rate as f64 / self.source_rate as f64;
        exact.round() as usize
    }

    /// Convert a complete signal.
    ///
    /// The output holds exactly [`expected_len`](Self::expected_len) samples,
    /// aligned with the input (the filter delay is removed).
    pub fn convert(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let expected = self.expected_len(samples.len());
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(samples.to_vec());
        };

        let delay = resampler.output_delay();
        let mut out = Vec::with_capacity(expected + delay + self.output_buf[0].len());
        let mut pos = 0usize;

        while samples.len() - pos >= self.chunk_size {
            let chunk: &[&[f32]] = &[&samples[pos..pos + self.chunk_size]];
            let (_consumed, produced) = resampler
                .process_into_buffer(chunk, &mut self.output_buf, None)
                .map_err(|e| VocalisError::Resample(e.to_string()))?;
            out.extend_from_slice(&self.output_buf[0][..produced]);
            pos += self.chunk_size;
        }

        if pos < samples.len() {
            let tail: &[&[f32]] = &[&samples[pos..]];
            let (_consumed, produced) = resampler
                .process_partial_into_buffer(Some(tail), &mut self.output_buf, None)
                .map_err(|e| VocalisError::Resample(e.to_string()))?;
            out.extend_from_slice(&self.output_buf[0][..produced]);
        }

        // Push zeros through until the delayed tail of the signal has come out.
        let mut flushes = 0usize;
        while out.len() < expected + delay && flushes < MAX_FLUSH_CALLS {
            let (_consumed, produced) = resampler
                .process_partial_into_buffer(None::<&[&[f32]]>, &mut self.output_buf, None)
                .map_err(|e| VocalisError::Resample(e.to_string()))?;
            if produced == 0 {
                break;
            }
            out.extend_from_slice(&self.output_buf[0][..produced]);
            flushes += 1;
        }

        resampler.reset();

        out.drain(..delay.min(out.len()));
        let pad = out.last().copied().unwrap_or(0.0);
        out.resize(expected, pad);
        Ok(out)
    }
}

/// Resample `buffer` to `target_rate`, returning a new buffer.
///
/// A buffer already at `target_rate` is copied unchanged.
pub fn resample(buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    let mut rc = RateConverter::new(buffer.sample_rate, target_rate, CHUNK_SIZE)?;
    let samples = rc.convert(&buffer.samples)?;
    debug!(
        from = buffer.sample_rate,
        to = target_rate,
        in_len = buffer.len(),
        out_len = samples.len(),
        "resampled"
    );
    Ok(AudioBuffer::new(samples, target_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn passthrough_identity() {
        let mut rc = RateConverter::new(16_000, 16_000, 960).unwrap();
        assert!(rc.is_passthrough());
        let samples: Vec<f32> = (0..480).map(|i| i as f32 * 0.001).collect();
        let out = rc.convert(&samples).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn ratio_48k_to_16k_preserves_duration() {
        let mut rc = RateConverter::new(48_000, 16_000, 1024).unwrap();
        assert!(!rc.is_passthrough());
        for len in [1usize, 960, 1024, 4_801, 48_000] {
            let out = rc.convert(&vec![0.0f32; len]).unwrap();
            let expected = (len as f64 / 3.0).round() as usize;
            assert_eq!(out.len(), expected, "len={len}");
        }
    }

    #[test]
    fn upsampling_preserves_duration() {
        let buf = AudioBuffer::new(vec![0.1; 22_050], 22_050);
        let out = resample(&buf, 24_000).unwrap();
        assert_eq!(out.sample_rate, 24_000);
        assert!((out.len() as isize - 24_000).abs() <= 1, "len={}", out.len());
    }

    #[test]
    fn dc_gain_is_unity() {
        let buf = AudioBuffer::new(vec![0.5; 44_100], 44_100);
        let out = resample(&buf, 16_000).unwrap();
        // Ignore the filter edges, the steady-state body must stay at 0.5.
        let body = &out.samples[100..out.len() - 100];
        for &s in body {
            assert_abs_diff_eq!(s, 0.5, epsilon = 1e-3);
        }
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(RateConverter::new(0, 16_000, 1024).is_err());
    }
}
