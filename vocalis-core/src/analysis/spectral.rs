//! Frame-wise magnitude spectra and the spectral-shape summary.
//!
//! ## Algorithm
//!
//! 1. Slide a `frame_size` window by `hop_size` over the buffer.
//! 2. Taper each frame with a symmetric Hann window, FFT it, keep `|X(k)|`
//!    for `k in 0..=frame_size/2`.
//! 3. Per frame: centroid `Σ f·|X| / Σ|X|` and the 85 % rolloff bin.
//!    Frames with zero magnitude are skipped.
//! 4. Median centroid, median rolloff, standard deviation of the centroids.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use super::{frame_starts, median, std_dev};
use crate::audio::AudioBuffer;

pub const FALLBACK_CENTROID_HZ: f32 = 2000.0;
pub const FALLBACK_ROLLOFF_HZ: f32 = 4000.0;
pub const FALLBACK_BANDWIDTH_HZ: f32 = 500.0;
/// Fraction of frame magnitude that must lie at or below the rolloff bin.
pub const ROLLOFF_FRACTION: f64 = 0.85;

/// Aggregated spectral shape of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralSummary {
    pub centroid_hz: f32,
    pub rolloff_hz: f32,
    pub bandwidth_hz: f32,
}

impl SpectralSummary {
    pub const FALLBACK: SpectralSummary = SpectralSummary {
        centroid_hz: FALLBACK_CENTROID_HZ,
        rolloff_hz: FALLBACK_ROLLOFF_HZ,
        bandwidth_hz: FALLBACK_BANDWIDTH_HZ,
    };
}

/// Hann-windowed real FFT of a fixed size.
///
/// Plans the transform once; safe to share between threads.
pub struct SpectralAnalyzer {
    frame_size: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl SpectralAnalyzer {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            window: hann_window(frame_size),
            fft: FftPlanner::<f32>::new().plan_fft_forward(frame_size),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Number of non-negative frequency bins (`frame_size / 2 + 1`).
    pub fn n_bins(&self) -> usize {
        self.frame_size / 2 + 1
    }

    /// Centre frequency of `bin` in Hz.
    pub fn bin_frequency(&self, bin: usize, sample_rate: u32) -> f32 {
        bin as f32 * sample_rate as f32 / self.frame_size as f32
    }

    /// Magnitude spectrum `|X(k)|`, `k in 0..=frame_size/2`.
    ///
    /// `frame` is zero-padded (or truncated) to `frame_size` before the taper.
    pub fn magnitude_spectrum(&self, frame: &[f32]) -> Vec<f32> {
        let mut buf = vec![Complex::new(0.0f32, 0.0); self.frame_size];
        for (i, (&s, &w)) in frame.iter().zip(&self.window).enumerate() {
            buf[i] = Complex::new(s * w, 0.0);
        }
        self.fft.process(&mut buf);
        buf.iter().take(self.n_bins()).map(|c| c.norm()).collect()
    }

    /// Power spectrum `|X(k)|²`, same layout as [`magnitude_spectrum`](Self::magnitude_spectrum).
    pub fn power_spectrum(&self, frame: &[f32]) -> Vec<f32> {
        self.magnitude_spectrum(frame)
            .into_iter()
            .map(|m| m * m)
            .collect()
    }
}

/// Symmetric Hann window (`0.5 · (1 − cos(2πi / (n − 1)))`).
pub fn hann_window(n: usize) -> Vec<f32> {
    use std::f32::consts::PI;
    if n <= 1 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (n - 1) as f32).cos()))
        .collect()
}

/// Median centroid, median 85 % rolloff and centroid spread over all frames.
///
/// Returns [`SpectralSummary::FALLBACK`] when no frame carries energy, which
/// includes buffers shorter than one frame.
pub fn spectral_features(buffer: &AudioBuffer, frame_size: usize, hop_size: usize) -> SpectralSummary {
    if frame_size == 0 || hop_size == 0 || buffer.sample_rate == 0 {
        return SpectralSummary::FALLBACK;
    }

    let analyzer = SpectralAnalyzer::new(frame_size);
    let freqs: Vec<f64> = (0..analyzer.n_bins())
        .map(|k| analyzer.bin_frequency(k, buffer.sample_rate) as f64)
        .collect();

    let mut centroids = Vec::new();
    let mut rolloffs = Vec::new();

    for start in frame_starts(buffer.len(), frame_size, hop_size) {
        let spectrum = analyzer.magnitude_spectrum(&buffer.samples[start..start + frame_size]);
        let total: f64 = spectrum.iter().map(|&m| m as f64).sum();
        if total <= 0.0 || !total.is_finite() {
            continue;
        }

        let weighted: f64 = spectrum
            .iter()
            .zip(&freqs)
            .map(|(&m, &f)| m as f64 * f)
            .sum();
        centroids.push(weighted / total);
        rolloffs.push(freqs[rolloff_bin(&spectrum, total)]);
    }

    if centroids.is_empty() {
        return SpectralSummary::FALLBACK;
    }

    SpectralSummary {
        centroid_hz: median(&mut centroids) as f32,
        rolloff_hz: median(&mut rolloffs) as f32,
        bandwidth_hz: std_dev(&centroids) as f32,
    }
}

/// Lowest bin at which cumulative magnitude reaches [`ROLLOFF_FRACTION`] of `total`.
fn rolloff_bin(spectrum: &[f32], total: f64) -> usize {
    let threshold = ROLLOFF_FRACTION * total;
    let mut cumulative = 0.0f64;
    for (k, &m) in spectrum.iter().enumerate() {
        cumulative += m as f64;
        if cumulative >= threshold {
            return k;
        }
    }
    spectrum.len().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::PI;

    fn sine(freq: f32, seconds: f32, sample_rate: u32) -> AudioBuffer {
        let n = (seconds * sample_rate as f32) as usize;
        AudioBuffer::new(
            (0..n)
                .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
                .collect(),
            sample_rate,
        )
    }

    #[test]
    fn hann_window_is_symmetric_with_zero_ends() {
        let w = hann_window(9);
        assert_abs_diff_eq!(w[0], 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(w[8], 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(w[4], 1.0, epsilon = 1e-7);
        for i in 0..9 {
            assert_abs_diff_eq!(w[i], w[8 - i], epsilon = 1e-6);
        }
    }

    #[test]
    fn sine_centroid_sits_on_the_tone() {
        let summary = spectral_features(&sine(1000.0, 1.0, 24_000), 2048, 512);
        assert!(
            (summary.centroid_hz - 1000.0).abs() < 60.0,
            "centroid={}",
            summary.centroid_hz
        );
        assert!(
            (summary.rolloff_hz - 1000.0).abs() < 30.0,
            "rolloff={}",
            summary.rolloff_hz
        );
        // A stationary tone has almost no centroid spread.
        assert!(summary.bandwidth_hz < 20.0, "bw={}", summary.bandwidth_hz);
    }

    #[test]
    fn short_buffer_falls_back() {
        let buf = AudioBuffer::new(vec![0.2; 1000], 24_000);
        assert_eq!(spectral_features(&buf, 2048, 512), SpectralSummary::FALLBACK);
    }

    #[test]
    fn silent_frames_are_skipped_not_zero_filled() {
        let buf = AudioBuffer::new(vec![0.0; 8192], 24_000);
        assert_eq!(spectral_features(&buf, 2048, 512), SpectralSummary::FALLBACK);

        // Half silence, half tone: the median must come from the tone frames only.
        let mut samples = vec![0.0f32; 12_000];
        samples.extend(sine(3000.0, 1.0, 24_000).samples);
        let summary = spectral_features(&AudioBuffer::new(samples, 24_000), 2048, 512);
        assert!(summary.centroid_hz > 2000.0, "centroid={}", summary.centroid_hz);
    }

    #[test]
    fn zero_hop_falls_back_instead_of_looping() {
        let buf = sine(440.0, 0.5, 16_000);
        assert_eq!(spectral_features(&buf, 2048, 0), SpectralSummary::FALLBACK);
    }

    #[test]
    fn rolloff_bin_finds_cumulative_threshold() {
        let spectrum = [1.0f32, 1.0, 1.0, 1.0];
        // 85 % of 4.0 = 3.4 → reached at bin 3.
        assert_eq!(rolloff_bin(&spectrum, 4.0), 3);
        let spectrum = [9.0f32, 1.0];
        assert_eq!(rolloff_bin(&spectrum, 10.0), 0);
    }
}
