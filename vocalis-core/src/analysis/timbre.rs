//! Warmth, breathiness and clarity: band-energy ratios of a single
//! Hann-tapered window taken from the start of the clip, scaled and clamped
//! to [0, 1].

use serde::{Deserialize, Serialize};

use super::SpectralAnalyzer;
use crate::audio::AudioBuffer;

const EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimbreParams {
    pub window_size: usize,
    /// Energy strictly below this counts as warm.
    pub warmth_cutoff_hz: f32,
    pub warmth_scale: f32,
    /// Energy strictly above this counts as breath noise.
    pub breathiness_cutoff_hz: f32,
    pub breathiness_scale: f32,
    /// Clarity band, both edges exclusive.
    pub clarity_low_hz: f32,
    pub clarity_high_hz: f32,
    pub clarity_scale: f32,
}

impl Default for TimbreParams {
    fn default() -> Self {
        Self {
            window_size: 2048,
            warmth_cutoff_hz: 500.0,
            warmth_scale: 2.0,
            breathiness_cutoff_hz: 4000.0,
            breathiness_scale: 5.0,
            clarity_low_hz: 1000.0,
            clarity_high_hz: 4000.0,
            clarity_scale: 1.5,
        }
    }
}

impl TimbreParams {
    pub fn normalize(&mut self) {
        self.window_size = self.window_size.clamp(64, 65_536);
        self.warmth_scale = self.warmth_scale.max(0.0);
        self.breathiness_scale = self.breathiness_scale.max(0.0);
        self.clarity_scale = self.clarity_scale.max(0.0);
        if self.clarity_high_hz < self.clarity_low_hz {
            std::mem::swap(&mut self.clarity_low_hz, &mut self.clarity_high_hz);
        }
    }
}

/// All three timbre scores from one shared spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimbreScores {
    pub warmth: f32,
    pub breathiness: f32,
    pub clarity: f32,
}

pub fn timbre_scores(buffer: &AudioBuffer, params: &TimbreParams) -> TimbreScores {
    let band = BandEnergy::analyze(buffer, params.window_size);
    TimbreScores {
        warmth: scaled(
            band.ratio(|f| f < params.warmth_cutoff_hz),
            params.warmth_scale,
        ),
        breathiness: scaled(
            band.ratio(|f| f > params.breathiness_cutoff_hz),
            params.breathiness_scale,
        ),
        clarity: scaled(
            band.ratio(|f| f > params.clarity_low_hz && f < params.clarity_high_hz),
            params.clarity_scale,
        ),
    }
}

/// Share of energy below the warmth cutoff, ×`warmth_scale`, clamped.
pub fn warmth(buffer: &AudioBuffer, params: &TimbreParams) -> f32 {
    let band = BandEnergy::analyze(buffer, params.window_size);
    scaled(
        band.ratio(|f| f < params.warmth_cutoff_hz),
        params.warmth_scale,
    )
}

/// Share of energy above the breath cutoff, ×`breathiness_scale`, clamped.
pub fn breathiness(buffer: &AudioBuffer, params: &TimbreParams) -> f32 {
    let band = BandEnergy::analyze(buffer, params.window_size);
    scaled(
        band.ratio(|f| f > params.breathiness_cutoff_hz),
        params.breathiness_scale,
    )
}

/// Share of energy inside the presence band, ×`clarity_scale`, clamped.
pub fn clarity(buffer: &AudioBuffer, params: &TimbreParams) -> f32 {
    let band = BandEnergy::analyze(buffer, params.window_size);
    scaled(
        band.ratio(|f| f > params.clarity_low_hz && f < params.clarity_high_hz),
        params.clarity_scale,
    )
}

fn scaled(ratio: f64, scale: f32) -> f32 {
    ((ratio * scale as f64) as f32).clamp(0.0, 1.0)
}

/// Power spectrum of the opening window with its bin frequencies.
struct BandEnergy {
    power: Vec<f32>,
    freqs: Vec<f32>,
    total: f64,
}

impl BandEnergy {
    fn analyze(buffer: &AudioBuffer, window_size: usize) -> Self {
        let analyzer = SpectralAnalyzer::new(window_size);
        let head = &buffer.samples[..buffer.len().min(analyzer.frame_size())];
        let power = analyzer.power_spectrum(head);
        let freqs = (0..power.len())
            .map(|k| analyzer.bin_frequency(k, buffer.sample_rate))
            .collect();
        let total = power.iter().map(|&p| p as f64).sum();
        Self {
            power,
            freqs,
            total,
        }
    }

    fn ratio(&self, in_band: impl Fn(f32) -> bool) -> f64 {
        let band: f64 = self
            .power
            .iter()
            .zip(&self.freqs)
            .filter(|(_, f)| in_band(**f))
            .map(|(&p, _)| p as f64)
            .sum();
        band / (self.total + EPSILON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tones(freqs: &[f32], seconds: f32, sample_rate: u32) -> AudioBuffer {
        let n = (seconds * sample_rate as f32) as usize;
        let amp = 0.5 / freqs.len() as f32;
        AudioBuffer::new(
            (0..n)
                .map(|i| {
                    let t = i as f32 / sample_rate as f32;
                    freqs.iter().map(|f| amp * (2.0 * PI * f * t).sin()).sum()
                })
                .collect(),
            sample_rate,
        )
    }

    #[test]
    fn low_pass_signal_is_warm() {
        let buf = tones(&[120.0, 250.0, 380.0], 1.0, 24_000);
        let params = TimbreParams::default();
        assert!(warmth(&buf, &params) >= 0.9);
        assert!(breathiness(&buf, &params) < 0.05);
        assert!(clarity(&buf, &params) < 0.05);
    }

    #[test]
    fn high_pass_signal_is_breathy() {
        let buf = tones(&[5_000.0, 7_500.0, 9_000.0], 1.0, 24_000);
        let params = TimbreParams::default();
        assert!(breathiness(&buf, &params) >= 0.9);
        assert!(warmth(&buf, &params) < 0.05);
    }

    #[test]
    fn presence_band_signal_is_clear() {
        let buf = tones(&[1_800.0, 2_600.0], 1.0, 24_000);
        let scores = timbre_scores(&buf, &TimbreParams::default());
        assert!(scores.clarity >= 0.9, "{scores:?}");
        assert_eq!(scores.clarity, clarity(&buf, &TimbreParams::default()));
    }

    #[test]
    fn silence_and_short_input_score_zero() {
        let params = TimbreParams::default();
        let silent = AudioBuffer::new(vec![0.0; 4096], 24_000);
        let short = AudioBuffer::new(vec![0.0; 10], 24_000);
        for buf in [&silent, &short] {
            let s = timbre_scores(buf, &params);
            assert_eq!((s.warmth, s.breathiness, s.clarity), (0.0, 0.0, 0.0));
        }
    }

    #[test]
    fn short_tone_is_zero_padded() {
        // 1000 samples < 2048-sample window: still analysable.
        let buf = tones(&[200.0], 1000.0 / 24_000.0, 24_000);
        assert!(warmth(&buf, &TimbreParams::default()) > 0.9);
    }
}
