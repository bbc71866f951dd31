//! Autocorrelation pitch estimate.
//!
//! Per 30 ms frame (10 ms hop):
//!
//! 1. Skip frames whose peak |x| is below the silence gate.
//! 2. Autocorrelate and search lags covering 500 Hz … 50 Hz for the maximum.
//! 3. Accept the lag only if its correlation exceeds 30 % of the zero-lag
//!    energy (voicing gate).
//!
//! The clip pitch is the median of accepted frames.

use serde::{Deserialize, Serialize};

use super::{frame_starts, median, ms_to_samples};
use crate::audio::{peak, AudioBuffer};

/// Lowest pitch the estimator can report (Hz).
pub const MIN_PITCH_HZ: f32 = 50.0;
/// Highest pitch the estimator can report (Hz).
pub const MAX_PITCH_HZ: f32 = 500.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchParams {
    pub frame_ms: f32,
    pub hop_ms: f32,
    /// Frames with a smaller peak amplitude are treated as silence.
    pub silence_gate: f32,
    /// Minimum `r[lag] / r[0]` for a frame to count as voiced.
    pub voicing_threshold: f32,
    /// Reported when no frame passes both gates.
    pub fallback_hz: f32,
}

impl Default for PitchParams {
    fn default() -> Self {
        Self {
            frame_ms: 30.0,
            hop_ms: 10.0,
            silence_gate: 0.01,
            voicing_threshold: 0.3,
            fallback_hz: 150.0,
        }
    }
}

impl PitchParams {
    pub fn normalize(&mut self) {
        // The frame must be longer than the 50 Hz period or the lag search is empty.
        self.frame_ms = self.frame_ms.clamp(25.0, 200.0);
        self.hop_ms = self.hop_ms.clamp(1.0, self.frame_ms);
        self.silence_gate = self.silence_gate.clamp(0.0, 1.0);
        self.voicing_threshold = self.voicing_threshold.clamp(0.0, 1.0);
        self.fallback_hz = self.fallback_hz.clamp(MIN_PITCH_HZ, MAX_PITCH_HZ);
    }
}

/// Median per-frame autocorrelation pitch in Hz, or `params.fallback_hz`.
pub fn estimate_pitch(buffer: &AudioBuffer, params: &PitchParams) -> f32 {
    let sr = buffer.sample_rate;
    let frame = ms_to_samples(params.frame_ms, sr);
    let hop = ms_to_samples(params.hop_ms, sr);
    let min_lag = (sr as f32 / MAX_PITCH_HZ) as usize;
    let max_lag = (sr as f32 / MIN_PITCH_HZ) as usize;

    if frame == 0 || hop == 0 || min_lag == 0 || max_lag >= frame || min_lag >= max_lag {
        return params.fallback_hz;
    }

    let mut pitches = Vec::new();
    for start in frame_starts(buffer.len(), frame, hop) {
        let window = &buffer.samples[start..start + frame];
        if peak(window) < params.silence_gate {
            continue;
        }
        if let Some(hz) = frame_pitch(window, sr, min_lag, max_lag, params.voicing_threshold) {
            pitches.push(hz as f64);
        }
    }

    if pitches.is_empty() {
        return params.fallback_hz;
    }
    median(&mut pitches) as f32
}

/// Pitch of one frame, `None` when the voicing gate rejects it.
fn frame_pitch(
    window: &[f32],
    sample_rate: u32,
    min_lag: usize,
    max_lag: usize,
    voicing_threshold: f32,
) -> Option<f32> {
    let energy = autocorrelation(window, 0);
    if energy <= 0.0 {
        return None;
    }

    // First maximum wins on ties.
    let mut best_lag = min_lag;
    let mut best = f64::NEG_INFINITY;
    for lag in min_lag..max_lag {
        let r = autocorrelation(window, lag);
        if r > best {
            best = r;
            best_lag = lag;
        }
    }

    if best <= voicing_threshold as f64 * energy {
        return None;
    }

    let hz = sample_rate as f32 / best_lag as f32;
    (MIN_PITCH_HZ..=MAX_PITCH_HZ).contains(&hz).then_some(hz)
}

/// `Σ x[j]·x[j+lag]`, the causal half of the full autocorrelation.
fn autocorrelation(window: &[f32], lag: usize) -> f64 {
    window
        .iter()
        .zip(window.iter().skip(lag))
        .map(|(&a, &b)| a as f64 * b as f64)
        .sum()
}
