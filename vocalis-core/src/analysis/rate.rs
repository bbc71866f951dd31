//! Speaking-rate proxy from the short-time RMS envelope.
//!
//! Each syllable is roughly one rise and one fall of loudness, so the number
//! of times the envelope crosses its own mean, halved, approximates
//! syllables. The count is divided by a nominal syllable rate to give a
//! speed factor around 1.0.

use serde::{Deserialize, Serialize};

use super::{frame_starts, ms_to_samples};
use crate::audio::{rms, AudioBuffer};

/// Lower bound of the reported rate.
pub const MIN_RATE: f32 = 0.5;
/// Upper bound of the reported rate.
pub const MAX_RATE: f32 = 1.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateParams {
    pub frame_ms: f32,
    pub hop_ms: f32,
    /// Syllables per second that map to a rate of 1.0.
    pub nominal_syllables_per_sec: f32,
}

impl Default for RateParams {
    fn default() -> Self {
        Self {
            frame_ms: 20.0,
            hop_ms: 10.0,
            nominal_syllables_per_sec: 4.0,
        }
    }
}

impl RateParams {
    pub fn normalize(&mut self) {
        self.frame_ms = self.frame_ms.clamp(1.0, 500.0);
        self.hop_ms = self.hop_ms.clamp(1.0, self.frame_ms);
        self.nominal_syllables_per_sec = self.nominal_syllables_per_sec.clamp(0.1, 20.0);
    }
}

/// Relative speaking pace in `[MIN_RATE, MAX_RATE]`; 1.0 for clips too short
/// to yield two envelope frames.
pub fn speaking_rate(buffer: &AudioBuffer, params: &RateParams) -> f32 {
    let frame = ms_to_samples(params.frame_ms, buffer.sample_rate);
    let hop = ms_to_samples(params.hop_ms, buffer.sample_rate);

    let envelope: Vec<f64> = frame_starts(buffer.len(), frame, hop)
        .map(|start| rms(&buffer.samples[start..start + frame]) as f64)
        .collect();
    if envelope.len() < 2 || params.nominal_syllables_per_sec <= 0.0 {
        return 1.0;
    }

    let mean = envelope.iter().sum::<f64>() / envelope.len() as f64;
    let crossings = envelope
        .windows(2)
        .filter(|pair| (pair[0] > mean) != (pair[1] > mean))
        .count();

    let duration = buffer.duration_secs();
    let syllables_per_sec = crossings as f64 / (2.0 * duration);
    ((syllables_per_sec / params.nominal_syllables_per_sec as f64) as f32).clamp(MIN_RATE, MAX_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    /// 180 Hz carrier amplitude-modulated at `syllables_hz`.
    fn syllables(syllables_hz: f32, seconds: f32) -> AudioBuffer {
        let sr = 16_000u32;
        let n = (seconds * sr as f32) as usize;
        AudioBuffer::new(
            (0..n)
                .map(|i| {
                    let t = i as f32 / sr as f32;
                    let env = 0.5 + 0.5 * (2.0 * PI * syllables_hz * t).sin();
                    env * 0.6 * (2.0 * PI * 180.0 * t).sin()
                })
                .collect(),
            sr,
        )
    }

    #[test]
    fn four_syllables_per_second_is_nominal() {
        let rate = speaking_rate(&syllables(4.0, 3.0), &RateParams::default());
        assert!((rate - 1.0).abs() < 0.15, "rate={rate}");
    }

    #[test]
    fn fast_and_slow_speech_saturate() {
        let params = RateParams::default();
        assert_eq!(speaking_rate(&syllables(10.0, 3.0), &params), MAX_RATE);
        assert_eq!(speaking_rate(&syllables(0.5, 3.0), &params), MIN_RATE);
    }

    #[test]
    fn silence_is_slowest() {
        let buf = AudioBuffer::new(vec![0.0; 16_000], 16_000);
        assert_eq!(speaking_rate(&buf, &RateParams::default()), MIN_RATE);
    }

    #[test]
    fn too_short_for_two_frames_is_neutral() {
        // 20 ms frame at 16 kHz is 320 samples; 400 samples gives one frame.
        let buf = AudioBuffer::new(vec![0.3; 400], 16_000);
        assert_eq!(speaking_rate(&buf, &RateParams::default()), 1.0);
    }
}
