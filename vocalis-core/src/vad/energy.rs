//! Energy-based speech detector using RMS threshold + hangover counter.
//!
//! ## Algorithm
//!
//! 1. Split the buffer into fixed windows (32 ms by default).
//! 2. If window RMS ≥ `rms_threshold` → speech (probability 1.0), reset the
//!    hangover counter.
//! 3. If RMS is below threshold and the hangover counter > 0 → still speech,
//!    decrement the counter (keeps syllable endings).
//! 4. Otherwise → silence (probability 0.0).
//!
//! The probability sequence is collapsed by [`collapse_to_intervals`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{collapse_to_intervals, SpeechDetector, SpeechTimestampOptions, VoicedInterval};
use crate::audio::{rms, AudioBuffer};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyDetectorConfig {
    /// RMS amplitude threshold. Windows above this are considered speech.
    /// Typical range: 0.01–0.05 for level-normalised speech.
    pub rms_threshold: f32,
    /// Number of quiet windows still reported as speech after real speech ends.
    pub hangover_windows: u32,
    pub window_ms: u32,
}

impl Default for EnergyDetectorConfig {
    fn default() -> Self {
        Self {
            rms_threshold: 0.02,
            hangover_windows: 3,
            window_ms: 32,
        }
    }
}

impl EnergyDetectorConfig {
    pub fn normalize(&mut self) {
        self.rms_threshold = self.rms_threshold.clamp(1e-4, 1.0);
        self.hangover_windows = self.hangover_windows.min(100);
        self.window_ms = self.window_ms.clamp(5, 500);
    }
}

/// A simple energy-based speech detector.
#[derive(Debug, Clone)]
pub struct EnergyDetector {
    config: EnergyDetectorConfig,
    options: SpeechTimestampOptions,
    /// Current hangover countdown.
    hangover_counter: u32,
}

impl EnergyDetector {
    pub fn new(config: EnergyDetectorConfig, options: SpeechTimestampOptions) -> Self {
        Self {
            config,
            options,
            hangover_counter: 0,
        }
    }

    /// Classify one window, updating the hangover state.
    fn classify(&mut self, window: &[f32]) -> bool {
        if rms(window) >= self.config.rms_threshold {
            self.hangover_counter = self.config.hangover_windows;
            true
        } else if self.hangover_counter > 0 {
            self.hangover_counter -= 1;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.hangover_counter = 0;
    }
}

impl Default for EnergyDetector {
    fn default() -> Self {
        Self::new(
            EnergyDetectorConfig::default(),
            SpeechTimestampOptions::default(),
        )
    }
}

impl SpeechDetector for EnergyDetector {
    fn detect_speech(&mut self, buffer: &AudioBuffer) -> Result<Vec<VoicedInterval>> {
        self.reset();
        let window =
            ((self.config.window_ms as u64 * buffer.sample_rate as u64) / 1000).max(1) as usize;

        let probs: Vec<f32> = buffer
            .samples
            .chunks(window)
            .map(|w| if self.classify(w) { 1.0 } else { 0.0 })
            .collect();

        let intervals = collapse_to_intervals(
            &probs,
            window,
            buffer.sample_rate,
            buffer.len(),
            &self.options,
        );
        debug!(
            windows = probs.len(),
            intervals = intervals.len(),
            "energy speech detection"
        );
        Ok(intervals)
    }

    fn name(&self) -> &'static str {
        "energy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent(secs: f32) -> Vec<f32> {
        vec![0.0f32; (secs * 16_000.0) as usize]
    }

    fn loud(amplitude: f32, secs: f32) -> Vec<f32> {
        (0..(secs * 16_000.0) as usize)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect()
    }

    fn detector(hangover: u32) -> EnergyDetector {
        EnergyDetector::new(
            EnergyDetectorConfig {
                hangover_windows: hangover,
                ..EnergyDetectorConfig::default()
            },
            SpeechTimestampOptions {
                speech_pad_ms: 0,
                ..SpeechTimestampOptions::default()
            },
        )
    }

    #[test]
    fn silence_has_no_speech() {
        let buf = AudioBuffer::new(silent(2.0), 16_000);
        assert!(detector(0).detect_speech(&buf).unwrap().is_empty());
    }

    #[test]
    fn loud_run_between_silences_is_found() {
        let samples = [silent(1.0), loud(0.3, 2.0), silent(1.0)].concat();
        let buf = AudioBuffer::new(samples, 16_000);
        let got = detector(0).detect_speech(&buf).unwrap();
        assert_eq!(got.len(), 1, "{got:?}");
        let start = got[0].start_sample as f32 / 16_000.0;
        let secs = got[0].duration_secs(16_000);
        assert!((start - 1.0).abs() < 0.05, "{got:?}");
        assert!((secs - 2.0).abs() < 0.05, "{got:?}");
    }

    #[test]
    fn hangover_extends_speech() {
        let mut vad = detector(3);
        assert!(vad.classify(&loud(0.5, 0.01)));
        assert!(vad.classify(&silent(0.01)));
        assert!(vad.classify(&silent(0.01)));
        assert!(vad.classify(&silent(0.01)));
        // hangover exhausted
        assert!(!vad.classify(&silent(0.01)));
    }

    #[test]
    fn state_is_reset_between_calls() {
        let mut vad = detector(100);
        let speech = AudioBuffer::new([silent(0.5), loud(0.3, 1.0)].concat(), 16_000);
        assert_eq!(vad.detect_speech(&speech).unwrap().len(), 1);
        // A leftover hangover would turn the start of this silence into speech.
        let quiet = AudioBuffer::new(silent(2.0), 16_000);
        assert!(vad.detect_speech(&quiet).unwrap().is_empty());
    }

    #[test]
    fn empty_buffer_is_silence() {
        let buf = AudioBuffer::new(Vec::new(), 16_000);
        assert!(EnergyDetector::default().detect_speech(&buf).unwrap().is_empty());
    }
}
