//! Speech timestamp detection.
//!
//! The [`SpeechDetector`] trait is the seam between the core and whatever
//! decides where speech is: [`EnergyDetector`] (default), `SileroDetector`
//! (feature `onnx`), or a fixed interval list in tests.
//!
//! Detectors produce a per-window speech probability; [`collapse_to_intervals`]
//! turns that sequence into [`VoicedInterval`]s using the shared
//! [`SpeechTimestampOptions`] policy, so every backend honours the same
//! minimum speech / minimum silence rules.

pub mod energy;

#[cfg(feature = "onnx")]
pub mod silero;

pub use energy::EnergyDetector;

#[cfg(feature = "onnx")]
pub use silero::SileroDetector;

use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::error::Result;

/// Rate every detector expects its input at.
pub const DETECTION_SAMPLE_RATE: u32 = 16_000;

/// A half-open span `[start_sample, end_sample)` of voiced audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoicedInterval {
    pub start_sample: usize,
    pub end_sample: usize,
}

impl VoicedInterval {
    pub fn new(start_sample: usize, end_sample: usize) -> Self {
        Self {
            start_sample,
            end_sample,
        }
    }

    pub fn len(&self) -> usize {
        self.end_sample.saturating_sub(self.start_sample)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / sample_rate as f64
    }

    /// Intersection with `[0, len)`, or `None` if nothing is left.
    pub fn clamped(&self, len: usize) -> Option<VoicedInterval> {
        let start = self.start_sample.min(len);
        let end = self.end_sample.min(len);
        (end > start).then_some(VoicedInterval::new(start, end))
    }

    /// Same span expressed at another sample rate.
    pub fn rescaled(&self, from_rate: u32, to_rate: u32) -> VoicedInterval {
        if from_rate == to_rate || from_rate == 0 {
            return *self;
        }
        let scale = |s: usize| (s as f64 * to_rate as f64 / from_rate as f64).round() as usize;
        VoicedInterval::new(scale(self.start_sample), scale(self.end_sample))
    }
}

/// Policy for turning window probabilities into speech timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechTimestampOptions {
    /// Probability at or above which a window starts (or continues) speech.
    pub threshold: f32,
    /// Speech shorter than this is discarded.
    pub min_speech_ms: u32,
    /// Silence must last this long before a speech span is closed.
    pub min_silence_ms: u32,
    /// Padding added to both ends of every span, clamped to the buffer.
    pub speech_pad_ms: u32,
}

impl Default for SpeechTimestampOptions {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_speech_ms: 500,
            min_silence_ms: 100,
            speech_pad_ms: 30,
        }
    }
}

impl SpeechTimestampOptions {
    pub fn normalize(&mut self) {
        self.threshold = self.threshold.clamp(0.05, 0.95);
        self.min_speech_ms = self.min_speech_ms.min(60_000);
        self.min_silence_ms = self.min_silence_ms.min(10_000);
        self.speech_pad_ms = self.speech_pad_ms.min(1_000);
    }

    /// Closing threshold: a span only ends once probability falls below this.
    pub fn neg_threshold(&self) -> f32 {
        (self.threshold - 0.15).max(0.01)
    }
}

/// Finds voiced spans in a mono buffer.
///
/// Implementors may keep internal state (recurrent model state, hangover
/// counters) and must reset it at the start of every call.
pub trait SpeechDetector: Send {
    fn detect_speech(&mut self, buffer: &AudioBuffer) -> Result<Vec<VoicedInterval>>;

    /// Short identifier for logs.
    fn name(&self) -> &'static str;
}

/// A detector that always reports the same intervals. Useful for tests and
/// for replaying timestamps computed elsewhere.
#[derive(Debug, Clone, Default)]
pub struct FixedIntervals(pub Vec<VoicedInterval>);

impl SpeechDetector for FixedIntervals {
    fn detect_speech(&mut self, _buffer: &AudioBuffer) -> Result<Vec<VoicedInterval>> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Collapse per-window speech probabilities into ordered, non-overlapping
/// intervals.
///
/// `probs[i]` covers samples `[i * window, (i + 1) * window)`; `total_len` is
/// the buffer length the intervals are clamped to.
pub fn collapse_to_intervals(
    probs: &[f32],
    window: usize,
    sample_rate: u32,
    total_len: usize,
    options: &SpeechTimestampOptions,
) -> Vec<VoicedInterval> {
    if window == 0 || sample_rate == 0 {
        return Vec::new();
    }
    let ms = |v: u32| (v as u64 * sample_rate as u64 / 1000) as usize;
    let min_speech = ms(options.min_speech_ms);
    let min_silence = ms(options.min_silence_ms);
    let pad = ms(options.speech_pad_ms);
    let neg_threshold = options.neg_threshold();

    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut start: Option<usize> = None;
    let mut silence_from: Option<usize> = None;

    for (i, &p) in probs.iter().enumerate() {
        let pos = (i * window).min(total_len);
        if p >= options.threshold {
            silence_from = None;
            start.get_or_insert(pos);
            continue;
        }
        let Some(s) = start else { continue };
        if p < neg_threshold {
            let from = *silence_from.get_or_insert(pos);
            if pos + window - from >= min_silence {
                if from - s >= min_speech {
                    spans.push((s, from));
                }
                start = None;
                silence_from = None;
            }
        }
    }
    if let Some(s) = start {
        let end = silence_from.unwrap_or(total_len);
        if end.saturating_sub(s) >= min_speech {
            spans.push((s, end));
        }
    }

    pad_spans(&mut spans, pad, total_len);
    spans
        .into_iter()
        .filter(|(s, e)| e > s)
        .map(|(s, e)| VoicedInterval::new(s, e))
        .collect()
}

/// Widen every span by `pad`, splitting gaps narrower than `2 * pad` evenly.
fn pad_spans(spans: &mut [(usize, usize)], pad: usize, total_len: usize) {
    let n = spans.len();
    for i in 0..n {
        if i == 0 {
            spans[i].0 = spans[i].0.saturating_sub(pad);
        }
        if i + 1 < n {
            let gap = spans[i + 1].0 - spans[i].1;
            if gap < 2 * pad {
                spans[i].1 += gap / 2;
                spans[i + 1].0 -= gap - gap / 2;
            } else {
                spans[i].1 += pad;
                spans[i + 1].0 -= pad;
            }
        } else {
            spans[i].1 = (spans[i].1 + pad).min(total_len);
        }
    }
}
