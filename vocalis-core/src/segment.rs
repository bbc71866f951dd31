//! Reference-segment selection from voiced intervals.
//!
//! Greedy and deterministic; rules are tried in order:
//!
//! 1. **Single**: the interval whose length is within `[min, max]` and closest
//!    to `preferred` (earliest wins ties).
//! 2. **Concatenated**: intervals joined in chronological order until the
//!    total reaches `min`, then cut back to `max` if it overshoots.
//! 3. **Fallback**: no usable interval, so the first `preferred` seconds of
//!    the raw buffer.
//!
//! Durations are converted to sample counts at the buffer's own rate.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::AudioBuffer;
use crate::vad::VoicedInterval;

/// Which rule produced a [`SelectedSegment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    Single,
    Concatenated,
    Fallback,
}

/// Target durations for the reference clip, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentParams {
    pub min_seconds: f64,
    pub max_seconds: f64,
    pub preferred_seconds: f64,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            min_seconds: 6.0,
            max_seconds: 10.0,
            preferred_seconds: 8.0,
        }
    }
}

impl SegmentParams {
    pub fn normalize(&mut self) {
        self.min_seconds = self.min_seconds.clamp(0.1, 600.0);
        self.max_seconds = self.max_seconds.clamp(self.min_seconds, 600.0);
        self.preferred_seconds = self
            .preferred_seconds
            .clamp(self.min_seconds, self.max_seconds);
    }
}

/// A clip cut from a buffer, with the spans it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedSegment {
    pub audio: AudioBuffer,
    /// Spans of the source buffer, in order, after clamping and truncation.
    /// Empty for [`SelectionRule::Fallback`].
    pub source_intervals: Vec<VoicedInterval>,
    pub duration_seconds: f64,
    pub rule: SelectionRule,
}

impl SelectedSegment {
    fn build(buffer: &AudioBuffer, intervals: Vec<VoicedInterval>, rule: SelectionRule) -> Self {
        let total: usize = intervals.iter().map(VoicedInterval::len).sum();
        let mut samples = Vec::with_capacity(total);
        for iv in &intervals {
            samples.extend_from_slice(&buffer.samples[iv.start_sample..iv.end_sample]);
        }
        let audio = AudioBuffer::new(samples, buffer.sample_rate);
        Self {
            duration_seconds: audio.duration_secs(),
            audio,
            source_intervals: intervals,
            rule,
        }
    }
}

/// Pick or assemble a reference segment from `intervals`.
///
/// Intervals are clamped to the buffer and empty ones dropped. The result is
/// non-empty whenever `buffer` is.
pub fn select_segment(
    buffer: &AudioBuffer,
    intervals: &[VoicedInterval],
    min_seconds: f64,
    max_seconds: f64,
    preferred_seconds: f64,
) -> SelectedSegment {
    let min = buffer.samples_for(min_seconds);
    // A zero-sample cap would truncate the first interval away.
    let max = buffer.samples_for(max_seconds).max(min).max(1);
    let preferred = buffer.samples_for(preferred_seconds);

    let mut usable: Vec<VoicedInterval> = intervals
        .iter()
        .filter_map(|iv| iv.clamped(buffer.len()))
        .collect();
    usable.sort_by_key(|iv| iv.start_sample);

    let segment = if usable.is_empty() {
        let end = preferred.max(1).min(buffer.len());
        let audio = buffer.slice(0, end);
        SelectedSegment {
            duration_seconds: audio.duration_secs(),
            audio,
            source_intervals: Vec::new(),
            rule: SelectionRule::Fallback,
        }
    } else if let Some(best) = closest_fit(&usable, min, max, preferred) {
        SelectedSegment::build(buffer, vec![best], SelectionRule::Single)
    } else {
        SelectedSegment::build(buffer, accumulate(&usable, min, max), SelectionRule::Concatenated)
    };

    debug!(
        rule = ?segment.rule,
        intervals = segment.source_intervals.len(),
        seconds = segment.duration_seconds,
        "segment selected"
    );
    segment
}

/// Rule 1. `usable` is sorted by start, so the first minimum is the earliest.
fn closest_fit(
    usable: &[VoicedInterval],
    min: usize,
    max: usize,
    preferred: usize,
) -> Option<VoicedInterval> {
    usable
        .iter()
        .filter(|iv| (min..=max).contains(&iv.len()))
        .min_by_key(|iv| iv.len().abs_diff(preferred))
        .copied()
}

/// Rule 2. Chronological prefix until `min`, truncated to `max`.
fn accumulate(usable: &[VoicedInterval], min: usize, max: usize) -> Vec<VoicedInterval> {
    let mut taken = Vec::new();
    let mut total = 0usize;
    for iv in usable {
        let room = max - total;
        if iv.len() > room {
            taken.push(VoicedInterval::new(iv.start_sample, iv.start_sample + room));
            break;
        }
        taken.push(*iv);
        total += iv.len();
        if total >= min {
            break;
        }
    }
    taken.retain(|iv| !iv.is_empty());
    taken
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 16_000;

    fn ramp(seconds: usize) -> AudioBuffer {
        // Sample value encodes its own index so cuts can be checked exactly.
        AudioBuffer::new((0..seconds * SR as usize).map(|i| i as f32).collect(), SR)
    }

    fn iv(start: usize, end: usize) -> VoicedInterval {
        VoicedInterval::new(start, end)
    }

    #[test]
    fn six_second_interval_qualifies_unchanged() {
        let buf = ramp(12);
        let seg = select_segment(&buf, &[iv(0, 96_000)], 6.0, 10.0, 8.0);
        assert_eq!(seg.rule, SelectionRule::Single);
        assert_eq!(seg.source_intervals, vec![iv(0, 96_000)]);
        assert_eq!(seg.audio.samples, buf.samples[..96_000].to_vec());
        assert_eq!(seg.duration_seconds, 6.0);
    }

    #[test]
    fn closest_to_preferred_wins_then_earliest() {
        let buf = ramp(60);
        let ivs = [
            iv(0, 96_000),                  // 6 s
            iv(100_000, 100_000 + 144_000), // 9 s
            iv(300_000, 300_000 + 112_000), // 7 s
            iv(500_000, 500_000 + 200_000), // 12.5 s, too long
        ];
        let seg = select_segment(&buf, &ivs, 6.0, 10.0, 8.0);
        // 9 s and 7 s are both 1 s from 8 s; the earlier one wins.
        assert_eq!(seg.source_intervals, vec![ivs[1]]);
    }

    #[test]
    fn short_intervals_are_concatenated() {
        let buf = ramp(10);
        let ivs = [iv(0, 16_000), iv(32_000, 64_000)];
        let seg = select_segment(&buf, &ivs, 6.0, 10.0, 8.0);
        assert_eq!(seg.rule, SelectionRule::Concatenated);
        // Never reaches 6 s, so everything is used.
        assert_eq!(seg.source_intervals, ivs.to_vec());
        assert_eq!(seg.audio.len(), 48_000);
        assert!(seg.duration_seconds <= 10.0);
        // Nothing from the 1 s..2 s gap.
        assert!(seg
            .audio
            .samples
            .iter()
            .all(|&s| (s as usize) < 16_000 || (32_000..64_000).contains(&(s as usize))));
    }

    #[test]
    fn concatenation_stops_at_min_and_truncates_to_max() {
        let buf = ramp(40);
        // 4 s + 5 s = 9 s ≥ min 6 s; with max 7 s the second is cut to 3 s.
        let ivs = [iv(0, 64_000), iv(100_000, 180_000), iv(200_000, 300_000)];
        let seg = select_segment(&buf, &ivs, 6.0, 7.0, 6.5);
        assert_eq!(seg.rule, SelectionRule::Concatenated);
        assert_eq!(seg.source_intervals, vec![iv(0, 64_000), iv(100_000, 148_000)]);
        assert_eq!(seg.audio.len(), 112_000);
        assert_eq!(seg.duration_seconds, 7.0);
    }

    #[test]
    fn no_intervals_falls_back_to_head() {
        let buf = ramp(12);
        let seg = select_segment(&buf, &[], 6.0, 10.0, 8.0);
        assert_eq!(seg.rule, SelectionRule::Fallback);
        assert!(seg.source_intervals.is_empty());
        assert_eq!(seg.audio.len(), 8 * 16_000);

        let short = ramp(2);
        let seg = select_segment(&short, &[], 6.0, 10.0, 8.0);
        assert_eq!(seg.audio.len(), short.len());
    }

    #[test]
    fn out_of_range_intervals_are_clamped_or_dropped() {
        let buf = ramp(8);
        let ivs = [iv(200_000, 300_000), iv(32_000, 1_000_000)];
        let seg = select_segment(&buf, &ivs, 6.0, 10.0, 8.0);
        assert_eq!(seg.source_intervals, vec![iv(32_000, 128_000)]);
        assert_eq!(seg.rule, SelectionRule::Single);

        let seg = select_segment(&buf, &[iv(500_000, 600_000)], 6.0, 10.0, 8.0);
        assert_eq!(seg.rule, SelectionRule::Fallback);
    }

    #[test]
    fn zero_durations_still_yield_audio() {
        let buf = AudioBuffer::new(vec![0.3; 16_000], SR);
        let seg = select_segment(&buf, &[iv(0, 8_000)], 0.0, 0.0, 0.0);
        assert_eq!(seg.rule, SelectionRule::Concatenated);
        assert_eq!(seg.source_intervals, vec![iv(0, 1)]);
        assert_eq!(seg.audio.len(), 1);
    }

    #[test]
    fn params_normalize_orders_durations() {
        let mut p = SegmentParams {
            min_seconds: 9.0,
            max_seconds: 4.0,
            preferred_seconds: 20.0,
        };
        p.normalize();
        assert_eq!((p.min_seconds, p.max_seconds, p.preferred_seconds), (9.0, 9.0, 9.0));
    }
}
