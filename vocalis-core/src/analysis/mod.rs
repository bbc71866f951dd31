//! Acoustic feature extraction.
//!
//! Every function here is a pure function of an [`AudioBuffer`] and a set of
//! tunable parameters: no shared state, safe to run on independent buffers
//! from any number of threads.
//!
//! The multipliers and band edges in [`FeatureParams`] are engineering
//! heuristics, not psychoacoustic constants. Defaults reproduce the values
//! existing voice profiles were generated with.

pub mod pitch;
pub mod rate;
pub mod spectral;
pub mod timbre;

pub use pitch::{estimate_pitch, PitchParams};
pub use rate::{speaking_rate, RateParams};
pub use spectral::{spectral_features, SpectralAnalyzer, SpectralSummary};
pub use timbre::{breathiness, clarity, timbre_scores, warmth, TimbreParams, TimbreScores};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::AudioBuffer;

/// The ten descriptors derived from one source clip.
///
/// Serialises with exactly the ten canonical key names.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Median autocorrelation pitch, or the fallback when nothing was voiced.
    pub pitch_hz: f32,
    pub rms_energy: f32,
    pub peak_amplitude: f32,
    pub spectral_centroid_hz: f32,
    pub spectral_rolloff_hz: f32,
    pub spectral_bandwidth_hz: f32,
    /// [0, 1]
    pub warmth: f32,
    /// [0, 1]
    pub breathiness: f32,
    /// [0, 1]
    pub clarity: f32,
    /// [0.5, 1.5], 1.0 = nominal pace.
    pub speaking_rate: f32,
}

/// Names a single entry of a [`FeatureVector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKey {
    PitchHz,
    RmsEnergy,
    PeakAmplitude,
    SpectralCentroidHz,
    SpectralRolloffHz,
    SpectralBandwidthHz,
    Warmth,
    Breathiness,
    Clarity,
    SpeakingRate,
}

impl FeatureKey {
    pub const ALL: [FeatureKey; 10] = [
        FeatureKey::PitchHz,
        FeatureKey::RmsEnergy,
        FeatureKey::PeakAmplitude,
        FeatureKey::SpectralCentroidHz,
        FeatureKey::SpectralRolloffHz,
        FeatureKey::SpectralBandwidthHz,
        FeatureKey::Warmth,
        FeatureKey::Breathiness,
        FeatureKey::Clarity,
        FeatureKey::SpeakingRate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FeatureKey::PitchHz => "pitch_hz",
            FeatureKey::RmsEnergy => "rms_energy",
            FeatureKey::PeakAmplitude => "peak_amplitude",
            FeatureKey::SpectralCentroidHz => "spectral_centroid_hz",
            FeatureKey::SpectralRolloffHz => "spectral_rolloff_hz",
            FeatureKey::SpectralBandwidthHz => "spectral_bandwidth_hz",
            FeatureKey::Warmth => "warmth",
            FeatureKey::Breathiness => "breathiness",
            FeatureKey::Clarity => "clarity",
            FeatureKey::SpeakingRate => "speaking_rate",
        }
    }
}

impl FeatureVector {
    pub fn get(&self, key: FeatureKey) -> f32 {
        match key {
            FeatureKey::PitchHz => self.pitch_hz,
            FeatureKey::RmsEnergy => self.rms_energy,
            FeatureKey::PeakAmplitude => self.peak_amplitude,
            FeatureKey::SpectralCentroidHz => self.spectral_centroid_hz,
            FeatureKey::SpectralRolloffHz => self.spectral_rolloff_hz,
            FeatureKey::SpectralBandwidthHz => self.spectral_bandwidth_hz,
            FeatureKey::Warmth => self.warmth,
            FeatureKey::Breathiness => self.breathiness,
            FeatureKey::Clarity => self.clarity,
            FeatureKey::SpeakingRate => self.speaking_rate,
        }
    }

    /// `(name, value)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f32)> + '_ {
        FeatureKey::ALL.into_iter().map(|k| (k.name(), self.get(k)))
    }
}

/// Tunable parameters for [`extract_features`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    pub spectral_frame_size: usize,
    pub spectral_hop_size: usize,
    pub pitch: PitchParams,
    pub timbre: TimbreParams,
    pub rate: RateParams,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            spectral_frame_size: 2048,
            spectral_hop_size: 512,
            pitch: PitchParams::default(),
            timbre: TimbreParams::default(),
            rate: RateParams::default(),
        }
    }
}

impl FeatureParams {
    /// Clamp every parameter into a range the extractors can work with.
    pub fn normalize(&mut self) {
        self.spectral_frame_size = self.spectral_frame_size.clamp(64, 65_536);
        self.spectral_hop_size = self.spectral_hop_size.clamp(1, self.spectral_frame_size);
        self.pitch.normalize();
        self.timbre.normalize();
        self.rate.normalize();
    }
}

/// Compute the full [`FeatureVector`] for one clip.
pub fn extract_features(buffer: &AudioBuffer, params: &FeatureParams) -> FeatureVector {
    let spectral = spectral_features(
        buffer,
        params.spectral_frame_size,
        params.spectral_hop_size,
    );
    let timbre = timbre_scores(buffer, &params.timbre);

    let features = FeatureVector {
        pitch_hz: estimate_pitch(buffer, &params.pitch),
        rms_energy: buffer.rms(),
        peak_amplitude: buffer.peak(),
        spectral_centroid_hz: spectral.centroid_hz,
        spectral_rolloff_hz: spectral.rolloff_hz,
        spectral_bandwidth_hz: spectral.bandwidth_hz,
        warmth: timbre.warmth,
        breathiness: timbre.breathiness,
        clarity: timbre.clarity,
        speaking_rate: speaking_rate(buffer, &params.rate),
    };

    debug!(
        pitch_hz = features.pitch_hz,
        centroid_hz = features.spectral_centroid_hz,
        warmth = features.warmth,
        breathiness = features.breathiness,
        clarity = features.clarity,
        speaking_rate = features.speaking_rate,
        "features extracted"
    );
    features
}

/// Start offsets of every full `frame`-sample window advanced by `hop`.
pub(crate) fn frame_starts(len: usize, frame: usize, hop: usize) -> impl Iterator<Item = usize> {
    let last = if frame == 0 || hop == 0 || len < frame {
        None
    } else {
        Some(len - frame)
    };
    last.into_iter()
        .flat_map(move |last| (0..=last).step_by(hop.max(1)))
}

/// Median; the mean of the two middle values for even counts. Sorts in place.
pub(crate) fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Population standard deviation.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    var.sqrt()
}

/// Frame length in samples for a duration in milliseconds (truncating).
pub(crate) fn ms_to_samples(ms: f32, sample_rate: u32) -> usize {
    (ms as f64 / 1000.0 * sample_rate as f64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn noise(n: usize, seed: u64) -> Vec<f32> {
        // xorshift, deterministic and dependency-free
        let mut x = seed.max(1);
        (0..n)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                ((x % 20_000) as f32 / 10_000.0) - 1.0
            })
            .collect()
    }

    #[test]
    fn frame_starts_cover_full_frames_only() {
        assert_eq!(frame_starts(10, 4, 3).collect::<Vec<_>>(), vec![0, 3, 6]);
        assert_eq!(frame_starts(4, 4, 3).collect::<Vec<_>>(), vec![0]);
        assert_eq!(frame_starts(3, 4, 1).count(), 0);
        assert_eq!(frame_starts(10, 4, 0).count(), 0);
    }

    #[test]
    fn median_handles_even_and_odd() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&mut []), 0.0);
    }

    #[test]
    fn std_dev_is_population() {
        assert!((std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn feature_vector_serialises_canonical_keys() {
        let buf = AudioBuffer::new(noise(24_000, 7), 24_000);
        let features = extract_features(&buf, &FeatureParams::default());
        let json = serde_json::to_value(features).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 10);
        for (name, value) in features.iter() {
            let stored = obj[name].as_f64().unwrap() as f32;
            assert!((stored - value).abs() <= 1e-6 * value.abs().max(1.0), "{name}");
        }
    }

    #[test]
    fn bounded_features_stay_in_range() {
        let params = FeatureParams::default();
        let clips = vec![
            AudioBuffer::new(noise(48_000, 1), 24_000),
            AudioBuffer::new(vec![0.0; 24_000], 24_000),
            AudioBuffer::new(vec![0.9; 10], 24_000),
            AudioBuffer::new(
                (0..72_000)
                    .map(|i| {
                        let t = i as f32 / 24_000.0;
                        // 4 Hz amplitude modulation on a 180 Hz carrier
                        (0.5 + 0.5 * (2.0 * PI * 4.0 * t).sin()) * (2.0 * PI * 180.0 * t).sin()
                    })
                    .collect(),
                24_000,
            ),
        ];
        for clip in &clips {
            let f = extract_features(clip, &params);
            for v in [f.warmth, f.breathiness, f.clarity] {
                assert!((0.0..=1.0).contains(&v), "{f:?}");
            }
            assert!((0.5..=1.5).contains(&f.speaking_rate), "{f:?}");
            assert!((50.0..=500.0).contains(&f.pitch_hz), "{f:?}");
        }
    }

    #[test]
    fn params_normalize_repairs_zero_hop() {
        let mut params = FeatureParams {
            spectral_hop_size: 0,
            ..FeatureParams::default()
        };
        params.normalize();
        assert_eq!(params.spectral_hop_size, 1);
    }
}
