//! Voice profile records and the batch manifest.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::analysis::FeatureVector;
use crate::error::Result;

pub const MANIFEST_VERSION: &str = "1.0.0";
pub const MANIFEST_FILE_NAME: &str = "voice-manifest.json";

/// Control parameters handed to a synthesis engine alongside the reference clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynthesisControls {
    pub pitch_factor: f32,
    pub speed_factor: f32,
    pub volume: f32,
}

impl SynthesisControls {
    /// 1.1 above 200 Hz, 0.9 below 130 Hz, 1.0 between; speed follows the
    /// speaking rate.
    pub fn from_features(features: &FeatureVector) -> Self {
        let pitch_factor = if features.pitch_hz > 200.0 {
            1.1
        } else if features.pitch_hz < 130.0 {
            0.9
        } else {
            1.0
        };
        Self {
            pitch_factor,
            speed_factor: features.speaking_rate,
            volume: 1.0,
        }
    }
}

/// Everything derived from one source clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub id: String,
    pub name: String,
    pub description: String,
    pub source_file: String,
    /// First 8 hex digits of the SHA-256 of the source bytes.
    pub checksum: String,
    pub generated_at: DateTime<Utc>,
    pub preset: String,
    pub features: FeatureVector,
    pub controls: SynthesisControls,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_clip: Option<String>,
}

impl VoiceProfile {
    pub fn new(
        source: &Path,
        checksum: String,
        preset: &str,
        features: FeatureVector,
    ) -> Self {
        let name = voice_name(source);
        Self {
            id: voice_id(&name),
            description: format!("Custom voice from {name}"),
            source_file: source
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            name,
            checksum,
            generated_at: Utc::now(),
            preset: preset.to_string(),
            controls: SynthesisControls::from_features(&features),
            features,
            reference_clip: None,
        }
    }
}

/// Display name of the voice built from `source`: its file stem.
pub fn voice_name(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "voice".into())
}

/// Id the profile for `source` is stored under.
pub fn source_voice_id(source: &Path) -> String {
    voice_id(&voice_name(source))
}

/// `"Soft Voice 2"` → `"soft_voice_2"`.
pub fn voice_id(name: &str) -> String {
    name.trim().replace(' ', "_").to_lowercase()
}

/// Short content checksum of the file at `path`.
pub fn source_checksum(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize();
    Ok(digest[..4].iter().map(|b| format!("{b:02x}")).collect())
}

/// One line of the manifest's quick-lookup list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub name: String,
    pub preset: String,
    pub description: String,
}

/// Index of every profile produced by one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceManifest {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub total_voices: usize,
    pub voices: BTreeMap<String, VoiceProfile>,
    pub voice_list: Vec<ManifestEntry>,
}

impl VoiceManifest {
    pub fn new(profiles: &[VoiceProfile]) -> Self {
        Self {
            version: MANIFEST_VERSION.into(),
            generated_at: Utc::now(),
            total_voices: profiles.len(),
            voices: profiles
                .iter()
                .map(|p| (p.id.clone(), p.clone()))
                .collect(),
            voice_list: profiles
                .iter()
                .map(|p| ManifestEntry {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    preset: p.preset.clone(),
                    description: p.description.clone(),
                })
                .collect(),
        }
    }

    /// Write as pretty JSON to `dir/voice-manifest.json`, returning the path.
    pub fn write_to_dir(&self, dir: &Path) -> Result<std::path::PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(MANIFEST_FILE_NAME);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(pitch_hz: f32, speaking_rate: f32) -> FeatureVector {
        FeatureVector {
            pitch_hz,
            rms_energy: 0.1,
            peak_amplitude: 0.9,
            spectral_centroid_hz: 2000.0,
            spectral_rolloff_hz: 4000.0,
            spectral_bandwidth_hz: 500.0,
            warmth: 0.5,
            breathiness: 0.1,
            clarity: 0.6,
            speaking_rate,
        }
    }

    #[test]
    fn pitch_factor_bands() {
        assert_eq!(SynthesisControls::from_features(&features(220.0, 1.0)).pitch_factor, 1.1);
        assert_eq!(SynthesisControls::from_features(&features(120.0, 1.0)).pitch_factor, 0.9);
        assert_eq!(SynthesisControls::from_features(&features(200.0, 1.0)).pitch_factor, 1.0);
        assert_eq!(SynthesisControls::from_features(&features(130.0, 1.0)).pitch_factor, 1.0);
        assert_eq!(SynthesisControls::from_features(&features(150.0, 1.3)).speed_factor, 1.3);
    }

    #[test]
    fn checksum_is_eight_hex_digits_of_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"abc").unwrap();
        // sha256("abc") = ba7816bf...
        assert_eq!(source_checksum(&path).unwrap(), "ba7816bf");
    }

    #[test]
    fn profile_names_follow_the_source_file() {
        let p = VoiceProfile::new(
            Path::new("/samples/Soft Voice.mp3"),
            "00000000".into(),
            "af_sarah",
            features(210.0, 1.0),
        );
        assert_eq!(p.id, "soft_voice");
        assert_eq!(p.name, "Soft Voice");
        assert_eq!(p.source_file, "Soft Voice.mp3");
        assert_eq!(p.controls.pitch_factor, 1.1);
    }

    #[test]
    fn ids_ignore_the_directory() {
        assert_eq!(
            source_voice_id(Path::new("a/Deep Voice.wav")),
            source_voice_id(Path::new("b/deep_voice.mp3"))
        );
        assert_eq!(source_voice_id(Path::new("")), "voice");
    }

    #[test]
    fn manifest_indexes_profiles() {
        let a = VoiceProfile::new(Path::new("a.wav"), "1".into(), "af_sky", features(220.0, 1.0));
        let b = VoiceProfile::new(Path::new("b.wav"), "2".into(), "am_adam", features(110.0, 1.0));
        let manifest = VoiceManifest::new(&[a, b]);
        assert_eq!(manifest.total_voices, 2);
        assert_eq!(manifest.voices["b"].preset, "am_adam");
        assert_eq!(manifest.voice_list[0].id, "a");

        let dir = tempfile::tempdir().unwrap();
        let path = manifest.write_to_dir(dir.path()).unwrap();
        let back: VoiceManifest =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back.total_voices, 2);
    }
}
