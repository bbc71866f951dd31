//! Pipeline configuration (JSON, every field optional).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analysis::FeatureParams;
use crate::error::{Result, VocalisError};
use crate::segment::SegmentParams;
use crate::separation::CommandSeparator;
use crate::vad::energy::EnergyDetectorConfig;
use crate::vad::{SpeechTimestampOptions, DETECTION_SAMPLE_RATE};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub audio: AudioConfig,
    pub features: FeatureParams,
    pub segment: SegmentParams,
    pub reference: ReferenceConfig,
    pub vad: VadConfig,
    pub separation: SeparationConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Rate clips are decoded at for feature extraction.
    pub analysis_sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            analysis_sample_rate: 24_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub sample_rate: u32,
    pub target_db: f32,
    /// Hard cap on the exported clip, applied after segment selection.
    pub max_seconds: f64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            target_db: -20.0,
            max_seconds: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VadBackend {
    Energy,
    /// Requires the `onnx` feature.
    Silero,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    pub backend: VadBackend,
    pub timestamps: SpeechTimestampOptions,
    pub energy: EnergyDetectorConfig,
    /// Silero model file; the data directory default when unset.
    pub model_path: Option<PathBuf>,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            backend: VadBackend::Energy,
            timestamps: SpeechTimestampOptions::default(),
            energy: EnergyDetectorConfig::default(),
            model_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    pub enabled: bool,
    pub command: CommandSeparator,
    /// Scratch directory for separator output; a temp dir when unset.
    pub work_dir: Option<PathBuf>,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: CommandSeparator::demucs(),
            work_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker threads; 0 picks the available parallelism.
    pub workers: usize,
}

impl BatchConfig {
    pub fn effective_workers(&self, jobs: usize) -> usize {
        let wanted = if self.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.workers
        };
        wanted.min(jobs).max(1)
    }
}

impl PipelineConfig {
    /// Clamp every value into a usable range.
    pub fn normalize(&mut self) {
        self.audio.analysis_sample_rate = self.audio.analysis_sample_rate.clamp(8_000, 192_000);
        self.features.normalize();
        self.segment.normalize();
        self.reference.sample_rate = self.reference.sample_rate.clamp(8_000, 192_000);
        self.reference.target_db = self.reference.target_db.clamp(-60.0, 0.0);
        self.reference.max_seconds = self
            .reference
            .max_seconds
            .clamp(self.segment.min_seconds, 600.0);
        self.vad.timestamps.normalize();
        self.vad.energy.normalize();
        self.vad.model_path = self
            .vad
            .model_path
            .take()
            .filter(|p| !p.as_os_str().is_empty());
        self.batch.workers = self.batch.workers.min(256);
    }

    /// Rate speech detection runs at.
    pub fn detection_sample_rate(&self) -> u32 {
        DETECTION_SAMPLE_RATE
    }

    /// Read and normalise a JSON config file. Missing keys take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let mut config: PipelineConfig = serde_json::from_str(&raw)
            .map_err(|e| VocalisError::Config(format!("{}: {e}", path.display())))?;
        config.normalize();
        info!(path = %path.display(), "loaded pipeline config");
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Per-user data directory (`$XDG_DATA_HOME/vocalis`, `%APPDATA%\Lattice Labs\Vocalis`).
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Vocalis")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("vocalis")
    }
}

pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.json")
}

pub fn default_models_dir() -> PathBuf {
    default_data_dir().join("models")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_takes_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "segment": { "preferred_seconds": 7.5 } }"#).unwrap();
        assert_eq!(config.segment.preferred_seconds, 7.5);
        assert_eq!(config.segment.min_seconds, 6.0);
        assert_eq!(config.reference.target_db, -20.0);
        assert_eq!(config.vad.backend, VadBackend::Energy);
        assert_eq!(config.features.pitch.fallback_hz, 150.0);
    }

    #[test]
    fn normalize_clamps_out_of_range_values() {
        let mut config = PipelineConfig::default();
        config.reference.target_db = 12.0;
        config.audio.analysis_sample_rate = 0;
        config.vad.model_path = Some(PathBuf::new());
        config.normalize();
        assert_eq!(config.reference.target_db, 0.0);
        assert_eq!(config.audio.analysis_sample_rate, 8_000);
        assert_eq!(config.vad.model_path, None);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg").join("config.json");
        let mut config = PipelineConfig::default();
        config.batch.workers = 3;
        config.vad.backend = VadBackend::Silero;
        config.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            PipelineConfig::load(&path),
            Err(VocalisError::Config(_))
        ));
    }

    #[test]
    fn workers_never_exceed_jobs() {
        let batch = BatchConfig { workers: 8 };
        assert_eq!(batch.effective_workers(3), 3);
        assert_eq!(batch.effective_workers(0), 1);
        assert!(BatchConfig::default().effective_workers(100) >= 1);
    }
}
