//! Resolving the effective pipeline configuration for one invocation.
//!
//! Precedence, lowest first: built-in defaults, the config file, `VOCALIS_*`
//! environment variables, command-line flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use vocalis_core::config::{default_config_path, PipelineConfig, VadBackend};
use vocalis_core::PresetCatalog;

/// Flags that override config file values.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub workers: Option<usize>,
    pub separate: bool,
    pub vad: Option<VadBackend>,
    pub model_path: Option<PathBuf>,
}

/// Load the config named on the command line, or the per-user default when
/// it exists. An explicit path that is missing or malformed is an error.
pub fn load_pipeline_config(explicit: Option<&Path>) -> Result<PipelineConfig> {
    let config = match explicit {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let path = default_config_path();
            if path.exists() {
                PipelineConfig::load(&path)
                    .with_context(|| format!("loading config {}", path.display()))?
            } else {
                debug!(path = %path.display(), "no config file, using defaults");
                PipelineConfig::default()
            }
        }
    };
    Ok(config)
}

pub fn apply_env_overrides(config: &mut PipelineConfig) {
    if let Ok(raw) = std::env::var("VOCALIS_WORKERS") {
        match raw.trim().parse::<usize>() {
            Ok(n) => config.batch.workers = n,
            Err(_) => warn!("ignoring VOCALIS_WORKERS={raw:?}"),
        }
    }
    if let Ok(raw) = std::env::var("VOCALIS_VAD") {
        match parse_vad_backend(&raw) {
            Some(backend) => config.vad.backend = backend,
            None => warn!("ignoring VOCALIS_VAD={raw:?}"),
        }
    }
    if let Some(path) = std::env::var_os("VOCALIS_VAD_MODEL") {
        config.vad.model_path = Some(PathBuf::from(path));
    }
    if let Ok(raw) = std::env::var("VOCALIS_SEPARATION") {
        config.separation.enabled = matches!(raw.trim(), "1" | "true" | "on");
    }
    config.normalize();
}

pub fn apply_cli_overrides(config: &mut PipelineConfig, cli: &CliOverrides) {
    if let Some(n) = cli.workers {
        config.batch.workers = n;
    }
    if cli.separate {
        config.separation.enabled = true;
    }
    if let Some(backend) = cli.vad {
        config.vad.backend = backend;
    }
    if let Some(path) = &cli.model_path {
        config.vad.model_path = Some(path.clone());
    }
    config.normalize();
}

pub fn parse_vad_backend(raw: &str) -> Option<VadBackend> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "energy" | "rms" => Some(VadBackend::Energy),
        "silero" | "onnx" => Some(VadBackend::Silero),
        _ => None,
    }
}

/// Custom catalog from `path`, else the built-in one.
pub fn load_catalog(path: Option<&Path>) -> Result<PresetCatalog> {
    match path {
        Some(path) => PresetCatalog::load(path)
            .with_context(|| format!("loading preset catalog {}", path.display())),
        None => Ok(PresetCatalog::builtin()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_pipeline_config(Some(&dir.path().join("missing.json"))).is_err());
    }

    #[test]
    fn explicit_config_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "reference": { "target_db": -18.0 } }"#).unwrap();
        let config = load_pipeline_config(Some(&path)).unwrap();
        assert_eq!(config.reference.target_db, -18.0);
    }

    #[test]
    fn cli_flags_win() {
        let mut config = PipelineConfig::default();
        apply_cli_overrides(
            &mut config,
            &CliOverrides {
                workers: Some(3),
                separate: true,
                vad: Some(VadBackend::Silero),
                model_path: Some(PathBuf::from("/models/silero_vad.onnx")),
            },
        );
        assert_eq!(config.batch.workers, 3);
        assert!(config.separation.enabled);
        assert_eq!(config.vad.backend, VadBackend::Silero);
        assert_eq!(
            config.vad.model_path.as_deref(),
            Some(Path::new("/models/silero_vad.onnx"))
        );
    }

    #[test]
    fn empty_overrides_change_nothing() {
        let mut config = PipelineConfig::default();
        apply_cli_overrides(&mut config, &CliOverrides::default());
        assert_eq!(config, {
            let mut d = PipelineConfig::default();
            d.normalize();
            d
        });
    }

    #[test]
    fn vad_backend_aliases() {
        assert_eq!(parse_vad_backend(" Silero "), Some(VadBackend::Silero));
        assert_eq!(parse_vad_backend("rms"), Some(VadBackend::Energy));
        assert_eq!(parse_vad_backend("webrtc"), None);
    }

    #[test]
    fn missing_catalog_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_catalog(Some(&dir.path().join("nope.json"))).is_err());
        assert!(!load_catalog(None).unwrap().presets().is_empty());
    }
}
