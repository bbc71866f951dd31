//! `vocalis` command-line host.
//!
//! ```text
//! vocalis analyze clip.mp3 --label "British Male"
//! vocalis reference clip.mp3 out/clip_reference.wav
//! vocalis process samples/ --out voices/ --workers 4 --separate
//! vocalis presets --json
//! vocalis config --save
//! ```

mod settings;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use settings::{apply_cli_overrides, apply_env_overrides, load_catalog, load_pipeline_config};
use settings::{parse_vad_backend, CliOverrides};
use tracing::{error, info};
use vocalis_core::config::{default_config_path, PipelineConfig, VadBackend};
use vocalis_core::vad::SpeechDetector;
use vocalis_core::{run_batch, ClipPipeline, EnergyDetector, PresetCatalog, VoiceManifest};

/// Extensions picked up when a directory is passed as input.
const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "ogg", "m4a", "aac", "aiff"];

#[derive(Debug, Parser)]
#[command(name = "vocalis", version, about = "Voice-clip analysis and reference preparation")]
struct Cli {
    /// Pipeline config JSON (default: per-user data dir, if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Preset catalog JSON replacing the built-in one
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract features and pick a preset for one clip
    Analyze {
        path: PathBuf,
        /// Free-form description; defaults to the file name
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Build a levelled reference clip from one source file
    Reference {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        detection: DetectionArgs,
    },
    /// Analyze and build references for many files, then write a manifest
    Process {
        /// Files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long, short)]
        out: PathBuf,
        #[arg(long)]
        workers: Option<usize>,
        #[command(flatten)]
        detection: DetectionArgs,
    },
    /// List the preset catalog
    Presets {
        #[arg(long)]
        json: bool,
    },
    /// Print the effective config
    Config {
        /// Also write it to the per-user config path
        #[arg(long)]
        save: bool,
    },
}

#[derive(Debug, Clone, Args)]
struct DetectionArgs {
    /// Run the configured vocal separator first
    #[arg(long)]
    separate: bool,
    /// Speech detector: energy | silero
    #[arg(long, value_parser = vad_arg)]
    vad: Option<VadBackend>,
    /// Silero model file
    #[arg(long)]
    vad_model: Option<PathBuf>,
}

fn vad_arg(raw: &str) -> std::result::Result<VadBackend, String> {
    parse_vad_backend(raw).ok_or_else(|| format!("unknown speech detector {raw:?}"))
}

impl DetectionArgs {
    fn overrides(&self, workers: Option<usize>) -> CliOverrides {
        CliOverrides {
            workers,
            separate: self.separate,
            vad: self.vad,
            model_path: self.vad_model.clone(),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vocalis=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = load_pipeline_config(cli.config.as_deref())?;
    apply_env_overrides(&mut config);
    let catalog = load_catalog(cli.catalog.as_deref())?;

    match cli.command {
        Command::Analyze { path, label, json } => {
            let label = label.unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let pipeline = ClipPipeline::new(config, catalog);
            let analysis = pipeline
                .analyze(&path, &label)
                .with_context(|| format!("analyzing {}", path.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            } else {
                for (name, value) in analysis.features.iter() {
                    println!("{name:>22}  {value:.4}");
                }
                println!("{:>22}  {}", "preset", analysis.preset.id);
            }
        }
        Command::Reference {
            input,
            output,
            detection,
        } => {
            apply_cli_overrides(&mut config, &detection.overrides(None));
            let mut detector = build_detector(&config)?;
            let pipeline = build_pipeline(config, catalog);
            let clip = pipeline
                .prepare_reference(&input, detector.as_mut(), &output)
                .with_context(|| format!("preparing reference for {}", input.display()))?;
            info!(
                path = %clip.path.display(),
                seconds = clip.duration_seconds,
                rule = ?clip.rule,
                separated = clip.separated,
                "reference written"
            );
        }
        Command::Process {
            inputs,
            out,
            workers,
            detection,
        } => {
            apply_cli_overrides(&mut config, &detection.overrides(workers));
            let files = collect_inputs(&inputs)?;
            if files.is_empty() {
                bail!("no audio files found");
            }
            let workers = config.batch.effective_workers(files.len());
            let factory_config = config.clone();
            let pipeline = build_pipeline(config, catalog);

            let report = run_batch(&pipeline, &files, &out, workers, || {
                build_detector(&factory_config)
            });
            let manifest = VoiceManifest::new(&report.profiles());
            let manifest_path = manifest.write_to_dir(&out)?;
            info!(
                path = %manifest_path.display(),
                voices = manifest.total_voices,
                diagnostics = ?pipeline.diagnostics(),
                "manifest written"
            );
            for (input, err) in report.failures() {
                eprintln!("failed: {}: {err}", input.display());
            }
            if report.failed() > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Presets { json } => print_catalog(&catalog, json)?,
        Command::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                let path = default_config_path();
                config.save(&path)?;
                info!(path = %path.display(), "config saved");
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn build_pipeline(config: PipelineConfig, catalog: PresetCatalog) -> ClipPipeline {
    let separator = config
        .separation
        .enabled
        .then(|| config.separation.command.clone());
    let pipeline = ClipPipeline::new(config, catalog);
    match separator {
        Some(command) => pipeline.with_separator(Box::new(command)),
        None => pipeline,
    }
}

fn build_detector(config: &PipelineConfig) -> vocalis_core::Result<Box<dyn SpeechDetector>> {
    match config.vad.backend {
        VadBackend::Energy => Ok(Box::new(EnergyDetector::new(
            config.vad.energy.clone(),
            config.vad.timestamps.clone(),
        ))),
        #[cfg(feature = "onnx")]
        VadBackend::Silero => {
            let path = config
                .vad
                .model_path
                .clone()
                .unwrap_or_else(vocalis_core::SileroDetector::default_model_path);
            Ok(Box::new(vocalis_core::SileroDetector::new(
                path,
                config.vad.timestamps.clone(),
            )?))
        }
        #[cfg(not(feature = "onnx"))]
        VadBackend::Silero => Err(vocalis_core::VocalisError::Config(
            "silero speech detection needs a build with the `onnx` feature".into(),
        )),
    }
}

/// Expand directories (one level) into their audio files, sorted by name.
fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("reading {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_audio_file(p))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn print_catalog(catalog: &PresetCatalog, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&catalog.definition())?);
        return Ok(());
    }
    for preset in catalog.presets() {
        println!(
            "{:<12} {:<7} {:<7} {:<12} {}",
            preset.id,
            format!("{:?}", preset.gender).to_lowercase(),
            format!("{:?}", preset.pitch_band).to_lowercase(),
            preset.style,
            preset.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
