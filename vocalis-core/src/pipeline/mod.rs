//! Per-clip pipeline.
//!
//! ```text
//! analyze:    file ─► load(analysis rate) ─► extract_features ─► map_preset
//! reference:  file ─► isolate_vocals ─► load(16 kHz) ─► detect_speech
//!                                  └─► load(reference rate) ─► select_segment ─► normalize_level ─► export
//! process:    analyze + reference + profile JSON
//! ```
//!
//! A [`ClipPipeline`] is immutable after construction and shared by reference
//! across batch workers; only the [`SpeechDetector`] is per-worker.

pub mod batch;

pub use batch::{run_batch, BatchReport, ClipReport};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::{extract_features, FeatureVector};
use crate::audio::{self, AudioBuffer};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::preset::{PresetCatalog, VoicePreset};
use crate::record::{source_checksum, voice_id, SynthesisControls, VoiceProfile};
use crate::segment::{select_segment, SelectionRule};
use crate::separation::{Passthrough, VocalSeparator};
use crate::vad::SpeechDetector;

/// Directory (under the output dir) that per-clip profile JSON goes to.
pub const PROFILES_DIR: &str = "profiles";

#[derive(Default)]
pub struct PipelineDiagnostics {
    pub clips_analyzed: AtomicUsize,
    pub references_written: AtomicUsize,
    pub separation_fallbacks: AtomicUsize,
    pub single_segments: AtomicUsize,
    pub concatenated_segments: AtomicUsize,
    pub fallback_segments: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            clips_analyzed: self.clips_analyzed.load(Ordering::Relaxed),
            references_written: self.references_written.load(Ordering::Relaxed),
            separation_fallbacks: self.separation_fallbacks.load(Ordering::Relaxed),
            single_segments: self.single_segments.load(Ordering::Relaxed),
            concatenated_segments: self.concatenated_segments.load(Ordering::Relaxed),
            fallback_segments: self.fallback_segments.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsSnapshot {
    pub clips_analyzed: usize,
    pub references_written: usize,
    pub separation_fallbacks: usize,
    pub single_segments: usize,
    pub concatenated_segments: usize,
    pub fallback_segments: usize,
}

/// Result of [`ClipPipeline::analyze`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipAnalysis {
    pub features: FeatureVector,
    pub preset: VoicePreset,
    pub controls: SynthesisControls,
}

/// Result of [`ClipPipeline::prepare_reference`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceClip {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub duration_seconds: f64,
    pub rule: SelectionRule,
    pub voiced_intervals: usize,
    /// False when separation is off or failed and the original file was used.
    pub separated: bool,
}

pub struct ClipPipeline {
    config: PipelineConfig,
    catalog: PresetCatalog,
    separator: Box<dyn VocalSeparator>,
    diagnostics: PipelineDiagnostics,
}

impl ClipPipeline {
    pub fn new(config: PipelineConfig, catalog: PresetCatalog) -> Self {
        Self {
            config,
            catalog,
            separator: Box::new(Passthrough),
            diagnostics: PipelineDiagnostics::default(),
        }
    }

    pub fn with_separator(mut self, separator: Box<dyn VocalSeparator>) -> Self {
        self.separator = separator;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &PresetCatalog {
        &self.catalog
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Features, preset and synthesis controls for one clip.
    pub fn analyze(&self, path: &Path, label: &str) -> Result<ClipAnalysis> {
        let buffer = audio::load(path, self.config.audio.analysis_sample_rate)?;
        Ok(self.analyze_buffer(&buffer, label))
    }

    pub fn analyze_buffer(&self, buffer: &AudioBuffer, label: &str) -> ClipAnalysis {
        let features = extract_features(buffer, &self.config.features);
        let preset = self.catalog.map_preset(&features, label).clone();
        self.diagnostics.clips_analyzed.fetch_add(1, Ordering::Relaxed);
        ClipAnalysis {
            controls: SynthesisControls::from_features(&features),
            features,
            preset,
        }
    }

    /// Separate, detect speech, select, level and export a reference clip
    /// to `out_path`.
    pub fn prepare_reference(
        &self,
        path: &Path,
        detector: &mut dyn SpeechDetector,
        out_path: &Path,
    ) -> Result<ReferenceClip> {
        let (vocals, separated) = self.isolate(path);

        let detect_rate = self.config.detection_sample_rate();
        let at_detect_rate = audio::load(&vocals, detect_rate)?;
        let intervals = detector.detect_speech(&at_detect_rate)?;
        debug!(
            detector = detector.name(),
            intervals = intervals.len(),
            "speech detected"
        );

        let reference = &self.config.reference;
        let source = if reference.sample_rate == detect_rate {
            at_detect_rate
        } else {
            audio::load(&vocals, reference.sample_rate)?
        };
        let intervals: Vec<_> = intervals
            .iter()
            .map(|iv| iv.rescaled(detect_rate, reference.sample_rate))
            .collect();

        let seg = &self.config.segment;
        let segment = select_segment(
            &source,
            &intervals,
            seg.min_seconds,
            seg.max_seconds,
            seg.preferred_seconds,
        );
        self.count_rule(segment.rule);

        let capped = segment
            .audio
            .slice(0, segment.audio.samples_for(reference.max_seconds));
        let levelled = audio::normalize_level(&capped, reference.target_db);
        audio::export(&levelled, out_path)?;
        self.diagnostics
            .references_written
            .fetch_add(1, Ordering::Relaxed);

        Ok(ReferenceClip {
            path: out_path.to_path_buf(),
            sample_rate: levelled.sample_rate,
            duration_seconds: levelled.duration_secs(),
            rule: segment.rule,
            voiced_intervals: intervals.len(),
            separated,
        })
    }

    /// Full treatment of one source clip: profile JSON under
    /// `out_dir/profiles/` and `<id>_reference.wav` in `out_dir`.
    ///
    /// The file stem doubles as the label for preset mapping.
    pub fn process(
        &self,
        path: &Path,
        detector: &mut dyn SpeechDetector,
        out_dir: &Path,
    ) -> Result<VoiceProfile> {
        let checksum = source_checksum(path)?;
        let label = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let analysis = self.analyze(path, &label)?;

        let mut profile = VoiceProfile::new(path, checksum, &analysis.preset.id, analysis.features);
        let clip_name = format!("{}_reference.wav", voice_id(&profile.name));
        let reference = self.prepare_reference(path, detector, &out_dir.join(&clip_name))?;
        profile.reference_clip = Some(clip_name);

        let profile_path = out_dir
            .join(PROFILES_DIR)
            .join(format!("{}.json", profile.id));
        if let Some(parent) = profile_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&profile_path, serde_json::to_string_pretty(&profile)?)?;

        info!(
            id = %profile.id,
            preset = %profile.preset,
            pitch_hz = profile.features.pitch_hz,
            reference_seconds = reference.duration_seconds,
            rule = ?reference.rule,
            "clip processed"
        );
        Ok(profile)
    }

    fn isolate(&self, path: &Path) -> (PathBuf, bool) {
        let work_dir = self
            .config
            .separation
            .work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("vocalis-separation"));
        match self.separator.isolate_vocals(path, &work_dir) {
            Ok(vocals) => {
                let separated = vocals != path;
                (vocals, separated)
            }
            Err(e) => {
                warn!(
                    input = %path.display(),
                    separator = self.separator.name(),
                    "separation failed, using original audio: {e}"
                );
                self.diagnostics
                    .separation_fallbacks
                    .fetch_add(1, Ordering::Relaxed);
                (path.to_path_buf(), false)
            }
        }
    }

    fn count_rule(&self, rule: SelectionRule) {
        let counter = match rule {
            SelectionRule::Single => &self.diagnostics.single_segments,
            SelectionRule::Concatenated => &self.diagnostics.concatenated_segments,
            SelectionRule::Fallback => &self.diagnostics.fallback_segments,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
