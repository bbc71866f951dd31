//! # vocalis-core
//!
//! Voice-clip analysis and cloning-reference preparation.
//!
//! ## Architecture
//!
//! ```text
//! file ─► audio::load ─► analysis::extract_features ─► FeatureVector ─► preset::map_preset
//!   │
//!   └─► VocalSeparator ─► audio::load(16 kHz) ─► SpeechDetector ─► segment::select_segment
//!                                                                      │
//!                                               audio::normalize_level ─► audio::export
//! ```
//!
//! Analysis and selection are pure functions of their inputs. The speech
//! detector and vocal separator are traits so real models can be swapped
//! for fixed data in tests.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod preset;
pub mod record;
pub mod segment;
pub mod separation;
pub mod vad;

// Convenience re-exports for downstream crates
pub use analysis::{extract_features, FeatureKey, FeatureParams, FeatureVector};
pub use audio::{export, load, normalize_level, AudioBuffer};
pub use config::PipelineConfig;
pub use error::{Result, VocalisError};
pub use pipeline::{run_batch, BatchReport, ClipPipeline};
pub use preset::{map_preset, PresetCatalog, VoicePreset};
pub use record::{SynthesisControls, VoiceManifest, VoiceProfile};
pub use segment::{select_segment, SelectedSegment, SelectionRule};
pub use separation::{CommandSeparator, Passthrough, VocalSeparator};
pub use vad::{EnergyDetector, SpeechDetector, SpeechTimestampOptions, VoicedInterval};

#[cfg(feature = "onnx")]
pub use vad::SileroDetector;
