use std::path::PathBuf;

use thiserror::Error;

/// All errors produced by vocalis-core.
#[derive(Debug, Error)]
pub enum VocalisError {
    #[error("cannot decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("unsupported audio in {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("resampler error: {0}")]
    Resample(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("vocal separation failed: {0}")]
    Separation(String),

    #[error("speech detection failed: {0}")]
    SpeechDetection(String),

    #[error("invalid preset catalog: {0}")]
    Catalog(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("model file not found: {path}")]
    ModelNotFound { path: PathBuf },

    #[cfg(feature = "onnx")]
    #[error("ONNX session error: {0}")]
    OnnxSession(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VocalisError {
    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unsupported(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::UnsupportedFormat {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VocalisError>;
