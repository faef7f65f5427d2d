/// Core error types for the Pyrffect renderer.
use std::path::PathBuf;

/// A specialized Result type for Pyrffect operations.
pub type PyrffectResult<T> = Result<T, PyrffectError>;

/// Top-level error type encompassing every Pyrffect subsystem.
///
/// None of these are retried anywhere: each one is either a fatal
/// misconfiguration or an unrecoverable I/O fault.
#[derive(Debug, thiserror::Error)]
pub enum PyrffectError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("state error: {0}")]
    State(String),

    #[error("encode error: {message}{}", detail_suffix(.detail))]
    Encode {
        message: String,
        detail: Option<String>,
    },

    #[error("asset error: {message} ({path:?})")]
    Asset { message: String, path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) if !d.trim().is_empty() => format!(" (encoder said: {})", d.trim()),
        _ => String::new(),
    }
}

impl PyrffectError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        PyrffectError::Configuration(message.into())
    }

    /// Create a state error.
    pub fn state(message: impl Into<String>) -> Self {
        PyrffectError::State(message.into())
    }

    /// Create an encode error without encoder diagnostics.
    pub fn encode(message: impl Into<String>) -> Self {
        PyrffectError::Encode {
            message: message.into(),
            detail: None,
        }
    }

    /// Create an encode error carrying the encoder's own diagnostic output.
    pub fn encode_with_detail(message: impl Into<String>, detail: impl Into<String>) -> Self {
        PyrffectError::Encode {
            message: message.into(),
            detail: Some(detail.into()),
        }
    }

    /// Create an asset error.
    pub fn asset(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        PyrffectError::Asset {
            message: message.into(),
            path: path.into(),
        }
    }
}
