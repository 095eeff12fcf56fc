use std::fmt;
use std::path::PathBuf;

use kinmatch_vision::ExtractError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MatchError>;

/// Which input image an extraction failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Mother,
    Father,
    Child,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mother => "mother",
            Self::Father => "father",
            Self::Child => "child",
        })
    }
}

/// Coarse error category a boundary layer maps onto user-facing statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidParameter,
    NoFaceDetected,
    UnreadableImage,
    ExtractorFailure,
    DatabaseNotFound,
    DatabaseCorrupt,
    /// The store exists but cannot be read or written (permissions, not a file).
    DatabaseUnavailable,
    NoTargetAvailable,
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("alpha must lie in [0, 1], got {alpha}")]
    InvalidAlpha { alpha: f32 },
    #[error("top_k must be at least 1, got {top_k}")]
    InvalidTopK { top_k: usize },
    #[error("alpha step must lie in [0.0001, 1], got {step}")]
    InvalidStep { step: f32 },
    #[error("invalid embedding: {reason}")]
    InvalidEmbedding { reason: String },
    #[error("invalid child records: {reason}")]
    InvalidRecords { reason: String },
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("embedding extraction failed for {role} image")]
    Extraction {
        role: ImageRole,
        #[source]
        source: ExtractError,
    },
    #[error("embedding database not found at {path:?}")]
    DatabaseNotFound { path: PathBuf },
    #[error("embedding database {path:?} is corrupt: {reason}")]
    DatabaseCorrupt { path: PathBuf, reason: String },
    #[error("cannot read embedding database {path:?}")]
    DatabaseRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write embedding database {path:?}: {reason}")]
    DatabaseWrite { path: PathBuf, reason: String },
    #[error("no target child embedding available for alpha search")]
    NoTargetAvailable,
}

impl MatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAlpha { .. }
            | Self::InvalidTopK { .. }
            | Self::InvalidStep { .. }
            | Self::InvalidEmbedding { .. }
            | Self::InvalidRecords { .. }
            | Self::DimensionMismatch { .. } => ErrorKind::InvalidParameter,
            Self::Extraction { source, .. } => match source {
                ExtractError::NoFaceDetected { .. } => ErrorKind::NoFaceDetected,
                ExtractError::UnreadableImage { .. } => ErrorKind::UnreadableImage,
                ExtractError::Inference { .. } | ExtractError::ModelLoad { .. } => {
                    ErrorKind::ExtractorFailure
                }
            },
            Self::DatabaseNotFound { .. } => ErrorKind::DatabaseNotFound,
            Self::DatabaseCorrupt { .. } => ErrorKind::DatabaseCorrupt,
            Self::DatabaseRead { .. } | Self::DatabaseWrite { .. } => {
                ErrorKind::DatabaseUnavailable
            }
            Self::NoTargetAvailable => ErrorKind::NoTargetAvailable,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::DatabaseCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub(crate) fn ensure_dim(context: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(MatchError::DimensionMismatch {
            context,
            expected,
            actual,
        });
    }
    Ok(())
}
