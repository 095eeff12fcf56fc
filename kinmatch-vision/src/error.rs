use std::path::PathBuf;

use thiserror::Error;

/// Failure turning a face image into an embedding.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("cannot read image {path:?}: {source}")]
    UnreadableImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no face detected in {path:?}: {reason}")]
    NoFaceDetected { path: PathBuf, reason: String },
    #[error("embedding inference failed for {path:?}")]
    Inference {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("cannot load embedding model {path:?}")]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}
