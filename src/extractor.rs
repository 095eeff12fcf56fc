use std::path::Path;

use kinmatch_vision::{Encoder, ExtractError};

use crate::embedding::Embedding;

/// Turns a face image into an embedding.
pub trait EmbeddingExtractor: Send + Sync {
    fn extract(&self, image: &Path) -> Result<Embedding, ExtractError>;
}

/// Extractor backed by the ONNX recognition model.
pub struct OnnxExtractor {
    encoder: Encoder,
}

impl OnnxExtractor {
    pub fn new(model_path: &Path, min_face_size: u32) -> Result<Self, ExtractError> {
        let encoder = Encoder::from_file(model_path)?.with_min_face_size(min_face_size);
        Ok(Self { encoder })
    }
}

impl EmbeddingExtractor for OnnxExtractor {
    fn extract(&self, image: &Path) -> Result<Embedding, ExtractError> {
        let vector = self.encoder.embed_file(image)?;
        // the encoder already normalizes; this only fails on a degenerate output
        Embedding::from_array(vector).map_err(|e| ExtractError::NoFaceDetected {
            path: image.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
