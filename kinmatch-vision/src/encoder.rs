use std::path::Path;

use anyhow::Context;
use image::{DynamicImage, GenericImageView};
use ndarray::{Array1, Array4};
use ort::{session::Session, value::Value};
use parking_lot::Mutex;

use crate::error::ExtractError;

/// Side length of the square face crop the recognition model consumes.
pub const FACE_SIZE: u32 = 112;

/// Smallest face crop accepted by default, in pixels per side.
pub const DEFAULT_MIN_FACE_SIZE: u32 = 32;

/// Face crop → L2-normalized embedding, backed by an SFace-style ONNX model.
///
/// Input images are expected to be pre-cropped faces; detection and alignment
/// happen upstream. The session is shared behind a mutex so one encoder can be
/// used from several threads.
pub struct Encoder {
    session: Mutex<Session>,
    min_face_size: u32,
}

impl Encoder {
    pub fn from_file(model_path: &Path) -> Result<Self, ExtractError> {
        let session =
            crate::model::recog_session(model_path).map_err(|source| ExtractError::ModelLoad {
                path: model_path.to_path_buf(),
                source,
            })?;
        log::info!("loaded embedding model {}", model_path.display());
        Ok(Self {
            session: Mutex::new(session),
            min_face_size: DEFAULT_MIN_FACE_SIZE,
        })
    }

    pub fn with_min_face_size(mut self, px: u32) -> Self {
        self.min_face_size = px;
        self
    }

    /// Decode the image at `path` and encode it.
    pub fn embed_file(&self, path: &Path) -> Result<Array1<f32>, ExtractError> {
        let img = image::open(path).map_err(|source| ExtractError::UnreadableImage {
            path: path.to_path_buf(),
            source,
        })?;
        self.embed_image(&img, path)
    }

    /// Encode an already decoded face crop. `origin` is only used for error reporting.
    pub fn embed_image(
        &self,
        img: &DynamicImage,
        origin: &Path,
    ) -> Result<Array1<f32>, ExtractError> {
        let (w, h) = img.dimensions();
        if w.min(h) < self.min_face_size {
            return Err(ExtractError::NoFaceDetected {
                path: origin.to_path_buf(),
                reason: format!(
                    "image is {w}x{h}, smaller than the {}px minimum face size",
                    self.min_face_size
                ),
            });
        }

        let raw = self
            .run(face_tensor(img, FACE_SIZE))
            .map_err(|source| ExtractError::Inference {
                path: origin.to_path_buf(),
                source,
            })?;

        l2_normalize(raw)
            .map(Array1::from_vec)
            .ok_or_else(|| ExtractError::NoFaceDetected {
                path: origin.to_path_buf(),
                reason: "model produced a degenerate embedding".to_string(),
            })
    }

    fn run(&self, input: Array4<f32>) -> anyhow::Result<Vec<f32>> {
        let input_tensor = Value::from_array(input)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input_tensor])
            .context("running recognition model")?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

        // Expecting shape [1, N]
        let embedding_size = if shape.len() == 2 {
            shape[1] as usize
        } else {
            data.len()
        };
        if embedding_size == 0 || embedding_size > data.len() {
            anyhow::bail!(
                "unexpected embedding output shape {:?}",
                shape.iter().collect::<Vec<_>>()
            );
        }
        Ok(data[..embedding_size].to_vec())
    }
}

/// Resize to `size`x`size` and lay out as `[1, 3, H, W]` BGR in `[0, 255]`.
pub fn face_tensor(img: &DynamicImage, size: u32) -> Array4<f32> {
    let face = img
        .resize_exact(size, size, image::imageops::FilterType::Triangle)
        .to_rgb8();

    let mut input = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, px) in face.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        input[[0, 0, y, x]] = px[2] as f32; // B
        input[[0, 1, y, x]] = px[1] as f32; // G
        input[[0, 2, y, x]] = px[0] as f32; // R
    }
    input
}

/// L2-normalize, or `None` when the vector has no usable direction.
pub fn l2_normalize(mut values: Vec<f32>) -> Option<Vec<f32>> {
    let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm <= 0.0 {
        return None;
    }
    values.iter_mut().for_each(|x| *x /= norm);
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_tensor_is_bgr_chw() {
        let mut rgb = image::RgbImage::new(4, 4);
        for px in rgb.pixels_mut() {
            *px = image::Rgb([10, 20, 30]);
        }
        let tensor = face_tensor(&DynamicImage::ImageRgb8(rgb), 4);

        assert_eq!(tensor.shape(), &[1, 3, 4, 4]);
        assert_eq!(tensor[[0, 0, 2, 1]], 30.0);
        assert_eq!(tensor[[0, 1, 2, 1]], 20.0);
        assert_eq!(tensor[[0, 2, 2, 1]], 10.0);
    }

    #[test]
    fn test_face_tensor_resizes() {
        let img = DynamicImage::new_rgb8(200, 150);
        let tensor = face_tensor(&img, FACE_SIZE);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]).unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        assert!(l2_normalize(vec![0.0, 0.0]).is_none());
        assert!(l2_normalize(vec![f32::NAN, 1.0]).is_none());
    }
}
