use ndarray::Array1;

use crate::error::{MatchError, Result};

/// L2-normalized face embedding.
///
/// Every constructor normalizes, so dot product equals cosine similarity and
/// Euclidean distances stay comparable across calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    vector: Array1<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Result<Self> {
        Self::from_array(Array1::from_vec(values))
    }

    pub fn from_array(mut vector: Array1<f32>) -> Result<Self> {
        if vector.is_empty() {
            return Err(MatchError::InvalidEmbedding {
                reason: "embedding has no components".to_string(),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(MatchError::InvalidEmbedding {
                reason: "embedding contains non-finite values".to_string(),
            });
        }
        let norm = l2_norm(&vector);
        if !norm.is_finite() || norm <= 0.0 {
            return Err(MatchError::InvalidEmbedding {
                reason: "embedding has zero length".to_string(),
            });
        }
        vector.mapv_inplace(|x| x / norm);
        Ok(Self { vector })
    }

    pub fn dim(&self) -> usize {
        self.vector.len()
    }

    pub fn vector(&self) -> &Array1<f32> {
        &self.vector
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.vector.to_vec()
    }

    /// Cosine similarity in `[-1, 1]`. Caller guarantees equal dimensions.
    pub fn cosine(&self, other: &Embedding) -> f32 {
        let dot: f32 = self
            .vector
            .iter()
            .zip(other.vector.iter())
            .map(|(x, y)| x * y)
            .sum();
        dot.clamp(-1.0, 1.0)
    }

    /// Euclidean distance between the two unit vectors, in `[0, 2]`.
    pub fn distance(&self, other: &Embedding) -> f32 {
        self.vector
            .iter()
            .zip(other.vector.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    }
}

pub(crate) fn l2_norm(v: &Array1<f32>) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes() {
        let e = Embedding::new(vec![3.0, 4.0]).unwrap();
        assert!((e.vector()[0] - 0.6).abs() < 1e-6);
        assert!((e.vector()[1] - 0.8).abs() < 1e-6);
        assert!((l2_norm(e.vector()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_degenerate_vectors() {
        assert!(Embedding::new(vec![]).is_err());
        assert!(Embedding::new(vec![0.0, 0.0, 0.0]).is_err());
        assert!(Embedding::new(vec![1.0, f32::INFINITY]).is_err());
    }

    #[test]
    fn test_cosine_and_distance() {
        let a = Embedding::new(vec![1.0, 0.0]).unwrap();
        let b = Embedding::new(vec![0.0, 2.0]).unwrap();
        let c = Embedding::new(vec![5.0, 0.0]).unwrap();

        assert!(a.cosine(&b).abs() < 1e-6);
        assert!((a.cosine(&c) - 1.0).abs() < 1e-6);
        assert!((a.distance(&b) - 2f32.sqrt()).abs() < 1e-6);
        assert!(a.distance(&c) < 1e-6);
    }
}
