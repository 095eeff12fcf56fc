use crate::{
    embedding::Embedding,
    error::{ensure_dim, MatchError, Result},
};

/// Expected-child embedding `alpha * mother + (1 - alpha) * father`, re-normalized.
///
/// `alpha = 1` reproduces the mother, `alpha = 0` the father.
pub fn blend(mother: &Embedding, father: &Embedding, alpha: f32) -> Result<Embedding> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(MatchError::InvalidAlpha { alpha });
    }
    ensure_dim("blend", mother.dim(), father.dim())?;

    let mixed = mother.vector() * alpha + father.vector() * (1.0 - alpha);
    // only reachable when mother == -father at alpha = 0.5
    Embedding::from_array(mixed).map_err(|_| MatchError::InvalidEmbedding {
        reason: format!("blend at alpha {alpha} cancels to a zero vector"),
    })
}
