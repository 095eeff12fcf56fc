use serde::Serialize;

use crate::{
    embedding::Embedding,
    error::{ensure_dim, MatchError, Result},
    storage::EmbeddingDatabase,
};

/// One ranked candidate child.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// 1-based position, best first.
    pub rank: usize,
    pub id: String,
    pub image: String,
    pub score: f32,
}

/// Top `top_k` children by cosine similarity to `query`.
///
/// Sorted by descending score, equal scores by ascending id. An empty
/// database yields no matches; a database smaller than `top_k` yields all
/// of its records.
pub fn rank(
    query: &Embedding,
    database: &EmbeddingDatabase,
    top_k: usize,
) -> Result<Vec<MatchResult>> {
    if top_k == 0 {
        return Err(MatchError::InvalidTopK { top_k });
    }
    let Some(dim) = database.dimension() else {
        return Ok(Vec::new());
    };
    ensure_dim("rank", dim, query.dim())?;

    let mut scored: Vec<(f32, &str, &str)> = database
        .all()
        .iter()
        // `+ 0.0` folds -0.0 into 0.0 so equal scores fall through to the id order
        .map(|r| (query.cosine(&r.embedding) + 0.0, r.id.as_str(), r.image.as_str()))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));

    Ok(scored
        .into_iter()
        .take(top_k)
        .enumerate()
        .map(|(i, (score, id, image))| MatchResult {
            rank: i + 1,
            id: id.to_string(),
            image: image.to_string(),
            score,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ChildRecord;

    fn emb(v: &[f32]) -> Embedding {
        Embedding::new(v.to_vec()).unwrap()
    }

    fn child(id: &str, v: &[f32]) -> ChildRecord {
        ChildRecord {
            id: id.to_string(),
            image: format!("{id}.png"),
            embedding: emb(v),
        }
    }

    fn db(records: Vec<ChildRecord>) -> EmbeddingDatabase {
        EmbeddingDatabase::new(records).unwrap()
    }

    #[test]
    fn test_sorted_by_score_then_id() {
        let database = db(vec![
            child("d", &[0.0, 1.0]),
            child("c", &[1.0, 0.0]),
            child("a", &[1.0, 0.0]),
            child("b", &[0.6, 0.8]),
        ]);
        let results = rank(&emb(&[1.0, 0.0]), &database, 10).unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "c", "b", "d"]);
        let ranks: Vec<_> = results.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, [1, 2, 3, 4]);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(results[2].image, "b.png");
    }

    #[test]
    fn test_orthogonal_ties_order_by_id() {
        let database = db(vec![child("D", &[0.0, 3.0]), child("C", &[0.0, -2.0])]);
        let results = rank(&emb(&[-1.0, 0.0]), &database, 2).unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["C", "D"]);
        assert!(results
            .iter()
            .all(|r| r.score == 0.0 && r.score.is_sign_positive()));
    }

    #[test]
    fn test_truncates_to_top_k() {
        let database = db(vec![
            child("a", &[1.0, 0.0]),
            child("b", &[0.0, 1.0]),
            child("c", &[0.7, 0.7]),
        ]);
        let results = rank(&emb(&[0.0, 1.0]), &database, 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "b");
        assert_eq!(results[1].id, "c");
    }

    #[test]
    fn test_empty_database_has_no_matches() {
        let query = emb(&[1.0, 0.0, 0.0]);
        let results = rank(&query, &EmbeddingDatabase::empty(), 5).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let database = db(vec![child("a", &[1.0, 0.0])]);
        assert!(matches!(
            rank(&emb(&[1.0, 0.0]), &database, 0),
            Err(MatchError::InvalidTopK { top_k: 0 })
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let database = db(vec![child("a", &[1.0, 0.0])]);
        let err = rank(&emb(&[1.0, 0.0, 0.0]), &database, 1).unwrap_err();
        assert!(matches!(
            err,
            MatchError::DimensionMismatch {
                expected: 2,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_repeated_queries_are_stable() {
        let database = db(vec![
            child("x", &[0.3, 0.3, 0.9]),
            child("m", &[0.3, 0.3, 0.9]),
            child("q", &[0.9, 0.3, 0.3]),
        ]);
        let query = emb(&[0.5, 0.2, 0.8]);
        let first = rank(&query, &database, 3).unwrap();
        for _ in 0..5 {
            assert_eq!(rank(&query, &database, 3).unwrap(), first);
        }
        assert_eq!(first[0].id, "m");
    }
}
