//! Matching orchestration: extraction, alpha search, blending and ranking.
//!
//! The service owns its collaborators (extractor, database loader) instead of
//! reaching for globals. Loaded databases are cached per path as immutable
//! `Arc` snapshots; [`MatchingService::reload`] swaps a snapshot in place while
//! callers already holding the old one keep using it.
//!
//! Snapshots are keyed by canonical path and live until evicted; the cache
//! assumes a small, fixed set of database files per process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::{
    blend::blend,
    embedding::Embedding,
    error::{ImageRole, MatchError, Result},
    extractor::EmbeddingExtractor,
    matcher::{rank, MatchResult},
    search::{AlphaEstimate, AlphaSearch, NoTargetPolicy},
    storage::{DatabaseLoader, EmbeddingDatabase, FileDatabaseLoader},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchSettings {
    pub alpha_step: f32,
    pub no_target: NoTargetPolicy,
    pub default_alpha: f32,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            alpha_step: AlphaSearch::DEFAULT_STEP,
            no_target: NoTargetPolicy::Default,
            default_alpha: AlphaSearch::DEFAULT_ALPHA,
        }
    }
}

/// Best alpha plus the children it ranks highest.
#[derive(Debug, Clone, Serialize)]
pub struct FamilyMatch {
    pub alpha: AlphaEstimate,
    pub results: Vec<MatchResult>,
}

pub struct MatchingService<E, L = FileDatabaseLoader> {
    extractor: E,
    loader: L,
    search: AlphaSearch,
    snapshots: RwLock<HashMap<PathBuf, Arc<EmbeddingDatabase>>>,
}

impl<E: EmbeddingExtractor> MatchingService<E, FileDatabaseLoader> {
    pub fn new(extractor: E, settings: MatchSettings) -> Result<Self> {
        Self::with_loader(extractor, FileDatabaseLoader, settings)
    }
}

impl<E: EmbeddingExtractor, L: DatabaseLoader> MatchingService<E, L> {
    pub fn with_loader(extractor: E, loader: L, settings: MatchSettings) -> Result<Self> {
        let search = AlphaSearch::new(settings.alpha_step)?
            .with_fallback(settings.no_target, settings.default_alpha)?;
        Ok(Self {
            extractor,
            loader,
            search,
            snapshots: RwLock::new(HashMap::new()),
        })
    }

    /// Alpha best explaining the child photo, or the fallback policy's answer
    /// when `child` is absent or does not exist on disk.
    pub fn find_best_alpha(
        &self,
        mother: &Path,
        father: &Path,
        child: Option<&Path>,
    ) -> Result<AlphaEstimate> {
        let (mother, father) = self.parents(mother, father)?;
        self.best_alpha(&mother, &father, child)
    }

    pub fn find_similar_children(
        &self,
        mother: &Path,
        father: &Path,
        alpha: f32,
        database: &Path,
        top_k: usize,
    ) -> Result<Vec<MatchResult>> {
        check_alpha(alpha)?;
        check_top_k(top_k)?;
        let (mother, father) = self.parents(mother, father)?;
        self.similar(&mother, &father, alpha, database, top_k)
    }

    /// Best alpha, then the children closest to the blend at that alpha.
    pub fn match_family(
        &self,
        mother: &Path,
        father: &Path,
        child: Option<&Path>,
        database: &Path,
        top_k: usize,
    ) -> Result<FamilyMatch> {
        check_top_k(top_k)?;
        let (mother, father) = self.parents(mother, father)?;
        let alpha = self.best_alpha(&mother, &father, child)?;
        let results = self.similar(&mother, &father, alpha.alpha, database, top_k)?;
        Ok(FamilyMatch { alpha, results })
    }

    /// Cached snapshot for `path`, loading it on first use.
    pub fn snapshot(&self, path: &Path) -> Result<Arc<EmbeddingDatabase>> {
        let key = cache_key(path);
        if let Some(db) = self.snapshots.read().get(&key) {
            log::debug!("using cached database {}", path.display());
            return Ok(Arc::clone(db));
        }

        let loaded = Arc::new(self.loader.load(path)?);
        log::debug!(
            "loaded database {} with {} children",
            path.display(),
            loaded.len()
        );
        // a concurrent first load may have won; keep whichever landed first
        let mut snapshots = self.snapshots.write();
        Ok(Arc::clone(
            snapshots.entry(key).or_insert(loaded),
        ))
    }

    /// Re-read `path` and swap the cached snapshot. On failure the old snapshot stays.
    pub fn reload(&self, path: &Path) -> Result<Arc<EmbeddingDatabase>> {
        let fresh = Arc::new(self.loader.load(path)?);
        self.snapshots
            .write()
            .insert(cache_key(path), Arc::clone(&fresh));
        log::debug!(
            "reloaded database {} with {} children",
            path.display(),
            fresh.len()
        );
        Ok(fresh)
    }

    /// Drop the cached snapshot for `path`; returns whether one was cached.
    pub fn evict(&self, path: &Path) -> bool {
        self.snapshots.write().remove(&cache_key(path)).is_some()
    }

    fn best_alpha(
        &self,
        mother: &Embedding,
        father: &Embedding,
        child: Option<&Path>,
    ) -> Result<AlphaEstimate> {
        let target = match child.filter(|p| p.exists()) {
            Some(path) => Some(self.extract(ImageRole::Child, path)?),
            None => {
                log::debug!(
                    "no child photo available, applying {:?} policy",
                    self.search.policy()
                );
                None
            }
        };
        self.search.search(mother, father, target.as_ref())
    }

    fn similar(
        &self,
        mother: &Embedding,
        father: &Embedding,
        alpha: f32,
        database: &Path,
        top_k: usize,
    ) -> Result<Vec<MatchResult>> {
        let expected = blend(mother, father, alpha)?;
        let snapshot = self.snapshot(database)?;
        rank(&expected, &snapshot, top_k)
    }

    fn parents(&self, mother: &Path, father: &Path) -> Result<(Embedding, Embedding)> {
        Ok((
            self.extract(ImageRole::Mother, mother)?,
            self.extract(ImageRole::Father, father)?,
        ))
    }

    fn extract(&self, role: ImageRole, path: &Path) -> Result<Embedding> {
        self.extractor
            .extract(path)
            .map_err(|source| MatchError::Extraction { role, source })
    }
}

/// Spellings of one file share a snapshot; unresolvable paths key as given.
fn cache_key(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn check_alpha(alpha: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(MatchError::InvalidAlpha { alpha });
    }
    Ok(())
}

fn check_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(MatchError::InvalidTopK { top_k });
    }
    Ok(())
}
