use serde::{Deserialize, Serialize};

use crate::{
    blend::blend,
    embedding::Embedding,
    error::{ensure_dim, MatchError, Result},
};

/// What to do when there is no child photo to calibrate against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoTargetPolicy {
    /// Use the configured default alpha.
    #[default]
    Default,
    /// Fail with [`MatchError::NoTargetAvailable`].
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlphaSource {
    Searched,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlphaEstimate {
    pub alpha: f32,
    /// Distance from the best blend to the target, when a target was searched.
    pub distance: Option<f32>,
    pub source: AlphaSource,
}

/// Grid search for the alpha whose blend lies closest to a target child.
#[derive(Debug, Clone)]
pub struct AlphaSearch {
    steps: u32,
    policy: NoTargetPolicy,
    default_alpha: f32,
}

impl AlphaSearch {
    pub const DEFAULT_STEP: f32 = 0.01;
    pub const DEFAULT_ALPHA: f32 = 0.5;
    /// Finest grid accepted; keeps a search at no more than 10 001 blends.
    pub const MIN_STEP: f32 = 1e-4;

    pub fn new(step: f32) -> Result<Self> {
        if !(Self::MIN_STEP..=1.0).contains(&step) {
            return Err(MatchError::InvalidStep { step });
        }
        // bounded above by 1 / MIN_STEP, so the cast cannot saturate
        Ok(Self {
            steps: ((1.0 / step).round() as u32).max(1),
            policy: NoTargetPolicy::Default,
            default_alpha: Self::DEFAULT_ALPHA,
        })
    }

    pub fn with_fallback(mut self, policy: NoTargetPolicy, default_alpha: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&default_alpha) {
            return Err(MatchError::InvalidAlpha {
                alpha: default_alpha,
            });
        }
        self.policy = policy;
        self.default_alpha = default_alpha;
        Ok(self)
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn policy(&self) -> NoTargetPolicy {
        self.policy
    }

    /// Alpha in `[0, 1]` (mother weight) best explaining `target`.
    ///
    /// Distance is Euclidean between unit vectors. Ties resolve to the
    /// smallest alpha. Without a target the fallback policy decides.
    pub fn search(
        &self,
        mother: &Embedding,
        father: &Embedding,
        target: Option<&Embedding>,
    ) -> Result<AlphaEstimate> {
        ensure_dim("alpha search", mother.dim(), father.dim())?;
        let Some(target) = target else {
            return self.fallback();
        };
        ensure_dim("alpha search target", mother.dim(), target.dim())?;

        let mut best: Option<(f32, f32)> = None;
        for i in 0..=self.steps {
            let alpha = i as f32 / self.steps as f32;
            let candidate = match blend(mother, father, alpha) {
                Ok(c) => c,
                Err(MatchError::InvalidEmbedding { .. }) => continue,
                Err(e) => return Err(e),
            };
            let distance = candidate.distance(target);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((alpha, distance));
            }
        }

        // every grid point but one is non-degenerate, so a best always exists
        let (alpha, distance) = best.ok_or_else(|| MatchError::InvalidEmbedding {
            reason: "every blend on the alpha grid is degenerate".to_string(),
        })?;
        Ok(AlphaEstimate {
            alpha,
            distance: Some(distance),
            source: AlphaSource::Searched,
        })
    }

    fn fallback(&self) -> Result<AlphaEstimate> {
        match self.policy {
            NoTargetPolicy::Default => Ok(AlphaEstimate {
                alpha: self.default_alpha,
                distance: None,
                source: AlphaSource::Fallback,
            }),
            NoTargetPolicy::Fail => Err(MatchError::NoTargetAvailable),
        }
    }
}

impl Default for AlphaSearch {
    fn default() -> Self {
        Self {
            steps: 100,
            policy: NoTargetPolicy::Default,
            default_alpha: Self::DEFAULT_ALPHA,
        }
    }
}
