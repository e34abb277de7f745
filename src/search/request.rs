//! The single typed request accepted by the similarity engine.
//!
//! Every optional parameter has exactly one documented default, so callers
//! that supply only the required fields always resolve to the same query.

use serde::{Deserialize, Serialize};

use crate::config::QueryConfig;
use crate::search::index::Partition;
use crate::{RecallError, Result};

pub const DEFAULT_KIND: &str = "message";
pub const DEFAULT_THRESHOLD: f32 = 0.7;
/// Candidate prefix requested from the index. Kept configurable; the value
/// has not been re-derived against any particular partition size.
pub const DEFAULT_CANDIDATE_CAP: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityQuery {
    pub query_vector: Vec<f32>,
    pub owner_id: String,
    pub model_tag: String,
    pub kind: String,
    pub threshold: f32,
    /// `None` returns every survivor, which is still bounded by `candidate_cap`.
    pub limit: Option<usize>,
    /// Matches that would rank beyond this many nearest candidates are never
    /// returned, even if they clear the threshold. A cap below `limit` is
    /// honoured as given.
    pub candidate_cap: usize,
}

impl SimilarityQuery {
    #[inline]
    pub fn new(
        query_vector: Vec<f32>,
        owner_id: impl Into<String>,
        model_tag: impl Into<String>,
    ) -> Self {
        Self {
            query_vector,
            owner_id: owner_id.into(),
            model_tag: model_tag.into(),
            kind: DEFAULT_KIND.to_string(),
            threshold: DEFAULT_THRESHOLD,
            limit: None,
            candidate_cap: DEFAULT_CANDIDATE_CAP,
        }
    }

    /// Start from configured defaults instead of the built-in ones
    #[inline]
    pub fn with_defaults(
        query_vector: Vec<f32>,
        owner_id: impl Into<String>,
        model_tag: impl Into<String>,
        defaults: &QueryConfig,
    ) -> Self {
        Self {
            kind: defaults.kind.clone(),
            threshold: defaults.threshold,
            candidate_cap: defaults.candidate_cap,
            ..Self::new(query_vector, owner_id, model_tag)
        }
    }

    #[inline]
    #[must_use]
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    #[inline]
    #[must_use]
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    #[inline]
    #[must_use]
    pub fn candidate_cap(mut self, candidate_cap: usize) -> Self {
        self.candidate_cap = candidate_cap;
        self
    }

    #[inline]
    pub fn partition(&self) -> Partition {
        Partition::new(&self.owner_id, &self.model_tag, &self.kind)
    }

    /// Upper bound on the number of results this query can return
    #[inline]
    pub fn max_results(&self) -> usize {
        self.limit
            .map_or(self.candidate_cap, |limit| limit.min(self.candidate_cap))
    }

    /// Check every precondition against the deployment dimension
    pub fn validate(&self, dimension: usize) -> Result<()> {
        if self.query_vector.len() != dimension {
            return Err(RecallError::InvalidQuery(format!(
                "query vector has {} dimensions, deployment requires {}",
                self.query_vector.len(),
                dimension
            )));
        }

        if let Some(position) = self.query_vector.iter().position(|v| !v.is_finite()) {
            return Err(RecallError::InvalidQuery(format!(
                "query vector component {} is not finite",
                position
            )));
        }

        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(RecallError::InvalidQuery(format!(
                "threshold {} is outside [0, 1]",
                self.threshold
            )));
        }

        if self.limit == Some(0) {
            return Err(RecallError::InvalidQuery(
                "limit must be at least 1 when set".to_string(),
            ));
        }

        if self.candidate_cap == 0 {
            return Err(RecallError::InvalidQuery(
                "candidate_cap must be at least 1".to_string(),
            ));
        }

        for (name, value) in [
            ("owner_id", &self.owner_id),
            ("model_tag", &self.model_tag),
            ("kind", &self.kind),
        ] {
            if value.is_empty() {
                return Err(RecallError::InvalidQuery(format!("{} cannot be empty", name)));
            }
        }

        Ok(())
    }
}
