use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Result;

/// The subset of stored embeddings sharing one owner, model tag and kind.
/// Scans never cross a partition boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    pub owner_id: String,
    pub model_tag: String,
    pub kind: String,
}

impl Partition {
    #[inline]
    pub fn new(owner_id: &str, model_tag: &str, kind: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            model_tag: model_tag.to_string(),
            kind: kind.to_string(),
        }
    }
}

impl fmt::Display for Partition {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.owner_id, self.model_tag, self.kind)
    }
}

/// One nearest-neighbour candidate, before exact scoring
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub ref_id: String,
    pub vector: Vec<f32>,
    pub kind: String,
    pub created_at: DateTime<Utc>,
    /// Distance reported by the index. Only used for ordering the scan.
    pub distance: f32,
}

/// Nearest-by-distance primitive over a single partition.
///
/// Implementations return at most `max_candidates` entries ordered by
/// increasing cosine distance to `query_vector`. They may be approximate;
/// the similarity threshold is never applied here.
#[async_trait]
pub trait CandidateIndex: Send + Sync {
    /// Length of every vector the index holds
    fn dimension(&self) -> usize;

    async fn scan_ordered(
        &self,
        partition: &Partition,
        query_vector: &[f32],
        max_candidates: usize,
    ) -> Result<Vec<Candidate>>;
}
