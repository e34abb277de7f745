#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::search::index::CandidateIndex;
use crate::search::request::SimilarityQuery;
use crate::search::similarity::cosine_similarity;
use crate::{RecallError, Result};

/// One ranked result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub ref_id: String,
    /// Clamped cosine similarity in `[0, 1]`
    pub similarity: f32,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregate figures over a result list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchSummary {
    pub count: usize,
    pub mean: f32,
    pub max: f32,
    pub min: f32,
}

/// Two-phase retrieval: narrow to the `candidate_cap` nearest vectors of the
/// partition, then score, filter and rank those exactly.
///
/// The engine holds no mutable state; clones share the underlying index and
/// any number of queries may run concurrently.
#[derive(Clone)]
pub struct SimilarityEngine {
    index: Arc<dyn CandidateIndex>,
    dimension: usize,
}

impl SimilarityEngine {
    /// Queries are validated against the dimension the index reports
    #[inline]
    pub fn new(index: Arc<dyn CandidateIndex>) -> Self {
        let dimension = index.dimension();
        Self { index, dimension }
    }

    /// Run a similarity query.
    ///
    /// An empty partition yields an empty list. Candidates that clear the
    /// threshold but fall outside the nearest `candidate_cap` are not
    /// recoverable; a cap smaller than `limit` bounds recall without error.
    pub async fn query(&self, query: &SimilarityQuery) -> Result<Vec<SimilarityMatch>> {
        query.validate(self.dimension)?;

        let partition = query.partition();
        if let Some(limit) = query.limit {
            if query.candidate_cap < limit {
                debug!(
                    "candidate_cap {} is below limit {} for {}; recall is bounded by the cap",
                    query.candidate_cap, limit, partition
                );
            }
        }

        let mut candidates = self
            .index
            .scan_ordered(&partition, &query.query_vector, query.candidate_cap)
            .await?;
        candidates.truncate(query.candidate_cap);
        let scanned = candidates.len();

        let mut matches = Vec::with_capacity(scanned);
        for candidate in candidates {
            if candidate.vector.len() != self.dimension {
                return Err(RecallError::CorruptEmbedding {
                    ref_id: candidate.ref_id,
                    expected: self.dimension,
                    actual: candidate.vector.len(),
                });
            }

            if candidate.kind != query.kind {
                warn!(
                    "Index returned {} of kind {:?} for partition {}, skipping",
                    candidate.ref_id, candidate.kind, partition
                );
                continue;
            }

            let similarity = cosine_similarity(&query.query_vector, &candidate.vector);
            if similarity < query.threshold {
                continue;
            }

            matches.push(SimilarityMatch {
                ref_id: candidate.ref_id,
                similarity,
                kind: candidate.kind,
                created_at: candidate.created_at,
            });
        }

        rank(&mut matches);
        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }

        debug!(
            "Query on {} scanned {} candidates, returned {} matches (threshold {})",
            partition,
            scanned,
            matches.len(),
            query.threshold
        );
        Ok(matches)
    }
}

/// Similarity descending; ties go to the newer record, then to `ref_id`.
fn rank(matches: &mut [SimilarityMatch]) {
    matches.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.ref_id.cmp(&b.ref_id))
    });
}

/// Count, mean, max and min similarity. `None` for an empty list.
#[inline]
pub fn summarize(matches: &[SimilarityMatch]) -> Option<MatchSummary> {
    if matches.is_empty() {
        return None;
    }

    let (sum, max, min) = matches.iter().fold(
        (0.0_f32, f32::MIN, f32::MAX),
        |(sum, max, min), m| (sum + m.similarity, max.max(m.similarity), min.min(m.similarity)),
    );

    Some(MatchSummary {
        count: matches.len(),
        mean: sum / matches.len() as f32,
        max,
        min,
    })
}
