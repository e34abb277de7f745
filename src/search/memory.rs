// Exact brute-force index held in memory.
// Suited to small partitions and to tests; every scan ranks the whole partition.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::database::lancedb::{EmbeddingRecord, RecordKey};
use crate::search::index::{Candidate, CandidateIndex, Partition};
use crate::search::similarity::cosine_distance;
use crate::{RecallError, Result};

#[derive(Debug, Clone)]
pub struct MemoryIndex {
    dimension: usize,
    records: Arc<RwLock<HashMap<RecordKey, EmbeddingRecord>>>,
}

impl MemoryIndex {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: Arc::default(),
        }
    }

    /// Insert or replace a record. Vectors of the wrong length are rejected.
    pub async fn upsert(&self, record: EmbeddingRecord) -> Result<()> {
        self.check_dimension(&record)?;
        self.records.write().await.insert(record.key(), record);
        Ok(())
    }

    pub async fn upsert_batch(&self, records: Vec<EmbeddingRecord>) -> Result<usize> {
        for record in &records {
            self.check_dimension(record)?;
        }

        let count = records.len();
        let mut guard = self.records.write().await;
        for record in records {
            guard.insert(record.key(), record);
        }
        Ok(count)
    }

    /// Whether any record exists for `ref_id` under `model_tag`
    pub async fn exists(&self, ref_id: &str, model_tag: &str) -> bool {
        self.records
            .read()
            .await
            .keys()
            .any(|key| key.ref_id == ref_id && key.partition.model_tag == model_tag)
    }

    /// Remove every record for `ref_id`, across owners, models and kinds
    pub async fn delete_by_ref(&self, ref_id: &str) -> usize {
        let mut guard = self.records.write().await;
        let before = guard.len();
        guard.retain(|key, _| key.ref_id != ref_id);
        before - guard.len()
    }

    pub async fn count(&self, partition: Option<&Partition>) -> usize {
        let guard = self.records.read().await;
        partition.map_or(guard.len(), |partition| {
            guard.keys().filter(|key| &key.partition == partition).count()
        })
    }

    fn check_dimension(&self, record: &EmbeddingRecord) -> Result<()> {
        if record.vector.len() == self.dimension {
            Ok(())
        } else {
            Err(RecallError::CorruptEmbedding {
                ref_id: record.ref_id.clone(),
                expected: self.dimension,
                actual: record.vector.len(),
            })
        }
    }
}

#[async_trait]
impl CandidateIndex for MemoryIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn scan_ordered(
        &self,
        partition: &Partition,
        query_vector: &[f32],
        max_candidates: usize,
    ) -> Result<Vec<Candidate>> {
        let guard = self.records.read().await;

        let mut candidates: Vec<Candidate> = guard
            .iter()
            .filter(|(key, _)| &key.partition == partition)
            .map(|(_, record)| Candidate {
                ref_id: record.ref_id.clone(),
                vector: record.vector.clone(),
                kind: record.kind.clone(),
                created_at: record.created_at,
                distance: cosine_distance(query_vector, &record.vector),
            })
            .collect();
        drop(guard);

        candidates.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.ref_id.cmp(&b.ref_id))
        });
        candidates.truncate(max_candidates);

        debug!(
            "Memory scan of {} returned {} candidates",
            partition,
            candidates.len()
        );
        Ok(candidates)
    }
}
