// LanceDB vector database module
// Handles embedding storage and partition-scoped nearest-neighbour scans


pub mod vector_store;

pub use vector_store::VectorStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::search::index::Partition;

/// One stored embedding.
///
/// `(ref_id, owner_id, model_tag, kind)` identifies at most one record;
/// writing the same identity again replaces the vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Source entity this vector represents (message, fact, chunk). Opaque.
    pub ref_id: String,
    pub owner_id: String,
    /// Model that produced the vector; vectors of different tags are never compared
    pub model_tag: String,
    pub kind: String,
    pub vector: Vec<f32>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    #[inline]
    pub fn new(
        ref_id: impl Into<String>,
        owner_id: impl Into<String>,
        model_tag: impl Into<String>,
        kind: impl Into<String>,
        vector: Vec<f32>,
    ) -> Self {
        Self {
            ref_id: ref_id.into(),
            owner_id: owner_id.into(),
            model_tag: model_tag.into(),
            kind: kind.into(),
            vector,
            created_at: Utc::now(),
        }
    }

    #[inline]
    pub fn partition(&self) -> Partition {
        Partition::new(&self.owner_id, &self.model_tag, &self.kind)
    }

    /// Identity of the record within the store
    #[inline]
    pub fn key(&self) -> RecordKey {
        RecordKey {
            ref_id: self.ref_id.clone(),
            partition: self.partition(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub ref_id: String,
    pub partition: Partition,
}
