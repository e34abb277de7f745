
use super::{EmbeddingRecord, RecordKey};
use crate::search::index::{Candidate, CandidateIndex, Partition};
use crate::{RecallError, Result, config::Config};
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tracing::{debug, info};

const TABLE_NAME: &str = "embeddings";

/// Columns that together identify one stored embedding
const IDENTITY_COLUMNS: [&str; 4] = ["ref_id", "owner_id", "model_tag", "kind"];

/// Persistent embedding store backed by LanceDB.
///
/// All vectors in the table share one dimension, fixed when the table is
/// created. Opening a table whose dimension differs from the configured one
/// is refused rather than silently recreated.
pub struct VectorStore {
    table: Table,
    dimension: usize,
}

impl VectorStore {
    /// Open (or create) the embeddings table under the configured base directory
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        let db_path = config.vector_database_path();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(&db_path).map_err(|e| {
            RecallError::StoreUnavailable(format!(
                "Failed to create vector database directory: {}",
                e
            ))
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| unavailable("Failed to connect to LanceDB", e))?;

        let dimension = config.dimension();
        let table = Self::open_or_create_table(&connection, dimension).await?;

        info!("Vector store initialized with {} dimensions", dimension);
        Ok(Self {
            table,
            dimension,
        })
    }

    async fn open_or_create_table(connection: &Connection, dimension: usize) -> Result<Table> {
        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| unavailable("Failed to list tables", e))?;

        if table_names.iter().any(|name| name == TABLE_NAME) {
            let table = connection
                .open_table(TABLE_NAME)
                .execute()
                .await
                .map_err(|e| unavailable("Failed to open embeddings table", e))?;

            let existing = Self::detect_vector_dimension(&table).await?;
            if existing != dimension {
                return Err(RecallError::Config(format!(
                    "Embeddings table stores {}-dimensional vectors but {} are configured",
                    existing, dimension
                )));
            }
            debug!("Opened existing embeddings table");
            return Ok(table);
        }

        info!("Creating embeddings table with {} dimensions", dimension);
        connection
            .create_empty_table(TABLE_NAME, create_schema(dimension)?)
            .execute()
            .await
            .map_err(|e| unavailable("Failed to create embeddings table", e))
    }

    async fn detect_vector_dimension(table: &Table) -> Result<usize> {
        let schema = table
            .schema()
            .await
            .map_err(|e| unavailable("Failed to get table schema", e))?;

        schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| {
                RecallError::Database("Could not find vector column or its dimension".to_string())
            })
    }

    /// Insert or replace a batch of embeddings.
    ///
    /// The whole batch is rejected if any vector has the wrong length.
    /// Records sharing an identity collapse to the last one in the batch.
    /// Returns the number of distinct records written.
    #[inline]
    pub async fn upsert_batch(&self, records: &[EmbeddingRecord]) -> Result<usize> {
        if records.is_empty() {
            debug!("No embeddings to store");
            return Ok(0);
        }

        if let Some(bad) = records.iter().find(|r| r.vector.len() != self.dimension) {
            return Err(RecallError::CorruptEmbedding {
                ref_id: bad.ref_id.clone(),
                expected: self.dimension,
                actual: bad.vector.len(),
            });
        }

        let records = last_per_identity(records);
        let record_batch = self.create_record_batch(&records)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let mut merge = self.table.merge_insert(&IDENTITY_COLUMNS);
        merge.when_matched_update_all(None).when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| unavailable("Failed to upsert embeddings", e))?;

        info!("Stored {} embeddings", records.len());
        Ok(records.len())
    }

    #[inline]
    pub async fn upsert(&self, record: &EmbeddingRecord) -> Result<()> {
        self.upsert_batch(std::slice::from_ref(record)).await?;
        Ok(())
    }

    fn create_record_batch(&self, records: &[&EmbeddingRecord]) -> Result<RecordBatch> {
        let len = records.len();
        let mut ref_ids = Vec::with_capacity(len);
        let mut owner_ids = Vec::with_capacity(len);
        let mut model_tags = Vec::with_capacity(len);
        let mut kinds = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.dimension);

        for record in records {
            ref_ids.push(record.ref_id.as_str());
            owner_ids.push(record.owner_id.as_str());
            model_tags.push(record.model_tag.as_str());
            kinds.push(record.kind.as_str());
            created_ats.push(record.created_at.to_rfc3339());
            flat_values.extend_from_slice(&record.vector);
        }

        let vector_array = FixedSizeListArray::try_new(
            item_field(),
            list_size(self.dimension)?,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RecallError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ref_ids)),
            Arc::new(StringArray::from(owner_ids)),
            Arc::new(StringArray::from(model_tags)),
            Arc::new(StringArray::from(kinds)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(create_schema(self.dimension)?, arrays)
            .map_err(|e| RecallError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Whether an embedding exists for `ref_id` produced by `model_tag`, in any partition
    #[inline]
    pub async fn exists(&self, ref_id: &str, model_tag: &str) -> Result<bool> {
        let predicate = format!(
            "ref_id = {} AND model_tag = {}",
            quote(ref_id),
            quote(model_tag)
        );
        Ok(self.count_matching(Some(predicate)).await? > 0)
    }

    /// Delete every embedding of `ref_id` across owners, models and kinds.
    /// Returns the number of rows removed.
    #[inline]
    pub async fn delete_by_ref(&self, ref_id: &str) -> Result<usize> {
        let predicate = format!("ref_id = {}", quote(ref_id));
        let count = self.count_matching(Some(predicate.clone())).await?;
        if count == 0 {
            return Ok(0);
        }

        self.table
            .delete(&predicate)
            .await
            .map_err(|e| unavailable("Failed to delete embeddings", e))?;

        info!("Deleted {} embeddings for {}", count, ref_id);
        Ok(count)
    }

    /// Number of embeddings, optionally restricted to one partition
    #[inline]
    pub async fn count(&self, partition: Option<&Partition>) -> Result<usize> {
        self.count_matching(partition.map(partition_predicate))
            .await
    }

    async fn count_matching(&self, predicate: Option<String>) -> Result<usize> {
        self.table
            .count_rows(predicate)
            .await
            .map_err(|e| unavailable("Failed to count rows", e))
    }

    /// Compact data files and prune old versions
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        debug!("Optimizing vector database");
        self.table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| unavailable("Failed to optimize table", e))?;
        info!("Vector database optimization completed");
        Ok(())
    }

    fn parse_candidate_batch(&self, batch: &RecordBatch) -> Result<Vec<Candidate>> {
        let ref_ids = string_column(batch, "ref_id")?;
        let kinds = string_column(batch, "kind")?;
        let created_ats = string_column(batch, "created_at")?;
        let vectors = batch
            .column_by_name("vector")
            .ok_or_else(|| RecallError::Database("Missing vector column".to_string()))?
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .ok_or_else(|| RecallError::Database("Invalid vector column type".to_string()))?;
        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut candidates = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let ref_id = ref_ids.value(row).to_string();
            let values = vectors.value(row);
            let vector = values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| {
                    RecallError::Database(format!("Invalid vector values for {}", ref_id))
                })?
                .values()
                .to_vec();

            let created_at = DateTime::parse_from_rfc3339(created_ats.value(row))
                .map_err(|e| {
                    RecallError::Database(format!("Invalid created_at for {}: {}", ref_id, e))
                })?
                .with_timezone(&Utc);

            // Missing distances sort last; the engine rescores every candidate anyway
            let distance = distances
                .filter(|d| !d.is_null(row))
                .map_or(f32::INFINITY, |d| d.value(row));

            candidates.push(Candidate {
                ref_id,
                vector,
                kind: kinds.value(row).to_string(),
                created_at,
                distance,
            });
        }

        Ok(candidates)
    }
}

#[async_trait]
impl CandidateIndex for VectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn scan_ordered(
        &self,
        partition: &Partition,
        query_vector: &[f32],
        max_candidates: usize,
    ) -> Result<Vec<Candidate>> {
        // Nearest-neighbour search fails on a table with no fragments
        if self.count_matching(None).await? == 0 {
            return Ok(Vec::new());
        }

        let predicate = partition_predicate(partition);

        // The partition filter is applied before the nearest-neighbour limit
        let mut results = self
            .table
            .vector_search(query_vector)
            .map_err(|e| unavailable("Failed to create vector search", e))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .only_if(predicate)
            .limit(max_candidates)
            .execute()
            .await
            .map_err(|e| unavailable("Failed to execute search", e))?;

        let mut candidates = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| unavailable("Failed to read result stream", e))?
        {
            candidates.extend(self.parse_candidate_batch(&batch)?);
        }

        candidates.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.ref_id.cmp(&b.ref_id))
        });

        debug!(
            "LanceDB scan of {} returned {} candidates",
            partition,
            candidates.len()
        );
        Ok(candidates)
    }
}

/// Merge-insert only matches source rows against the table, so identities
/// repeated within one batch would all be inserted
fn last_per_identity(records: &[EmbeddingRecord]) -> Vec<&EmbeddingRecord> {
    let mut positions: HashMap<RecordKey, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<&EmbeddingRecord> = Vec::with_capacity(records.len());
    for record in records {
        match positions.entry(record.key()) {
            Entry::Occupied(slot) => unique[*slot.get()] = record,
            Entry::Vacant(slot) => {
                slot.insert(unique.len());
                unique.push(record);
            }
        }
    }
    unique
}

fn create_schema(dimension: usize) -> Result<Arc<Schema>> {
    Ok(Arc::new(Schema::new(vec![
        Field::new("ref_id", DataType::Utf8, false),
        Field::new("owner_id", DataType::Utf8, false),
        Field::new("model_tag", DataType::Utf8, false),
        Field::new("kind", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(item_field(), list_size(dimension)?),
            false,
        ),
        Field::new("created_at", DataType::Utf8, false),
    ])))
}

fn item_field() -> Arc<Field> {
    Arc::new(Field::new("item", DataType::Float32, false))
}

fn list_size(dimension: usize) -> Result<i32> {
    i32::try_from(dimension)
        .map_err(|_| RecallError::Config(format!("Vector dimension {} is too large", dimension)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RecallError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RecallError::Database(format!("Invalid {} column type", name)))
}

/// SQL string literal with embedded quotes doubled
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn partition_predicate(partition: &Partition) -> String {
    format!(
        "owner_id = {} AND model_tag = {} AND kind = {}",
        quote(&partition.owner_id),
        quote(&partition.model_tag),
        quote(&partition.kind)
    )
}

fn unavailable(context: &str, error: lancedb::Error) -> RecallError {
    RecallError::StoreUnavailable(format!("{}: {}", context, error))
}
