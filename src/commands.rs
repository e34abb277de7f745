use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::Database;
use crate::database::lancedb::{EmbeddingRecord, VectorStore};
use crate::schema::registry::{EntryPointRegistry, NamedArgs, select_variant};
use crate::schema::signature::{ENTRY_POINT_NAME, Signature};
use crate::schema::{ReconcileReport, SchemaReconciler};
use crate::search::{
    CandidateIndex, Partition, SimilarityEngine, SimilarityMatch, SimilarityQuery, summarize,
};

/// Options of the `search` subcommand; unset values fall back to the config
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub owner_id: String,
    pub query_vector: Vec<f32>,
    pub model_tag: Option<String>,
    pub kind: Option<String>,
    pub threshold: Option<f32>,
    pub limit: Option<usize>,
    pub candidate_cap: Option<usize>,
}

impl SearchOptions {
    /// Build the engine request, filling unset values from `config`
    #[inline]
    pub fn to_query(&self, config: &Config) -> SimilarityQuery {
        let model_tag = self
            .model_tag
            .clone()
            .unwrap_or_else(|| config.store.default_model_tag.clone());
        let mut query = SimilarityQuery::with_defaults(
            self.query_vector.clone(),
            self.owner_id.clone(),
            model_tag,
            &config.query,
        )
        .limit(self.limit);

        if let Some(kind) = &self.kind {
            query = query.kind(kind.clone());
        }
        if let Some(threshold) = self.threshold {
            query = query.threshold(threshold);
        }
        if let Some(candidate_cap) = self.candidate_cap {
            query = query.candidate_cap(candidate_cap);
        }
        query
    }
}

/// Outcome of loading a JSON lines file into the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub read: usize,
    pub stored: usize,
    pub skipped: usize,
}

async fn open_database(config: &Config) -> Result<Database> {
    Database::initialize_from_config_dir(config.get_base_dir())
        .await
        .context("Failed to initialize database")
}

/// Parse a query vector given either as a JSON array or as comma separated numbers
#[inline]
pub fn parse_vector(input: &str) -> Result<Vec<f32>> {
    let trimmed = input.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("Query vector is not a JSON array of numbers");
    }

    trimmed
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .with_context(|| format!("Invalid vector component: {:?}", part.trim()))
        })
        .collect()
}

/// Collapse every installed entry point variant into the canonical one
#[inline]
pub async fn reconcile_schema(config: &Config) -> Result<ReconcileReport> {
    let database = open_database(config).await?;
    let reconciler = SchemaReconciler::new(database);

    let report = match reconciler.reconcile().await {
        Ok(report) => report,
        Err(e) => {
            println!("❌ Reconciliation failed: {}", e);
            return Err(e.into());
        }
    };

    if report.changed {
        println!("✅ Installed {}", reconciler.canonical());
        if report.removed.is_empty() {
            println!("   No previous variants were installed");
        } else {
            println!("   Removed {} variant(s):", report.removed.len());
            for key in &report.removed {
                println!("     - {}", key);
            }
        }
        if !report.dropped_dependents.is_empty() {
            println!(
                "   ⚠️  Dropped {} dependent(s), re-register them against the canonical form:",
                report.dropped_dependents.len()
            );
            for name in &report.dropped_dependents {
                println!("     - {}", name);
            }
        }
    } else {
        println!("✅ Entry point already canonical: {}", report.installed);
    }

    Ok(report)
}

/// List installed variants and check how calls would dispatch
#[inline]
pub async fn show_variants(config: &Config) -> Result<()> {
    let database = open_database(config).await?;
    let dependents = database.list_dependents(ENTRY_POINT_NAME).await?;
    let registry = EntryPointRegistry::new(database);
    let variants = registry.variants().await?;

    println!("Installed variants ({} total):", variants.len());
    for variant in &variants {
        println!(
            "  #{} v{} {}",
            variant.id, variant.version, variant.signature
        );
        for dependent in dependents.iter().filter(|d| d.entry_point_id == variant.id) {
            println!("      used by {}", dependent.name);
        }
    }
    println!();

    let canonical = Signature::canonical();
    let signatures: Vec<Signature> = variants.into_iter().map(|v| v.signature).collect();
    let checks = [
        ("Required arguments only", canonical.required_names().collect::<Vec<_>>()),
        ("All arguments", canonical.all_names().collect::<Vec<_>>()),
    ];

    for (label, names) in checks {
        let args: NamedArgs = names
            .into_iter()
            .map(|name| (name.to_string(), Value::Null))
            .collect();
        match select_variant(signatures.clone(), &args) {
            Ok(signature) if signature == canonical => {
                println!("✅ {}: resolves to the canonical form", label);
            }
            Ok(signature) => {
                println!("⚠️  {}: resolves to non-canonical {}", label, signature.key());
            }
            Err(e) => {
                println!("❌ {}: {}", label, e);
            }
        }
    }

    Ok(())
}

/// Read embedding records from a JSON lines file and upsert them
#[inline]
pub async fn store_embeddings(config: &Config, path: &Path, overwrite: bool) -> Result<StoreStats> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut records = Vec::new();
    for (line_number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: EmbeddingRecord = serde_json::from_str(line)
            .with_context(|| format!("Invalid record on line {}", line_number + 1))?;
        records.push(record);
    }

    let store = VectorStore::new(config).await?;
    let mut stats = StoreStats {
        read: records.len(),
        ..StoreStats::default()
    };

    let mut pending = Vec::with_capacity(records.len());
    for record in records {
        if !overwrite && store.exists(&record.ref_id, &record.model_tag).await? {
            info!("Skipping existing embedding {} ({})", record.ref_id, record.model_tag);
            stats.skipped += 1;
            continue;
        }
        pending.push(record);
    }

    stats.stored = store.upsert_batch(&pending).await?;

    println!("Stored {} embedding(s) from {}", stats.stored, path.display());
    if stats.skipped > 0 {
        println!("  Skipped {} already embedded (use --overwrite to replace)", stats.skipped);
    }
    Ok(stats)
}

/// Run a similarity query against the persistent store and print the ranking
#[inline]
pub async fn search(config: &Config, options: &SearchOptions) -> Result<Vec<SimilarityMatch>> {
    let query = options.to_query(config);
    let store = VectorStore::new(config).await?;
    let engine = SimilarityEngine::new(Arc::new(store));

    let matches = engine.query(&query).await?;

    if matches.is_empty() {
        println!(
            "No matches above {:.2} in {}",
            query.threshold,
            query.partition()
        );
        return Ok(matches);
    }

    println!("Matches in {} ({} total):", query.partition(), matches.len());
    for (rank, m) in matches.iter().enumerate() {
        println!(
            "  {:>3}. {}  similarity {:.4}  ({})",
            rank + 1,
            m.ref_id,
            m.similarity,
            m.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    if let Some(summary) = summarize(&matches) {
        println!();
        println!("Summary:");
        println!("  Count: {}", summary.count);
        println!("  Mean similarity: {:.4}", summary.mean);
        println!("  Max similarity: {:.4}", summary.max);
        println!("  Min similarity: {:.4}", summary.min);
    }

    Ok(matches)
}

/// Delete every embedding of a source entity
#[inline]
pub async fn delete_embeddings(config: &Config, ref_id: &str) -> Result<usize> {
    let store = VectorStore::new(config).await?;
    let deleted = store.delete_by_ref(ref_id).await?;

    if deleted == 0 {
        warn!("No embeddings found for {}", ref_id);
        println!("No embeddings found for {}", ref_id);
    } else {
        println!("✓ Deleted {} embedding(s) for {}", deleted, ref_id);
    }
    Ok(deleted)
}

/// Compact the catalog and the embeddings table
#[inline]
pub async fn optimize_storage(config: &Config) -> Result<()> {
    let database = open_database(config).await?;
    database.optimize().await?;
    println!("✓ Catalog compacted");

    let store = VectorStore::new(config).await?;
    store.optimize().await?;
    println!("✓ Embeddings table compacted");
    Ok(())
}

/// Print catalog and store health, with counts for one partition if given
#[inline]
pub async fn show_status(config: &Config, partition: Option<&Partition>) -> Result<()> {
    println!("📊 Semantic Recall Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🗄️  Entry Point Catalog:");
    match open_database(config).await {
        Ok(database) => {
            println!("   ✅ SQLite: Connected");
            match SchemaReconciler::new(database).verify().await {
                Ok(signature) if signature == Signature::canonical() => {
                    println!("   ✅ Canonical entry point installed");
                }
                Ok(signature) => {
                    println!("   ⚠️  Non-canonical entry point: {}", signature.key());
                    println!("   Run 'semantic-recall reconcile' to fix it.");
                }
                Err(e) => {
                    println!("   ❌ {}", e);
                    println!("   Run 'semantic-recall reconcile' to fix it.");
                }
            }
        }
        Err(e) => {
            println!("   ❌ SQLite: Failed to connect - {}", e);
        }
    }

    println!();
    println!("🔍 Vector Database Status:");
    match VectorStore::new(config).await {
        Ok(store) => {
            println!("   ✅ LanceDB: Connected");
            println!("   🔢 Dimension: {}", store.dimension());
            match store.count(None).await {
                Ok(count) => println!("   📊 Total embeddings: {}", count),
                Err(e) => println!("   ⚠️  Total embeddings: Error - {}", e),
            }
            if let Some(partition) = partition {
                match store.count(Some(partition)).await {
                    Ok(count) => println!("   📊 Embeddings in {}: {}", partition, count),
                    Err(e) => println!("   ⚠️  Embeddings in {}: Error - {}", partition, e),
                }
            }
        }
        Err(e) => {
            println!("   ❌ LanceDB: Failed to connect - {}", e);
        }
    }

    Ok(())
}
