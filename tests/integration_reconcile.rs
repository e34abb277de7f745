#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

/// Collapsing legacy entry point variants and dispatching through the result
use semantic_recall::RecallError;
use semantic_recall::config::Config;
use semantic_recall::database::Database;
use semantic_recall::database::lancedb::{EmbeddingRecord, VectorStore};
use semantic_recall::database::sqlite::models::{ParamSpec, ParamType};
use semantic_recall::schema::signature::{
    CANONICAL_VERSION, PARAM_CANDIDATE_CAP, PARAM_KIND, PARAM_LIMIT, PARAM_MODEL_TAG,
    PARAM_QUERY_VECTOR, PARAM_THRESHOLD, PARAM_USER_ID,
};
use semantic_recall::schema::{
    ENTRY_POINT_NAME, EntryPointRegistry, NamedArgs, SchemaReconciler, Signature,
};
use semantic_recall::search::SimilarityEngine;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;

const DIMENSION: u32 = 4;

struct Deployment {
    _temp_dir: TempDir,
    reconciler: SchemaReconciler,
    registry: EntryPointRegistry,
    engine: SimilarityEngine,
    store: Arc<VectorStore>,
}

async fn create_deployment() -> Deployment {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::with_base_dir(temp_dir.path());
    config.store.dimension = DIMENSION;

    let database = Database::initialize_from_config_dir(config.get_base_dir())
        .await
        .expect("should open catalog");
    let store = Arc::new(
        VectorStore::new(&config)
            .await
            .expect("should open vector store"),
    );

    Deployment {
        _temp_dir: temp_dir,
        reconciler: SchemaReconciler::new(database.clone()),
        registry: EntryPointRegistry::new(database),
        engine: SimilarityEngine::new(store.clone()),
        store,
    }
}

fn required() -> Vec<ParamSpec> {
    vec![
        ParamSpec::required(PARAM_QUERY_VECTOR, ParamType::Vector),
        ParamSpec::required(PARAM_USER_ID, ParamType::Text),
        ParamSpec::required(PARAM_MODEL_TAG, ParamType::Text),
    ]
}

fn legacy_variants() -> Vec<Signature> {
    let mut threshold_first = required();
    threshold_first.push(ParamSpec::optional(PARAM_THRESHOLD, ParamType::Real, json!(0.78)));
    threshold_first.push(ParamSpec::optional(PARAM_LIMIT, ParamType::Integer, json!(10)));

    let mut limit_first = required();
    limit_first.push(ParamSpec::optional(PARAM_KIND, ParamType::Text, json!("message")));
    limit_first.push(ParamSpec::optional(PARAM_LIMIT, ParamType::Integer, Value::Null));
    limit_first.push(ParamSpec::optional(PARAM_THRESHOLD, ParamType::Real, json!(0.7)));

    let mut with_cap = required();
    with_cap.push(ParamSpec::optional(PARAM_KIND, ParamType::Text, json!("fact")));
    with_cap.push(ParamSpec::optional(PARAM_THRESHOLD, ParamType::Real, json!(0.5)));
    with_cap.push(ParamSpec::optional(PARAM_LIMIT, ParamType::Integer, json!(5)));
    with_cap.push(ParamSpec::optional(PARAM_CANDIDATE_CAP, ParamType::Integer, json!(50)));

    vec![
        Signature::new(ENTRY_POINT_NAME, threshold_first),
        Signature::new(ENTRY_POINT_NAME, limit_first),
        Signature::new(ENTRY_POINT_NAME, with_cap),
    ]
}

fn required_args() -> NamedArgs {
    [
        (PARAM_QUERY_VECTOR.to_string(), json!([1.0, 0.0, 0.0, 0.0])),
        (PARAM_USER_ID.to_string(), json!("alice")),
        (PARAM_MODEL_TAG.to_string(), json!("e5")),
    ]
    .into_iter()
    .collect()
}

async fn seed_embeddings(store: &VectorStore) {
    store
        .upsert_batch(&[
            EmbeddingRecord::new("close", "alice", "e5", "message", vec![0.95, 0.31, 0.0, 0.0]),
            EmbeddingRecord::new("near", "alice", "e5", "message", vec![0.75, 0.0, 0.66, 0.0]),
            EmbeddingRecord::new("far", "alice", "e5", "message", vec![0.0, 0.0, 0.0, 1.0]),
            EmbeddingRecord::new("fact", "alice", "e5", "fact", vec![1.0, 0.0, 0.0, 0.0]),
        ])
        .await
        .expect("should store");
}

#[tokio::test]
async fn legacy_overloads_collapse_and_calls_dispatch() {
    let deployment = create_deployment().await;
    seed_embeddings(&deployment.store).await;

    for variant in legacy_variants() {
        deployment
            .registry
            .install_variant(&variant, 0)
            .await
            .expect("should install legacy variant");
    }

    // Before reconciliation a required-only call is ambiguous
    let before = deployment
        .registry
        .invoke(&deployment.engine, &required_args())
        .await;
    assert!(matches!(
        before,
        Err(RecallError::InconsistentSchema { ref variants }) if variants.len() == 3
    ));

    let report = deployment
        .reconciler
        .reconcile()
        .await
        .expect("should reconcile");
    assert!(report.changed);
    assert_eq!(report.removed.len(), 3);

    let variants = deployment.registry.variants().await.expect("should list");
    assert_eq!(variants.len(), 1);
    assert_eq!(variants[0].version, CANONICAL_VERSION);
    assert_eq!(variants[0].signature, Signature::canonical());

    // Required-only call binds the canonical defaults: kind message, threshold 0.7
    let matches = deployment
        .registry
        .invoke(&deployment.engine, &required_args())
        .await
        .expect("should dispatch");
    let ids: Vec<&str> = matches.iter().map(|m| m.ref_id.as_str()).collect();
    assert_eq!(ids, vec!["close", "near"]);

    // Every canonical parameter supplied by name
    let mut full = required_args();
    full.insert(PARAM_KIND.to_string(), json!("fact"));
    full.insert(PARAM_THRESHOLD.to_string(), json!(0.9));
    full.insert(PARAM_LIMIT.to_string(), json!(1));
    full.insert(PARAM_CANDIDATE_CAP.to_string(), json!(10));
    let facts = deployment
        .registry
        .invoke(&deployment.engine, &full)
        .await
        .expect("should dispatch");
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].ref_id, "fact");
}

#[tokio::test]
async fn reconcile_twice_changes_nothing() {
    let deployment = create_deployment().await;
    for variant in legacy_variants() {
        deployment
            .registry
            .install_variant(&variant, 0)
            .await
            .expect("should install legacy variant");
    }

    let first = deployment
        .reconciler
        .reconcile()
        .await
        .expect("should reconcile");
    let catalog = deployment.registry.variants().await.expect("should list");

    let second = deployment
        .reconciler
        .reconcile()
        .await
        .expect("should reconcile again");
    assert!(first.changed);
    assert!(!second.changed);
    assert!(second.removed.is_empty());
    assert_eq!(
        deployment.registry.variants().await.expect("should list"),
        catalog
    );
}

#[tokio::test]
async fn unknown_argument_is_rejected_after_reconcile() {
    let deployment = create_deployment().await;
    deployment
        .reconciler
        .reconcile()
        .await
        .expect("should reconcile");

    let mut args = required_args();
    args.insert("match_language".to_string(), json!("en"));
    assert!(matches!(
        deployment.registry.invoke(&deployment.engine, &args).await,
        Err(RecallError::InvalidQuery(_))
    ));

    let mut missing = required_args();
    missing.remove(PARAM_USER_ID);
    assert!(matches!(
        deployment.registry.invoke(&deployment.engine, &missing).await,
        Err(RecallError::InvalidQuery(_))
    ));
}
