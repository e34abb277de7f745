use super::*;
use crate::database::lancedb::EmbeddingRecord;
use crate::search::index::{Candidate, Partition};
use crate::search::memory::MemoryIndex;
use async_trait::async_trait;
use chrono::{Duration, TimeZone};
use std::sync::atomic::{AtomicUsize, Ordering};

const OWNER: &str = "owner-a";
const MODEL: &str = "e5";

/// Unit vector whose cosine similarity to `[1, 0]` is `similarity`
fn with_similarity(similarity: f32) -> Vec<f32> {
    vec![similarity, (1.0 - similarity * similarity).sqrt()]
}

fn record(ref_id: &str, vector: Vec<f32>) -> EmbeddingRecord {
    EmbeddingRecord::new(ref_id, OWNER, MODEL, "message", vector)
}

async fn engine_with(records: Vec<EmbeddingRecord>) -> SimilarityEngine {
    let index = MemoryIndex::new(2);
    index
        .upsert_batch(records)
        .await
        .expect("should insert test records");
    SimilarityEngine::new(Arc::new(index))
}

fn query() -> SimilarityQuery {
    SimilarityQuery::new(vec![1.0, 0.0], OWNER, MODEL)
}

/// Index that hands back a fixed candidate list, ignoring ordering rules
struct FixedIndex {
    dimension: usize,
    candidates: Vec<Candidate>,
    calls: AtomicUsize,
}

impl FixedIndex {
    fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            dimension: 2,
            candidates,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CandidateIndex for FixedIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn scan_ordered(
        &self,
        _partition: &Partition,
        _query_vector: &[f32],
        _max_candidates: usize,
    ) -> Result<Vec<Candidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.candidates.clone())
    }
}

fn candidate(ref_id: &str, vector: Vec<f32>) -> Candidate {
    Candidate {
        ref_id: ref_id.to_string(),
        vector,
        kind: "message".to_string(),
        created_at: Utc::now(),
        distance: 0.0,
    }
}

/// Deterministic pseudo-random vectors, roughly spread around `[1, 0, 0, 0]`
fn scattered_vectors(count: usize, dimension: usize) -> Vec<Vec<f32>> {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    (0..count)
        .map(|_| {
            (0..dimension)
                .map(|i| {
                    state = state
                        .wrapping_mul(6_364_136_223_846_793_005)
                        .wrapping_add(1_442_695_040_888_963_407);
                    let noise = ((state >> 33) as f32 / u32::MAX as f32) - 0.25;
                    if i == 0 { 1.0 + noise } else { noise }
                })
                .collect()
        })
        .collect()
}

#[tokio::test]
async fn threshold_then_limit_keeps_best_two() {
    let engine = engine_with(vec![
        record("a", with_similarity(0.95)),
        record("b", with_similarity(0.81)),
        record("c", with_similarity(0.72)),
        record("d", with_similarity(0.5)),
    ])
    .await;

    let results = engine
        .query(&query().threshold(0.7).candidate_cap(10).limit(Some(2)))
        .await
        .expect("query should succeed");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].ref_id, "a");
    assert_eq!(results[1].ref_id, "b");
    assert!((results[0].similarity - 0.95).abs() < 1e-5);
    assert!((results[1].similarity - 0.81).abs() < 1e-5);
}

#[tokio::test]
async fn unlimited_query_returns_all_survivors() {
    let engine = engine_with(vec![
        record("a", with_similarity(0.95)),
        record("b", with_similarity(0.81)),
        record("c", with_similarity(0.72)),
        record("d", with_similarity(0.5)),
    ])
    .await;

    let results = engine.query(&query()).await.expect("query should succeed");

    let ids: Vec<&str> = results.iter().map(|m| m.ref_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn empty_partition_is_not_an_error() {
    let engine = engine_with(vec![]).await;

    let results = engine.query(&query()).await.expect("query should succeed");
    assert!(results.is_empty());
}

#[tokio::test]
async fn wrong_dimension_is_rejected_before_scanning() {
    let index = Arc::new(FixedIndex::new(vec![candidate("a", vec![1.0, 0.0])]));
    let engine = SimilarityEngine::new(index.clone());

    let result = engine
        .query(&SimilarityQuery::new(vec![1.0, 0.0, 0.0], OWNER, MODEL))
        .await;

    assert!(matches!(result, Err(RecallError::InvalidQuery(_))));
    assert_eq!(index.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalid_parameters_are_rejected() {
    let engine = engine_with(vec![record("a", with_similarity(0.9))]).await;

    for bad in [
        query().threshold(1.5),
        query().threshold(-0.1),
        query().limit(Some(0)),
        query().candidate_cap(0),
    ] {
        let result = engine.query(&bad).await;
        assert!(
            matches!(result, Err(RecallError::InvalidQuery(_))),
            "expected InvalidQuery for {:?}",
            bad
        );
    }
}

#[tokio::test]
async fn results_respect_bounds_order_and_threshold() {
    let dimension = 4;
    let index = MemoryIndex::new(dimension);
    let records: Vec<EmbeddingRecord> = scattered_vectors(200, dimension)
        .into_iter()
        .enumerate()
        .map(|(i, v)| EmbeddingRecord::new(format!("r{i}"), OWNER, MODEL, "message", v))
        .collect();
    index.upsert_batch(records).await.expect("should insert");
    let engine = SimilarityEngine::new(Arc::new(index));

    for threshold in [0.0, 0.5, 0.8, 0.95, 1.0] {
        for limit in [None, Some(1), Some(7), Some(500)] {
            for cap in [1, 10, 100, 1000] {
                let q = SimilarityQuery::new(vec![1.0, 0.0, 0.0, 0.0], OWNER, MODEL)
                    .threshold(threshold)
                    .limit(limit)
                    .candidate_cap(cap);
                let results = engine.query(&q).await.expect("query should succeed");

                assert!(results.len() <= q.max_results());
                for m in &results {
                    assert!((0.0..=1.0).contains(&m.similarity));
                    assert!(m.similarity >= threshold);
                }
                for pair in results.windows(2) {
                    assert!(pair[0].similarity >= pair[1].similarity);
                }
            }
        }
    }
}

#[tokio::test]
async fn partitions_are_isolated() {
    let index = MemoryIndex::new(2);
    let vector = with_similarity(0.99);
    index
        .upsert_batch(vec![
            EmbeddingRecord::new("mine", OWNER, MODEL, "message", vector.clone()),
            EmbeddingRecord::new("other-owner", "owner-b", MODEL, "message", vector.clone()),
            EmbeddingRecord::new("other-model", OWNER, "miniLM", "message", vector.clone()),
            EmbeddingRecord::new("other-kind", OWNER, MODEL, "fact", vector),
        ])
        .await
        .expect("should insert");
    let engine = SimilarityEngine::new(Arc::new(index));

    let results = engine
        .query(&query().threshold(0.0))
        .await
        .expect("query should succeed");
    let ids: Vec<&str> = results.iter().map(|m| m.ref_id.as_str()).collect();
    assert_eq!(ids, vec!["mine"]);

    let facts = engine
        .query(&query().kind("fact").threshold(0.0))
        .await
        .expect("query should succeed");
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].ref_id, "other-kind");
    assert_eq!(facts[0].kind, "fact");
}

#[tokio::test]
async fn candidate_cap_bounds_recall_without_dropping_survivors() {
    // Twenty matches above the threshold, ordered by similarity
    let similarities: Vec<f32> = (0..20).map(|i| 0.99 - i as f32 * 0.01).collect();
    let records = similarities
        .iter()
        .enumerate()
        .map(|(i, &s)| record(&format!("m{i:02}"), with_similarity(s)))
        .collect();
    let engine = engine_with(records).await;

    let results = engine
        .query(&query().threshold(0.7).candidate_cap(5))
        .await
        .expect("query should succeed");

    // Fewer than the 20 true matches is tolerated...
    assert_eq!(results.len(), 5);
    // ...but every match inside the candidate prefix survives, in order
    let ids: Vec<&str> = results.iter().map(|m| m.ref_id.as_str()).collect();
    assert_eq!(ids, vec!["m00", "m01", "m02", "m03", "m04"]);
}

#[tokio::test]
async fn cap_below_limit_is_honoured() {
    let records = (0..10)
        .map(|i| record(&format!("m{i}"), with_similarity(0.9)))
        .collect();
    let engine = engine_with(records).await;

    let results = engine
        .query(&query().limit(Some(8)).candidate_cap(3))
        .await
        .expect("cap below limit is not an error");
    assert_eq!(results.len(), 3);
}

#[tokio::test]
async fn corrupt_stored_vector_is_reported() {
    let index = FixedIndex::new(vec![
        candidate("ok", vec![1.0, 0.0]),
        candidate("broken", vec![1.0, 0.0, 0.0]),
    ]);
    let engine = SimilarityEngine::new(Arc::new(index));

    let result = engine.query(&query()).await;
    assert!(matches!(
        result,
        Err(RecallError::CorruptEmbedding {
            ref_id,
            expected: 2,
            actual: 3,
        }) if ref_id == "broken"
    ));
}

#[tokio::test]
async fn unordered_or_oversized_candidate_lists_are_normalised() {
    let index = FixedIndex::new(vec![
        candidate("low", with_similarity(0.75)),
        candidate("high", with_similarity(0.98)),
        candidate("mid", with_similarity(0.85)),
        candidate("beyond-cap", with_similarity(0.99)),
    ]);
    let engine = SimilarityEngine::new(Arc::new(index));

    let results = engine
        .query(&query().candidate_cap(3))
        .await
        .expect("query should succeed");

    let ids: Vec<&str> = results.iter().map(|m| m.ref_id.as_str()).collect();
    assert_eq!(ids, vec!["high", "mid", "low"]);
}

#[tokio::test]
async fn foreign_kind_candidates_are_skipped() {
    let mut stray = candidate("stray", with_similarity(0.99));
    stray.kind = "fact".to_string();
    let index = FixedIndex::new(vec![stray, candidate("own", with_similarity(0.9))]);
    let engine = SimilarityEngine::new(Arc::new(index));

    let results = engine.query(&query()).await.expect("query should succeed");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].ref_id, "own");
}

#[tokio::test]
async fn anti_correlated_vectors_clamp_to_zero() {
    let engine = engine_with(vec![record("opposite", vec![-1.0, 0.0])]).await;

    let results = engine
        .query(&query().threshold(0.0))
        .await
        .expect("query should succeed");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].similarity, 0.0);
}

#[tokio::test]
async fn ties_prefer_newer_records() {
    let base = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp");
    let mut older = record("older", vec![1.0, 0.0]);
    older.created_at = base;
    let mut newer = record("newer", vec![2.0, 0.0]);
    newer.created_at = base + Duration::days(1);

    let engine = engine_with(vec![older, newer]).await;
    let results = engine.query(&query()).await.expect("query should succeed");

    let ids: Vec<&str> = results.iter().map(|m| m.ref_id.as_str()).collect();
    assert_eq!(ids, vec!["newer", "older"]);
}

#[tokio::test]
async fn concurrent_queries_agree() {
    let records = (0..50)
        .map(|i| record(&format!("m{i}"), with_similarity(0.5 + i as f32 * 0.01)))
        .collect();
    let engine = engine_with(records).await;
    let expected = engine.query(&query()).await.expect("query should succeed");

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.query(&query()).await })
        })
        .collect();

    for handle in handles {
        let results = handle
            .await
            .expect("task should not panic")
            .expect("query should succeed");
        assert_eq!(results, expected);
    }
}

#[test]
fn summary_of_matches() {
    let now = Utc::now();
    let matches: Vec<SimilarityMatch> = [0.9, 0.8, 0.7]
        .into_iter()
        .enumerate()
        .map(|(i, similarity)| SimilarityMatch {
            ref_id: format!("m{i}"),
            similarity,
            kind: "message".to_string(),
            created_at: now,
        })
        .collect();

    let summary = summarize(&matches).expect("non-empty summary");
    assert_eq!(summary.count, 3);
    assert!((summary.mean - 0.8).abs() < 1e-6);
    assert!((summary.max - 0.9).abs() < f32::EPSILON);
    assert!((summary.min - 0.7).abs() < f32::EPSILON);

    assert!(summarize(&[]).is_none());
}

#[tokio::test]
async fn dimension_comes_from_the_index() {
    let engine = SimilarityEngine::new(Arc::new(MemoryIndex::new(3)));

    let narrow = engine.query(&query()).await;
    assert!(matches!(narrow, Err(RecallError::InvalidQuery(_))));

    let matches = engine
        .query(&SimilarityQuery::new(vec![1.0, 0.0, 0.0], OWNER, MODEL))
        .await
        .expect("should query");
    assert!(matches.is_empty());
}
