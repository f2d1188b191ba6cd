#![forbid(unsafe_code)]

use sprout_core::state::{ChunkState, ReviewDecision};
use sprout_storage::{MarkReviewedRequest, SqliteStore, SubmitChunkRequest};
use std::path::PathBuf;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("sprout_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn submit(model: &str, tokens: i64, now_ms: i64) -> SubmitChunkRequest {
    SubmitChunkRequest {
        project: "usage".to_string(),
        task_type: "json_validation".to_string(),
        content: "{}".to_string(),
        produced_by: model.to_string(),
        sources: Vec::new(),
        confidence: 0.5,
        tokens_used: tokens,
        now_ms,
    }
}

fn review(id: &str, model: &str, tokens: i64, now_ms: i64) -> MarkReviewedRequest {
    MarkReviewedRequest {
        id: id.to_string(),
        decision: ReviewDecision::Promote,
        reviewed_by: model.to_string(),
        expected_state: None,
        new_confidence: None,
        tokens_used: Some(tokens),
        now_ms,
    }
}

#[test]
fn usage_attributes_tokens_to_the_model_that_spent_them() {
    let mut store = SqliteStore::open(temp_dir("attribution")).expect("open store");

    let a = store.submit_chunk(submit("haiku-4.5", 100, 1_000)).expect("submit");
    let b = store.submit_chunk(submit("haiku-4.5", 50, 2_000)).expect("submit");
    store.submit_chunk(submit("opus-4.6", 700, 3_000)).expect("submit");

    // Review spend lands on the reviewer's model, not the producer's.
    let watered = store
        .mark_reviewed(review(&a.id, "sonnet-4.6", 40, 4_000))
        .expect("review a");
    assert_eq!(watered.state, ChunkState::Watered);
    store
        .mark_reviewed(review(&b.id, "sonnet-4.6", 60, 5_000))
        .expect("review b");

    let usage = store.token_usage_by_model(None).expect("usage");
    let summary: Vec<(&str, i64, i64)> = usage
        .iter()
        .map(|u| (u.model.as_str(), u.tokens, u.chunks))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("haiku-4.5", 150, 2),
            ("opus-4.6", 700, 1),
            ("sonnet-4.6", 100, 2),
        ]
    );
}

#[test]
fn since_filter_is_strictly_after() {
    let mut store = SqliteStore::open(temp_dir("since_filter")).expect("open store");
    store.submit_chunk(submit("haiku-4.5", 100, 1_000)).expect("submit");
    store.submit_chunk(submit("haiku-4.5", 30, 2_000)).expect("submit");

    let recent = store.token_usage_by_model(Some(1_000)).expect("usage");
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].tokens, 30);
    assert_eq!(recent[0].chunks, 1);

    let none = store.token_usage_by_model(Some(2_000)).expect("usage");
    assert!(none.is_empty());
}

#[test]
fn zero_token_submissions_leave_no_usage_rows() {
    let mut store = SqliteStore::open(temp_dir("zero_tokens")).expect("open store");
    store.submit_chunk(submit("haiku-4.5", 0, 1_000)).expect("submit");

    let usage = store.token_usage_by_model(None).expect("usage");
    assert!(usage.is_empty());
}

#[test]
fn repeated_reviews_of_one_chunk_count_it_once_per_model() {
    let mut store = SqliteStore::open(temp_dir("distinct_chunks")).expect("open store");
    let chunk = store.submit_chunk(submit("haiku-4.5", 10, 1_000)).expect("submit");

    store
        .mark_reviewed(review(&chunk.id, "sonnet-4.6", 20, 2_000))
        .expect("first review");
    store
        .mark_reviewed(review(&chunk.id, "sonnet-4.6", 30, 3_000))
        .expect("second review");

    let usage = store.token_usage_by_model(None).expect("usage");
    let sonnet = usage
        .iter()
        .find(|u| u.model == "sonnet-4.6")
        .expect("sonnet row");
    assert_eq!(sonnet.tokens, 50);
    assert_eq!(sonnet.chunks, 1);
}
