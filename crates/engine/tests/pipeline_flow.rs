#![forbid(unsafe_code)]

use sprout_core::state::{ChunkState, ReviewDecision};
use sprout_core::tier::ModelTier;
use sprout_engine::{Engine, EngineConfig, EngineError, NewChunk, Review, ScheduleAt};
use sprout_storage::{ListPendingRequest, StoreError};
use std::path::PathBuf;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("sprout_engine_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn config(storage_dir: PathBuf) -> EngineConfig {
    EngineConfig {
        storage_dir,
        ..EngineConfig::default()
    }
}

fn chunk(task_type: &str, model: &str, tokens: i64) -> NewChunk {
    NewChunk {
        project: "almanac".to_string(),
        task_type: task_type.to_string(),
        content: "Draft paragraph for review.".to_string(),
        produced_by: model.to_string(),
        sources: vec!["https://example.org/entry".to_string()],
        confidence: 0.5,
        tokens_used: tokens,
    }
}

fn promote(id: &str, reviewer: &str) -> Review {
    Review {
        id: id.to_string(),
        decision: ReviewDecision::Promote,
        reviewed_by: reviewer.to_string(),
        expected_state: None,
        new_confidence: None,
        tokens_used: None,
    }
}

#[test]
fn unknown_task_types_route_to_the_cheap_default() {
    let engine = Engine::open(config(temp_dir("default_route"))).expect("open engine");

    let rec = engine.recommend("summarization");
    assert_eq!(rec.tier, ModelTier::haiku());
    assert_eq!(rec.model_id, "haiku-4.5");

    let rec = engine.recommend("theological_analysis");
    assert_eq!(rec.tier, ModelTier::opus());
    assert_eq!(rec.model_id, "opus-4.6");
}

#[test]
fn configured_routing_overrides_survive_reopen() {
    let storage_dir = temp_dir("routing_persist");

    {
        let mut engine = Engine::open(config(storage_dir.clone())).expect("open engine");
        let row = engine
            .configure_routing("code_review", "sonnet", "needs judgement, not just recall")
            .expect("configure routing");
        assert_eq!(row.tier, ModelTier::sonnet());

        let rec = engine.recommend("code_review");
        assert_eq!(rec.tier, ModelTier::sonnet());
        assert_eq!(rec.reason, "needs judgement, not just recall");
    }

    let engine = Engine::open(config(storage_dir)).expect("reopen engine");
    let rec = engine.recommend("code_review");
    assert_eq!(rec.tier, ModelTier::sonnet());
    assert_eq!(rec.model_id, "sonnet-4.6");
}

#[test]
fn invalid_tier_names_are_rejected() {
    let mut engine = Engine::open(config(temp_dir("bad_tier"))).expect("open engine");
    let err = engine
        .configure_routing("code_review", "not a tier!", "oops")
        .expect_err("invalid tier");
    match err {
        EngineError::InvalidTier { value } => assert_eq!(value, "not a tier!"),
        other => panic!("expected InvalidTier, got {other:?}"),
    }
}

#[test]
fn a_chunk_walks_the_full_review_pipeline() {
    let mut engine = Engine::open(config(temp_dir("full_pipeline"))).expect("open engine");

    let rec = engine.recommend("document_synopsis");
    let seed = engine
        .submit_chunk(chunk("document_synopsis", &rec.model_id, 120))
        .expect("submit chunk");
    assert_eq!(seed.state, ChunkState::Seed);

    let queue = engine
        .list_pending(ListPendingRequest::default())
        .expect("list pending");
    assert_eq!(queue.len(), 1);

    let watered = engine
        .mark_reviewed(promote(&seed.id, "sonnet-4.6"))
        .expect("first review");
    assert_eq!(watered.state, ChunkState::Watered);

    let sprouted = engine
        .mark_reviewed(promote(&seed.id, "opus-4.6"))
        .expect("second review");
    assert_eq!(sprouted.state, ChunkState::Sprouted);

    let err = engine
        .mark_reviewed(promote(&seed.id, "opus-4.6"))
        .expect_err("no promotion past sprouted");
    assert!(matches!(
        err,
        EngineError::Store(StoreError::InvalidTransition { .. })
    ));

    let queue = engine
        .list_pending(ListPendingRequest::default())
        .expect("list pending after");
    assert!(queue.is_empty());

    let stats = engine.ledger_stats(Some("almanac")).expect("stats");
    assert_eq!(stats.total, 1);
    assert_eq!(stats.by_state.get("sprouted"), Some(&1));

    // The verified chunk is ready for handoff.
    let exported = engine
        .export_chunks(Some("almanac"), ChunkState::Sprouted)
        .expect("export");
    assert_eq!(exported.len(), 1);
    assert_eq!(exported[0].id, seed.id);
}

#[test]
fn cost_report_reflects_recorded_usage() {
    let mut engine = Engine::open(config(temp_dir("cost_report"))).expect("open engine");

    engine
        .submit_chunk(chunk("json_validation", "haiku-4.5", 1_000_000))
        .expect("submit haiku chunk");
    engine
        .submit_chunk(chunk("theological_analysis", "opus-4.6", 100_000))
        .expect("submit opus chunk");
    engine
        .submit_chunk(chunk("json_validation", "mystery-1", 2_000_000))
        .expect("submit unpriced chunk");

    let report = engine.cost_report(None).expect("cost report");
    assert_eq!(report.entries.len(), 3);

    let haiku = &report.entries[0];
    assert_eq!(haiku.model, "haiku-4.5");
    assert_eq!(haiku.cost_usd, 5.0);
    assert!(!haiku.fallback_rate);

    let mystery = report
        .entries
        .iter()
        .find(|e| e.model == "mystery-1")
        .expect("mystery entry");
    assert!(mystery.fallback_rate);
    assert_eq!(mystery.cost_usd, 10.0);

    assert_eq!(
        report.total_usd,
        report.entries.iter().map(|e| e.cost_usd).sum::<f64>()
    );
}

#[test]
fn retry_tracking_uses_the_configured_policy() {
    let mut cfg = config(temp_dir("retry_policy"));
    cfg.policy.max_attempts = 2;
    let mut engine = Engine::open(cfg).expect("open engine");

    let first = engine
        .record_failure("submit_chunk:almanac", "model service timed out")
        .expect("first failure");
    assert_eq!(first.attempt_count, 1);
    assert!(!first.exhausted);
    assert!(
        engine
            .retry_state("submit_chunk:almanac")
            .expect("retry state")
            .is_some()
    );

    let second = engine
        .record_failure("submit_chunk:almanac", "model service timed out")
        .expect("second failure");
    assert!(second.exhausted);
    assert_eq!(
        engine
            .retry_state("submit_chunk:almanac")
            .expect("retry state"),
        None
    );

    engine
        .record_failure("other", "boom")
        .expect("unrelated failure");
    engine.record_success("other").expect("success clears");
    assert_eq!(engine.retry_state("other").expect("retry state"), None);
}

#[test]
fn scheduling_round_trips_through_the_engine() {
    let mut engine = Engine::open(config(temp_dir("scheduling"))).expect("open engine");
    let payload = serde_json::json!({ "kind": "digest", "project": "almanac" });

    let task = engine
        .schedule_task(ScheduleAt::After(60_000), &payload)
        .expect("schedule");
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&task.payload_json).expect("payload parses"),
        payload
    );

    let live = engine.list_scheduled(false).expect("list live");
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, task.id);

    let cancelled = engine.cancel_scheduled(&task.id).expect("cancel");
    assert_eq!(
        cancelled.status,
        sprout_core::schedule::ScheduleStatus::Cancelled
    );
    assert!(engine.list_scheduled(false).expect("list live").is_empty());
    assert_eq!(engine.list_scheduled(true).expect("list all").len(), 1);
}
