#![forbid(unsafe_code)]

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::report::CostReport;
use sprout_core::backoff::RetryPolicy;
use sprout_core::pricing::PricingTable;
use sprout_core::routing::{Recommendation, RoutingTable};
use sprout_core::state::{ChunkState, ReviewDecision};
use sprout_core::tier::ModelTier;
use sprout_storage::{
    ChunkRow, ExportChunksRequest, LedgerStats, ListPendingRequest, ListScheduledRequest,
    MarkReviewedRequest, RecordFailureRequest, RetryRecordRow, RoutingRuleRow,
    ScheduleTaskRequest, ScheduledTaskRow, SqliteStore, SubmitChunkRequest,
};
use tracing::{debug, info};

/// Content to be entered into the ledger. The external model call already
/// happened; this is only what the caller reports about it.
#[derive(Clone, Debug, PartialEq)]
pub struct NewChunk {
    pub project: String,
    pub task_type: String,
    pub content: String,
    pub produced_by: String,
    pub sources: Vec<String>,
    pub confidence: f64,
    pub tokens_used: i64,
}

/// One reviewer verdict for `mark_reviewed`.
#[derive(Clone, Debug, PartialEq)]
pub struct Review {
    pub id: String,
    pub decision: ReviewDecision,
    pub reviewed_by: String,
    pub expected_state: Option<ChunkState>,
    pub new_confidence: Option<f64>,
    pub tokens_used: Option<i64>,
}

/// When a scheduled task should fire: an absolute epoch-ms instant or a
/// delay from now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleAt {
    At(i64),
    After(i64),
}

/// The pipeline core. Owns the durable store plus the in-memory routing and
/// pricing tables; every method is one small transaction against the store.
/// Concurrency across processes is the store's problem (and the
/// `expected_state` compare on reviews); within a process, writes take
/// `&mut self`.
pub struct Engine {
    store: SqliteStore,
    routing: RoutingTable,
    pricing: PricingTable,
    policy: RetryPolicy,
}

impl Engine {
    /// Opens the store and assembles the routing/pricing tables: built-in
    /// defaults, then overrides persisted by earlier `configure_routing`
    /// calls, then the config file's maps (configuration wins on collision).
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let store = SqliteStore::open(&config.storage_dir)?;

        let mut routing = RoutingTable::with_defaults();
        routing.set_default_tier(config.default_tier.clone());
        for row in store.routing_rules_list()? {
            routing.upsert(row.task_type, row.tier, row.reason);
        }
        for (task_type, rule) in &config.routing {
            let tier = ModelTier::try_new(&rule.tier).map_err(|_| EngineError::InvalidTier {
                value: rule.tier.clone(),
            })?;
            routing.upsert(task_type.clone(), tier, rule.reason.clone());
        }
        for (tier, model_id) in &config.models {
            let tier = ModelTier::try_new(tier).map_err(|_| EngineError::InvalidTier {
                value: tier.clone(),
            })?;
            routing.register_model(tier, model_id.clone());
        }

        let mut pricing = PricingTable::with_defaults();
        pricing.set_fallback(config.fallback_rate_per_mtok);
        for (model, rate) in &config.pricing {
            pricing.set_rate(model.clone(), *rate);
        }

        info!(storage_dir = %config.storage_dir.display(), "sprout engine opened");

        Ok(Self {
            store,
            routing,
            pricing,
            policy: config.policy,
        })
    }

    // --- Routing ---

    /// Total: any task type resolves to a tier, unknown ones to the default.
    pub fn recommend(&self, task_type: &str) -> Recommendation {
        let rec = self.routing.recommend(task_type);
        debug!(task_type, tier = %rec.tier, model = %rec.model_id, "routing recommendation");
        rec
    }

    /// Upserts a routing rule at runtime: persisted, then swapped into the
    /// in-memory table, so readers see the old rule or the new one, never a
    /// partial update.
    pub fn configure_routing(
        &mut self,
        task_type: &str,
        tier: &str,
        reason: &str,
    ) -> Result<RoutingRuleRow, EngineError> {
        let tier = ModelTier::try_new(tier).map_err(|_| EngineError::InvalidTier {
            value: tier.to_string(),
        })?;
        let row = self
            .store
            .routing_rule_upsert(task_type, &tier, reason, now_ms())?;
        self.routing
            .upsert(row.task_type.clone(), row.tier.clone(), row.reason.clone());
        info!(task_type = %row.task_type, tier = %row.tier, "routing rule configured");
        Ok(row)
    }

    // --- Chunk ledger ---

    pub fn submit_chunk(&mut self, chunk: NewChunk) -> Result<ChunkRow, EngineError> {
        let row = self.store.submit_chunk(SubmitChunkRequest {
            project: chunk.project,
            task_type: chunk.task_type,
            content: chunk.content,
            produced_by: chunk.produced_by,
            sources: chunk.sources,
            confidence: chunk.confidence,
            tokens_used: chunk.tokens_used,
            now_ms: now_ms(),
        })?;
        info!(
            chunk = %row.id,
            project = %row.project,
            produced_by = %row.produced_by,
            "chunk submitted"
        );
        Ok(row)
    }

    pub fn mark_reviewed(&mut self, review: Review) -> Result<ChunkRow, EngineError> {
        let row = self.store.mark_reviewed(MarkReviewedRequest {
            id: review.id,
            decision: review.decision,
            reviewed_by: review.reviewed_by,
            expected_state: review.expected_state,
            new_confidence: review.new_confidence,
            tokens_used: review.tokens_used,
            now_ms: now_ms(),
        })?;
        info!(
            chunk = %row.id,
            state = %row.state,
            decision = review.decision.as_str(),
            "chunk reviewed"
        );
        Ok(row)
    }

    pub fn get_chunk(&self, id: &str) -> Result<Option<ChunkRow>, EngineError> {
        Ok(self.store.get_chunk(id)?)
    }

    pub fn list_pending(&self, request: ListPendingRequest) -> Result<Vec<ChunkRow>, EngineError> {
        Ok(self.store.list_pending(request)?)
    }

    pub fn ledger_stats(&self, project: Option<&str>) -> Result<LedgerStats, EngineError> {
        Ok(self.store.ledger_stats(project)?)
    }

    /// Chunks that survived review up to at least `min_state`, for handing
    /// off to downstream consumers. Rendering is the caller's business.
    pub fn export_chunks(
        &self,
        project: Option<&str>,
        min_state: ChunkState,
    ) -> Result<Vec<ChunkRow>, EngineError> {
        Ok(self.store.export_chunks(ExportChunksRequest {
            project: project.map(str::to_string),
            min_state,
            ..ExportChunksRequest::default()
        })?)
    }

    // --- Cost accounting ---

    pub fn cost_report(&self, since_ms: Option<i64>) -> Result<CostReport, EngineError> {
        let usage = self.store.token_usage_by_model(since_ms)?;
        Ok(CostReport::build(usage, &self.pricing))
    }

    // --- Retry tracker ---

    pub fn record_failure(
        &mut self,
        task_key: &str,
        error: &str,
    ) -> Result<RetryRecordRow, EngineError> {
        let record = self.store.record_failure(RecordFailureRequest {
            task_key: task_key.to_string(),
            error: error.to_string(),
            policy: self.policy,
            now_ms: now_ms(),
        })?;
        debug!(
            task_key = %record.task_key,
            attempt = record.attempt_count,
            exhausted = record.exhausted,
            "failure recorded"
        );
        Ok(record)
    }

    pub fn record_success(&mut self, task_key: &str) -> Result<(), EngineError> {
        self.store.record_success(task_key)?;
        Ok(())
    }

    pub fn retry_state(&self, task_key: &str) -> Result<Option<RetryRecordRow>, EngineError> {
        Ok(self.store.get_retry(task_key)?)
    }

    // --- Scheduler ---

    pub fn schedule_task(
        &mut self,
        when: ScheduleAt,
        payload: &serde_json::Value,
    ) -> Result<ScheduledTaskRow, EngineError> {
        let (fire_at_ms, delay_ms) = match when {
            ScheduleAt::At(at) => (Some(at), None),
            ScheduleAt::After(delay) => (None, Some(delay)),
        };
        let row = self.store.schedule_task(ScheduleTaskRequest {
            fire_at_ms,
            delay_ms,
            payload_json: payload.to_string(),
            now_ms: now_ms(),
        })?;
        info!(task = %row.id, fire_at_ms = row.fire_at_ms, "task scheduled");
        Ok(row)
    }

    pub fn list_scheduled(
        &self,
        include_finished: bool,
    ) -> Result<Vec<ScheduledTaskRow>, EngineError> {
        Ok(self.store.list_scheduled(ListScheduledRequest {
            include_finished,
            ..ListScheduledRequest::live(now_ms())
        })?)
    }

    pub fn mark_fired(&mut self, id: &str) -> Result<ScheduledTaskRow, EngineError> {
        let row = self.store.mark_fired(id, now_ms())?;
        info!(task = %row.id, "task fired");
        Ok(row)
    }

    pub fn cancel_scheduled(&mut self, id: &str) -> Result<ScheduledTaskRow, EngineError> {
        let row = self.store.cancel_scheduled(id, now_ms())?;
        info!(task = %row.id, "task cancelled");
        Ok(row)
    }
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
