#![forbid(unsafe_code)]

use sprout_core::backoff::RetryPolicy;
use sprout_core::state::{ChunkState, ReviewDecision};

#[derive(Clone, Debug, PartialEq)]
pub struct SubmitChunkRequest {
    pub project: String,
    pub task_type: String,
    pub content: String,
    pub produced_by: String,
    pub sources: Vec<String>,
    pub confidence: f64,
    pub tokens_used: i64,
    pub now_ms: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MarkReviewedRequest {
    pub id: String,
    pub decision: ReviewDecision,
    pub reviewed_by: String,
    /// State the reviewer last observed. When set, the transition only
    /// commits if the stored state still matches; a mismatch means another
    /// reviewer got there first and the caller should re-read and retry.
    pub expected_state: Option<ChunkState>,
    pub new_confidence: Option<f64>,
    /// Additional output tokens billed for this review step; accumulates
    /// onto the chunk total.
    pub tokens_used: Option<i64>,
    pub now_ms: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListPendingRequest {
    pub project: Option<String>,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
    /// Explicit state filter; `None` means the pending default
    /// (`seed` and `watered`).
    pub states: Option<Vec<ChunkState>>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for ListPendingRequest {
    fn default() -> Self {
        Self {
            project: None,
            min_confidence: None,
            max_confidence: None,
            states: None,
            limit: 50,
            offset: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExportChunksRequest {
    pub project: Option<String>,
    /// Lowest promotion stage to include; everything at or above it is
    /// exported. `rejected` chunks never export.
    pub min_state: ChunkState,
    pub limit: usize,
    pub offset: usize,
}

impl Default for ExportChunksRequest {
    fn default() -> Self {
        Self {
            project: None,
            min_state: ChunkState::Watered,
            limit: 200,
            offset: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordFailureRequest {
    pub task_key: String,
    pub error: String,
    pub policy: RetryPolicy,
    pub now_ms: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleTaskRequest {
    /// Absolute fire time; exactly one of `fire_at_ms` / `delay_ms` must be
    /// set. A relative delay is normalized to `now_ms + delay_ms`.
    pub fire_at_ms: Option<i64>,
    pub delay_ms: Option<i64>,
    pub payload_json: String,
    pub now_ms: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListScheduledRequest {
    /// Include `fired` and `cancelled` rows; by default only live
    /// (`pending`/`due`) tasks are returned.
    pub include_finished: bool,
    pub now_ms: i64,
    pub limit: usize,
    pub offset: usize,
}

impl ListScheduledRequest {
    pub fn live(now_ms: i64) -> Self {
        Self {
            include_finished: false,
            now_ms,
            limit: 200,
            offset: 0,
        }
    }
}
