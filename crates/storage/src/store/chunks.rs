#![forbid(unsafe_code)]

use super::*;
use sprout_core::state::{ChunkState, ReviewDecision};
use rusqlite::{Row, params_from_iter, types::Value as SqlValue};
use std::collections::BTreeMap;

const MAX_PROJECT_LEN: usize = 128;
const MAX_TASK_TYPE_LEN: usize = 64;
const MAX_CONTENT_LEN: usize = 512_000;
const MAX_MODEL_ID_LEN: usize = 128;
const MAX_SOURCES: usize = 64;
const MAX_SOURCE_ITEM_LEN: usize = 512;

/// One ledger row. `tokens_used` is the running total across production and
/// every review step; the per-model split lives in the token_usage ledger.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkRow {
    pub id: String,
    pub project: String,
    pub task_type: String,
    pub content: String,
    pub state: ChunkState,
    pub produced_by: String,
    pub reviewed_by: Option<String>,
    pub confidence: f64,
    pub sources: Vec<String>,
    pub tokens_used: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub total: i64,
    pub by_state: BTreeMap<String, i64>,
    pub by_project: BTreeMap<String, i64>,
    pub by_task_type: BTreeMap<String, i64>,
}

impl SqliteStore {
    pub fn submit_chunk(&mut self, request: SubmitChunkRequest) -> Result<ChunkRow, StoreError> {
        let project = normalize_project(&request.project)?;
        let task_type = normalize_task_type(&request.task_type)?;
        let content = normalize_content(&request.content)?;
        let produced_by = normalize_model_id(&request.produced_by)?;
        let sources = normalize_sources(request.sources)?;
        let confidence = check_confidence(request.confidence)?;
        let tokens_used = check_tokens(request.tokens_used)?;
        let now_ms = request.now_ms;

        let sources_json = serde_json::to_string(&sources)
            .map_err(|_| StoreError::InvalidInput("chunk.sources failed to encode"))?;

        let tx = self.conn_mut().transaction()?;
        let seq = next_counter_tx(&tx, "chunk_seq")?;
        let id = format!("CHK-{seq:06}");

        let insert = tx.execute(
            r#"
            INSERT INTO chunks(
              id, project, task_type, content, state, produced_by, reviewed_by,
              confidence, sources, tokens_used, created_at_ms, updated_at_ms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                id.as_str(),
                project,
                task_type,
                content,
                ChunkState::Seed.as_str(),
                produced_by,
                Option::<String>::None,
                confidence,
                sources_json,
                tokens_used,
                now_ms,
                now_ms,
            ],
        );
        if let Err(err) = insert {
            if is_constraint_violation(&err) {
                return Err(StoreError::InvalidInput("chunk id collision"));
            }
            return Err(StoreError::Sql(err));
        }

        if tokens_used > 0 {
            usage::insert_usage_tx(&tx, &id, &produced_by, tokens_used, now_ms)?;
        }

        tx.commit()?;

        Ok(ChunkRow {
            id,
            project,
            task_type,
            content,
            state: ChunkState::Seed,
            produced_by,
            reviewed_by: None,
            confidence,
            sources,
            tokens_used,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        })
    }

    /// Applies one reviewer verdict as a single transaction. Promotion moves
    /// the state machine exactly one step; rejection ends the chunk from any
    /// live state and is an idempotent no-op on an already-rejected row. The
    /// optional `expected_state` compare is what keeps two racing reviewers
    /// from both advancing past the same step.
    pub fn mark_reviewed(&mut self, request: MarkReviewedRequest) -> Result<ChunkRow, StoreError> {
        let id = normalize_chunk_id(&request.id)?;
        let reviewed_by = normalize_model_id(&request.reviewed_by)?;
        let new_confidence = request.new_confidence.map(check_confidence).transpose()?;
        let tokens_delta = request.tokens_used.map(check_tokens).transpose()?.unwrap_or(0);
        let now_ms = request.now_ms;

        let tx = self.conn_mut().transaction()?;

        let Some(current) = chunk_row_tx(&tx, &id)? else {
            return Err(StoreError::UnknownChunk { id });
        };

        if request.decision == ReviewDecision::Reject && current.state == ChunkState::Rejected {
            tx.commit()?;
            return Ok(current);
        }

        if let Some(expected) = request.expected_state
            && expected != current.state
        {
            return Err(StoreError::StaleState {
                id,
                expected,
                actual: current.state,
            });
        }

        let next_state = match request.decision {
            ReviewDecision::Promote => {
                current.state.promoted().ok_or(StoreError::InvalidTransition {
                    id: id.clone(),
                    state: current.state,
                })?
            }
            ReviewDecision::Reject => ChunkState::Rejected,
        };

        let confidence = new_confidence.unwrap_or(current.confidence);
        let tokens_used = current.tokens_used.saturating_add(tokens_delta);

        tx.execute(
            r#"
            UPDATE chunks
            SET state=?2, reviewed_by=?3, confidence=?4, tokens_used=?5, updated_at_ms=?6
            WHERE id=?1
            "#,
            params![
                id.as_str(),
                next_state.as_str(),
                reviewed_by,
                confidence,
                tokens_used,
                now_ms,
            ],
        )?;

        if tokens_delta > 0 {
            usage::insert_usage_tx(&tx, &id, &reviewed_by, tokens_delta, now_ms)?;
        }

        tx.commit()?;

        Ok(ChunkRow {
            state: next_state,
            reviewed_by: Some(reviewed_by),
            confidence,
            tokens_used,
            updated_at_ms: now_ms,
            ..current
        })
    }

    pub fn get_chunk(&self, id: &str) -> Result<Option<ChunkRow>, StoreError> {
        let id = normalize_chunk_id(id)?;
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id=?1"),
                params![id],
                read_chunk_row,
            )
            .optional()?;
        row.map(decode_chunk_row).transpose()
    }

    /// Review queue: oldest chunks first so reviewers drain the backlog in
    /// FIFO order. The default state filter keeps only rows that still need
    /// a reviewing action.
    pub fn list_pending(&self, request: ListPendingRequest) -> Result<Vec<ChunkRow>, StoreError> {
        let states = match &request.states {
            Some(states) if states.is_empty() => {
                return Err(StoreError::InvalidInput("state filter must not be empty"));
            }
            Some(states) => states.clone(),
            None => vec![ChunkState::Seed, ChunkState::Watered],
        };

        if let Some(min) = request.min_confidence {
            check_confidence(min)?;
        }
        if let Some(max) = request.max_confidence {
            check_confidence(max)?;
        }

        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<SqlValue> = Vec::new();

        let placeholders = (1..=states.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        clauses.push(format!("state IN ({placeholders})"));
        for state in &states {
            args.push(SqlValue::Text(state.as_str().to_string()));
        }

        if let Some(project) = &request.project {
            args.push(SqlValue::Text(normalize_project(project)?));
            clauses.push(format!("project = ?{}", args.len()));
        }
        if let Some(min) = request.min_confidence {
            args.push(SqlValue::Real(min));
            clauses.push(format!("confidence >= ?{}", args.len()));
        }
        if let Some(max) = request.max_confidence {
            args.push(SqlValue::Real(max));
            clauses.push(format!("confidence <= ?{}", args.len()));
        }

        args.push(SqlValue::Integer(to_sqlite_i64(clamp_limit(request.limit))?));
        let limit_pos = args.len();
        args.push(SqlValue::Integer(to_sqlite_i64(request.offset)?));
        let offset_pos = args.len();

        let query = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks WHERE {} \
             ORDER BY created_at_ms ASC, id ASC LIMIT ?{limit_pos} OFFSET ?{offset_pos}",
            clauses.join(" AND "),
        );

        let mut stmt = self.conn().prepare(&query)?;
        let mut rows = stmt.query(params_from_iter(args))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(decode_chunk_row(read_chunk_row(row)?)?);
        }
        Ok(out)
    }

    /// Chunks that reached at least `min_state` on the promotion track,
    /// optionally narrowed to one project. `rejected` rows never export.
    pub fn export_chunks(&self, request: ExportChunksRequest) -> Result<Vec<ChunkRow>, StoreError> {
        let Some(min_stage) = request.min_state.stage() else {
            return Err(StoreError::InvalidInput(
                "export floor must be a live state",
            ));
        };
        let states: Vec<ChunkState> = [ChunkState::Seed, ChunkState::Watered, ChunkState::Sprouted]
            .into_iter()
            .filter(|state| state.stage().is_some_and(|stage| stage >= min_stage))
            .collect();

        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<SqlValue> = Vec::new();

        let placeholders = (1..=states.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        clauses.push(format!("state IN ({placeholders})"));
        for state in &states {
            args.push(SqlValue::Text(state.as_str().to_string()));
        }

        if let Some(project) = &request.project {
            args.push(SqlValue::Text(normalize_project(project)?));
            clauses.push(format!("project = ?{}", args.len()));
        }

        args.push(SqlValue::Integer(to_sqlite_i64(clamp_limit(request.limit))?));
        let limit_pos = args.len();
        args.push(SqlValue::Integer(to_sqlite_i64(request.offset)?));
        let offset_pos = args.len();

        let query = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks WHERE {} \
             ORDER BY created_at_ms ASC, id ASC LIMIT ?{limit_pos} OFFSET ?{offset_pos}",
            clauses.join(" AND "),
        );

        let mut stmt = self.conn().prepare(&query)?;
        let mut rows = stmt.query(params_from_iter(args))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(decode_chunk_row(read_chunk_row(row)?)?);
        }
        Ok(out)
    }

    /// One statement, one snapshot: every bucket counts the same set of
    /// rows, so the totals always agree with each other.
    pub fn ledger_stats(&self, project: Option<&str>) -> Result<LedgerStats, StoreError> {
        let project = project.map(normalize_project).transpose()?;
        let (where_clause, args): (&str, Vec<SqlValue>) = match &project {
            Some(p) => ("WHERE project = ?1", vec![SqlValue::Text(p.clone())]),
            None => ("", Vec::new()),
        };

        let query = format!(
            "SELECT state, project, task_type, COUNT(*) FROM chunks {where_clause} \
             GROUP BY state, project, task_type"
        );

        let mut stats = LedgerStats::default();
        let mut stmt = self.conn().prepare(&query)?;
        let mut rows = stmt.query(params_from_iter(args))?;
        while let Some(row) = rows.next()? {
            let state: String = row.get(0)?;
            let chunk_project: String = row.get(1)?;
            let task_type: String = row.get(2)?;
            let count: i64 = row.get(3)?;
            *stats.by_state.entry(state).or_insert(0) += count;
            *stats.by_project.entry(chunk_project).or_insert(0) += count;
            *stats.by_task_type.entry(task_type).or_insert(0) += count;
            stats.total += count;
        }

        Ok(stats)
    }
}

const CHUNK_COLUMNS: &str = "id, project, task_type, content, state, produced_by, reviewed_by, \
     confidence, sources, tokens_used, created_at_ms, updated_at_ms";

type RawChunkRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    f64,
    String,
    i64,
    i64,
    i64,
);

fn read_chunk_row(row: &Row<'_>) -> rusqlite::Result<RawChunkRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
    ))
}

fn decode_chunk_row(raw: RawChunkRow) -> Result<ChunkRow, StoreError> {
    let (
        id,
        project,
        task_type,
        content,
        state,
        produced_by,
        reviewed_by,
        confidence,
        sources_json,
        tokens_used,
        created_at_ms,
        updated_at_ms,
    ) = raw;

    let state = ChunkState::parse(&state)
        .map_err(|_| StoreError::InvalidInput("invalid chunk state row"))?;
    let sources: Vec<String> = serde_json::from_str(&sources_json)
        .map_err(|_| StoreError::InvalidInput("invalid chunk sources row"))?;

    Ok(ChunkRow {
        id,
        project,
        task_type,
        content,
        state,
        produced_by,
        reviewed_by,
        confidence,
        sources,
        tokens_used,
        created_at_ms,
        updated_at_ms,
    })
}

fn chunk_row_tx(tx: &Transaction<'_>, id: &str) -> Result<Option<ChunkRow>, StoreError> {
    let row = tx
        .query_row(
            &format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id=?1"),
            params![id],
            read_chunk_row,
        )
        .optional()?;
    row.map(decode_chunk_row).transpose()
}

fn normalize_chunk_id(raw: &str) -> Result<String, StoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoreError::InvalidInput("chunk id must not be empty"));
    }
    if !raw.starts_with("CHK-") {
        return Err(StoreError::InvalidInput("chunk id must start with CHK-"));
    }
    let digits = raw.trim_start_matches("CHK-");
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(StoreError::InvalidInput("chunk id digits must be [0-9]"));
    }
    Ok(raw.to_string())
}

fn normalize_project(raw: &str) -> Result<String, StoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoreError::InvalidInput("chunk.project must not be empty"));
    }
    if raw.len() > MAX_PROJECT_LEN {
        return Err(StoreError::InvalidInput("chunk.project is too long"));
    }
    Ok(raw.to_string())
}

fn normalize_task_type(raw: &str) -> Result<String, StoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoreError::InvalidInput("chunk.task_type must not be empty"));
    }
    if raw.len() > MAX_TASK_TYPE_LEN {
        return Err(StoreError::InvalidInput("chunk.task_type is too long"));
    }
    Ok(raw.to_string())
}

fn normalize_content(raw: &str) -> Result<String, StoreError> {
    if raw.trim().is_empty() {
        return Err(StoreError::InvalidInput("chunk.content must not be empty"));
    }
    if raw.len() > MAX_CONTENT_LEN {
        return Err(StoreError::InvalidInput("chunk.content is too long"));
    }
    Ok(raw.to_string())
}

fn normalize_model_id(raw: &str) -> Result<String, StoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoreError::InvalidInput("model identifier must not be empty"));
    }
    if raw.len() > MAX_MODEL_ID_LEN {
        return Err(StoreError::InvalidInput("model identifier is too long"));
    }
    Ok(raw.to_string())
}

fn normalize_sources(sources: Vec<String>) -> Result<Vec<String>, StoreError> {
    if sources.len() > MAX_SOURCES {
        return Err(StoreError::InvalidInput("chunk.sources exceeds max items"));
    }
    let mut out = Vec::with_capacity(sources.len());
    for source in sources {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.len() > MAX_SOURCE_ITEM_LEN {
            return Err(StoreError::InvalidInput("chunk.sources item too long"));
        }
        out.push(trimmed.to_string());
    }
    Ok(out)
}

fn check_confidence(value: f64) -> Result<f64, StoreError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(StoreError::ConfidenceOutOfRange { value });
    }
    Ok(value)
}

fn check_tokens(value: i64) -> Result<i64, StoreError> {
    if value < 0 {
        return Err(StoreError::InvalidInput("tokens_used must be >= 0"));
    }
    Ok(value)
}
