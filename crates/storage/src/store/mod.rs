#![forbid(unsafe_code)]

mod chunks;
mod error;
mod requests;
mod retries;
mod routing_rules;
mod schedule;
mod usage;

pub use chunks::{ChunkRow, LedgerStats};
pub use error::StoreError;
pub use requests::*;
pub use retries::RetryRecordRow;
pub use routing_rules::RoutingRuleRow;
pub use schedule::ScheduledTaskRow;
pub use usage::ModelUsageRow;

use rusqlite::{Connection, ErrorCode, OptionalExtension, Transaction, params};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DB_FILE: &str = "sprout.db";
const SCHEMA_VERSION: i64 = 1;

pub(crate) const MAX_LIST_LIMIT: usize = 200;

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(DB_FILE);
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        preflight_gate(&conn)?;
        install_schema(&conn)?;

        Ok(Self { conn, storage_dir })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let mut rows = stmt.query([])?;
    let mut tables = BTreeSet::new();
    while let Some(row) = rows.next()? {
        tables.insert(row.get::<_, String>(0)?);
    }

    if tables.is_empty() {
        return Ok(());
    }

    let required: BTreeSet<&str> = [
        "store_state",
        "counters",
        "chunks",
        "token_usage",
        "routing_rules",
        "retry_state",
        "scheduled_tasks",
    ]
    .into_iter()
    .collect();

    if tables
        .iter()
        .any(|table| !required.contains(table.as_str()))
    {
        return Err(StoreError::InvalidInput(
            "RESET_REQUIRED: unsupported tables detected",
        ));
    }

    for table in required {
        if !tables.contains(table) {
            return Err(StoreError::InvalidInput(
                "RESET_REQUIRED: required table is missing",
            ));
        }
    }

    let version = conn
        .query_row(
            "SELECT schema_version FROM store_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;

    match version {
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        Some(_) => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema version mismatch",
        )),
        None => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema state row is missing",
        )),
    }
}

fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    let now_ms = now_ms();

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS store_state (
          singleton INTEGER PRIMARY KEY CHECK(singleton = 1),
          schema_version INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS counters (
          name TEXT PRIMARY KEY,
          value INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chunks (
          id TEXT PRIMARY KEY,
          project TEXT NOT NULL,
          task_type TEXT NOT NULL,
          content TEXT NOT NULL,
          state TEXT NOT NULL,
          produced_by TEXT NOT NULL,
          reviewed_by TEXT,
          confidence REAL NOT NULL,
          sources TEXT NOT NULL,
          tokens_used INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          CHECK(state IN ('seed', 'watered', 'sprouted', 'rejected')),
          CHECK(confidence >= 0.0 AND confidence <= 1.0),
          CHECK(tokens_used >= 0)
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_state ON chunks(state);
        CREATE INDEX IF NOT EXISTS idx_chunks_project ON chunks(project);
        CREATE INDEX IF NOT EXISTS idx_chunks_created
          ON chunks(created_at_ms, id);

        CREATE TABLE IF NOT EXISTS token_usage (
          seq INTEGER PRIMARY KEY AUTOINCREMENT,
          chunk_id TEXT NOT NULL,
          model TEXT NOT NULL,
          tokens INTEGER NOT NULL,
          recorded_at_ms INTEGER NOT NULL,
          FOREIGN KEY(chunk_id) REFERENCES chunks(id) ON DELETE CASCADE,
          CHECK(tokens >= 0)
        );

        CREATE INDEX IF NOT EXISTS idx_token_usage_model ON token_usage(model);
        CREATE INDEX IF NOT EXISTS idx_token_usage_recorded
          ON token_usage(recorded_at_ms);

        CREATE TABLE IF NOT EXISTS routing_rules (
          task_type TEXT PRIMARY KEY,
          tier TEXT NOT NULL,
          reason TEXT NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS retry_state (
          task_key TEXT PRIMARY KEY,
          attempt_count INTEGER NOT NULL,
          last_attempt_at_ms INTEGER NOT NULL,
          last_error TEXT NOT NULL,
          next_allowed_at_ms INTEGER NOT NULL,
          CHECK(attempt_count >= 1)
        );

        CREATE TABLE IF NOT EXISTS scheduled_tasks (
          id TEXT PRIMARY KEY,
          fire_at_ms INTEGER NOT NULL,
          payload TEXT NOT NULL,
          status TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          CHECK(status IN ('pending', 'cancelled', 'fired'))
        );

        CREATE INDEX IF NOT EXISTS idx_scheduled_fire_at
          ON scheduled_tasks(fire_at_ms, id);
        "#,
    )?;

    conn.execute(
        "INSERT INTO store_state(singleton, schema_version, created_at_ms, updated_at_ms) \
         VALUES (1, ?1, ?2, ?2) \
         ON CONFLICT(singleton) DO UPDATE SET schema_version=excluded.schema_version, updated_at_ms=excluded.updated_at_ms",
        params![SCHEMA_VERSION, now_ms],
    )?;

    Ok(())
}

pub(crate) fn next_counter_tx(tx: &Transaction<'_>, name: &str) -> Result<i64, StoreError> {
    let current: i64 = tx
        .query_row(
            "SELECT value FROM counters WHERE name=?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);
    let next = current + 1;
    tx.execute(
        r#"
        INSERT INTO counters(name, value) VALUES (?1, ?2)
        ON CONFLICT(name) DO UPDATE SET value=excluded.value
        "#,
        params![name, next],
    )?;
    Ok(next)
}

pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("PRIMARY KEY constraint failed")
                })
        }
        _ => false,
    }
}

pub(crate) fn to_sqlite_i64(value: usize) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("numeric overflow"))
}

pub(crate) fn clamp_limit(limit: usize) -> usize {
    limit.min(MAX_LIST_LIMIT)
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
