#![forbid(unsafe_code)]

use super::*;

const MAX_TASK_KEY_LEN: usize = 256;
const MAX_ERROR_LEN: usize = 2_000;

/// Backoff state for one logical task key. `exhausted` is a signal, not an
/// error: the caller decides whether to stop retrying and escalate.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryRecordRow {
    pub task_key: String,
    pub attempt_count: i64,
    pub last_attempt_at_ms: i64,
    pub last_error: String,
    pub next_allowed_at_ms: i64,
    pub exhausted: bool,
}

impl SqliteStore {
    /// Records one failed attempt and computes the next allowed retry time
    /// (`now + base^attempt` seconds). Once the attempt count reaches the
    /// policy maximum the record is cleared and the returned row carries
    /// `exhausted = true`, telling the caller to stop retrying.
    pub fn record_failure(
        &mut self,
        request: RecordFailureRequest,
    ) -> Result<RetryRecordRow, StoreError> {
        let task_key = normalize_task_key(&request.task_key)?;
        let last_error = normalize_error(&request.error)?;
        let policy = request.policy;
        let now_ms = request.now_ms;

        if !policy.base_secs.is_finite() || policy.base_secs < 1.0 {
            return Err(StoreError::InvalidInput("backoff base must be >= 1.0"));
        }
        if policy.max_attempts == 0 {
            return Err(StoreError::InvalidInput("max attempts must be >= 1"));
        }

        let tx = self.conn_mut().transaction()?;

        let previous: i64 = tx
            .query_row(
                "SELECT attempt_count FROM retry_state WHERE task_key=?1",
                params![task_key],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        let attempt_count = previous + 1;
        let attempt_u32 = u32::try_from(attempt_count).unwrap_or(u32::MAX);
        let next_allowed_at_ms = policy.next_allowed_at_ms(now_ms, attempt_u32);
        let exhausted = policy.exhausted(attempt_u32);

        if exhausted {
            // Lifecycle ends here: the caller is told to stop, and the next
            // failure (if any) starts a fresh backoff sequence.
            tx.execute(
                "DELETE FROM retry_state WHERE task_key=?1",
                params![task_key],
            )?;
        } else {
            tx.execute(
                r#"
                INSERT INTO retry_state(task_key, attempt_count, last_attempt_at_ms, last_error, next_allowed_at_ms)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(task_key) DO UPDATE SET
                  attempt_count=excluded.attempt_count,
                  last_attempt_at_ms=excluded.last_attempt_at_ms,
                  last_error=excluded.last_error,
                  next_allowed_at_ms=excluded.next_allowed_at_ms
                "#,
                params![task_key, attempt_count, now_ms, last_error, next_allowed_at_ms],
            )?;
        }

        tx.commit()?;

        Ok(RetryRecordRow {
            task_key,
            attempt_count,
            last_attempt_at_ms: now_ms,
            last_error,
            next_allowed_at_ms,
            exhausted,
        })
    }

    /// Success clears the backoff state; clearing an absent key is a no-op.
    pub fn record_success(&mut self, task_key: &str) -> Result<(), StoreError> {
        let task_key = normalize_task_key(task_key)?;
        self.conn()
            .execute("DELETE FROM retry_state WHERE task_key=?1", params![task_key])?;
        Ok(())
    }

    pub fn get_retry(&self, task_key: &str) -> Result<Option<RetryRecordRow>, StoreError> {
        let task_key = normalize_task_key(task_key)?;
        let row = self
            .conn()
            .query_row(
                "SELECT task_key, attempt_count, last_attempt_at_ms, last_error, next_allowed_at_ms \
                 FROM retry_state WHERE task_key=?1",
                params![task_key],
                |row| {
                    Ok(RetryRecordRow {
                        task_key: row.get(0)?,
                        attempt_count: row.get(1)?,
                        last_attempt_at_ms: row.get(2)?,
                        last_error: row.get(3)?,
                        next_allowed_at_ms: row.get(4)?,
                        exhausted: false,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}

fn normalize_task_key(raw: &str) -> Result<String, StoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoreError::InvalidInput("task_key must not be empty"));
    }
    if raw.len() > MAX_TASK_KEY_LEN {
        return Err(StoreError::InvalidInput("task_key is too long"));
    }
    Ok(raw.to_string())
}

fn normalize_error(raw: &str) -> Result<String, StoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoreError::InvalidInput("error text must not be empty"));
    }
    Ok(raw.chars().take(MAX_ERROR_LEN).collect())
}
