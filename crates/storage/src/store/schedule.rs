#![forbid(unsafe_code)]

use super::*;
use sprout_core::schedule::ScheduleStatus;

const MAX_PAYLOAD_LEN: usize = 64_000;

/// One scheduler row. `status` is the observed status: stored `pending`
/// rows whose fire time has passed surface as `due`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledTaskRow {
    pub id: String,
    pub fire_at_ms: i64,
    pub payload_json: String,
    pub status: ScheduleStatus,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl SqliteStore {
    /// Stores a `pending` task. Callers pass either an absolute time or a
    /// relative delay; the resolved time must be strictly in the future.
    pub fn schedule_task(
        &mut self,
        request: ScheduleTaskRequest,
    ) -> Result<ScheduledTaskRow, StoreError> {
        let payload_json = normalize_payload(&request.payload_json)?;
        let now_ms = request.now_ms;

        let fire_at_ms = match (request.fire_at_ms, request.delay_ms) {
            (Some(_), Some(_)) => {
                return Err(StoreError::InvalidInput(
                    "provide fire_at_ms or delay_ms, not both",
                ));
            }
            (Some(fire_at_ms), None) => fire_at_ms,
            (None, Some(delay_ms)) => {
                if delay_ms < 0 {
                    return Err(StoreError::InvalidInput("delay_ms must be >= 0"));
                }
                now_ms.saturating_add(delay_ms)
            }
            (None, None) => {
                return Err(StoreError::InvalidInput(
                    "provide fire_at_ms or delay_ms",
                ));
            }
        };

        if fire_at_ms <= now_ms {
            return Err(StoreError::FireAtInPast { fire_at_ms, now_ms });
        }

        let tx = self.conn_mut().transaction()?;
        let seq = next_counter_tx(&tx, "scheduled_task_seq")?;
        let id = format!("TSK-{seq:06}");

        tx.execute(
            r#"
            INSERT INTO scheduled_tasks(id, fire_at_ms, payload, status, created_at_ms, updated_at_ms)
            VALUES (?1, ?2, ?3, 'pending', ?4, ?4)
            "#,
            params![id.as_str(), fire_at_ms, payload_json, now_ms],
        )?;

        tx.commit()?;

        Ok(ScheduledTaskRow {
            id,
            fire_at_ms,
            payload_json,
            status: ScheduleStatus::Pending,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        })
    }

    /// Due-ness is computed here, at read time, from stored fire time vs the
    /// caller's clock; nothing in the store fires tasks on its own.
    pub fn list_scheduled(
        &self,
        request: ListScheduledRequest,
    ) -> Result<Vec<ScheduledTaskRow>, StoreError> {
        let limit = to_sqlite_i64(clamp_limit(request.limit))?;
        let offset = to_sqlite_i64(request.offset)?;

        let query = if request.include_finished {
            "SELECT id, fire_at_ms, payload, status, created_at_ms, updated_at_ms \
             FROM scheduled_tasks \
             ORDER BY fire_at_ms ASC, id ASC LIMIT ?1 OFFSET ?2"
        } else {
            "SELECT id, fire_at_ms, payload, status, created_at_ms, updated_at_ms \
             FROM scheduled_tasks WHERE status = 'pending' \
             ORDER BY fire_at_ms ASC, id ASC LIMIT ?1 OFFSET ?2"
        };

        let mut stmt = self.conn().prepare(query)?;
        let mut rows = stmt.query(params![limit, offset])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(decode_task_row(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get::<_, String>(3)?,
                row.get(4)?,
                row.get(5)?,
                request.now_ms,
            )?);
        }
        Ok(out)
    }

    pub fn get_scheduled(&self, id: &str, now_ms: i64) -> Result<Option<ScheduledTaskRow>, StoreError> {
        let id = normalize_task_id(id)?;
        let row = self
            .conn()
            .query_row(
                "SELECT id, fire_at_ms, payload, status, created_at_ms, updated_at_ms \
                 FROM scheduled_tasks WHERE id=?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, fire_at_ms, payload, status, created, updated)| {
            decode_task_row(id, fire_at_ms, payload, status, created, updated, now_ms)
        })
        .transpose()
    }

    /// The caller acted on a due task; close it out. Only live rows can be
    /// fired, so a second caller racing on the same id observes NotFound.
    pub fn mark_fired(&mut self, id: &str, now_ms: i64) -> Result<ScheduledTaskRow, StoreError> {
        self.finish_task(id, ScheduleStatus::Fired, now_ms)
    }

    pub fn cancel_scheduled(
        &mut self,
        id: &str,
        now_ms: i64,
    ) -> Result<ScheduledTaskRow, StoreError> {
        self.finish_task(id, ScheduleStatus::Cancelled, now_ms)
    }

    fn finish_task(
        &mut self,
        id: &str,
        target: ScheduleStatus,
        now_ms: i64,
    ) -> Result<ScheduledTaskRow, StoreError> {
        let id = normalize_task_id(id)?;
        let tx = self.conn_mut().transaction()?;

        let row = tx
            .query_row(
                "SELECT fire_at_ms, payload, status, created_at_ms FROM scheduled_tasks WHERE id=?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((fire_at_ms, payload_json, status, created_at_ms)) = row else {
            return Err(StoreError::UnknownScheduledTask { id });
        };

        // Already-fired and cancelled rows are indistinguishable from absent
        // ones as far as mutations go.
        if status != ScheduleStatus::Pending.as_str() {
            return Err(StoreError::UnknownScheduledTask { id });
        }

        tx.execute(
            "UPDATE scheduled_tasks SET status=?2, updated_at_ms=?3 WHERE id=?1",
            params![id.as_str(), target.as_str(), now_ms],
        )?;

        tx.commit()?;

        Ok(ScheduledTaskRow {
            id,
            fire_at_ms,
            payload_json,
            status: target,
            created_at_ms,
            updated_at_ms: now_ms,
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn decode_task_row(
    id: String,
    fire_at_ms: i64,
    payload_json: String,
    status: String,
    created_at_ms: i64,
    updated_at_ms: i64,
    now_ms: i64,
) -> Result<ScheduledTaskRow, StoreError> {
    let status = ScheduleStatus::parse(&status)
        .map_err(|_| StoreError::InvalidInput("invalid scheduled task status row"))?
        .observed(fire_at_ms, now_ms);
    Ok(ScheduledTaskRow {
        id,
        fire_at_ms,
        payload_json,
        status,
        created_at_ms,
        updated_at_ms,
    })
}

fn normalize_task_id(raw: &str) -> Result<String, StoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoreError::InvalidInput("task id must not be empty"));
    }
    if !raw.starts_with("TSK-") {
        return Err(StoreError::InvalidInput("task id must start with TSK-"));
    }
    let digits = raw.trim_start_matches("TSK-");
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(StoreError::InvalidInput("task id digits must be [0-9]"));
    }
    Ok(raw.to_string())
}

fn normalize_payload(raw: &str) -> Result<String, StoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoreError::InvalidInput("payload must not be empty"));
    }
    if raw.len() > MAX_PAYLOAD_LEN {
        return Err(StoreError::InvalidInput("payload is too long"));
    }
    Ok(raw.to_string())
}
