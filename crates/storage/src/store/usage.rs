#![forbid(unsafe_code)]

use super::*;

/// Token spend attributed to one model, summed from the usage ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelUsageRow {
    pub model: String,
    pub tokens: i64,
    pub chunks: i64,
}

impl SqliteStore {
    /// Per-model token totals, optionally restricted to usage recorded
    /// strictly after `since_ms`. One statement, one snapshot: the numbers
    /// never mix rows from different points in time.
    pub fn token_usage_by_model(
        &self,
        since_ms: Option<i64>,
    ) -> Result<Vec<ModelUsageRow>, StoreError> {
        let since = since_ms.unwrap_or(i64::MIN);

        let mut stmt = self.conn().prepare(
            "SELECT model, SUM(tokens), COUNT(DISTINCT chunk_id) \
             FROM token_usage WHERE recorded_at_ms > ?1 \
             GROUP BY model ORDER BY model ASC",
        )?;
        let mut rows = stmt.query(params![since])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(ModelUsageRow {
                model: row.get(0)?,
                tokens: row.get(1)?,
                chunks: row.get(2)?,
            });
        }
        Ok(out)
    }
}

pub(crate) fn insert_usage_tx(
    tx: &Transaction<'_>,
    chunk_id: &str,
    model: &str,
    tokens: i64,
    recorded_at_ms: i64,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO token_usage(chunk_id, model, tokens, recorded_at_ms) VALUES (?1, ?2, ?3, ?4)",
        params![chunk_id, model, tokens, recorded_at_ms],
    )?;
    Ok(())
}
