#![forbid(unsafe_code)]

use super::*;
use sprout_core::tier::ModelTier;

const MAX_TASK_TYPE_LEN: usize = 64;
const MAX_REASON_LEN: usize = 400;

/// Persisted routing override; merged over the built-in defaults when the
/// engine starts, so a restart keeps runtime reconfiguration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingRuleRow {
    pub task_type: String,
    pub tier: ModelTier,
    pub reason: String,
    pub updated_at_ms: i64,
}

impl SqliteStore {
    /// Last write wins; no versioning or rollback.
    pub fn routing_rule_upsert(
        &mut self,
        task_type: &str,
        tier: &ModelTier,
        reason: &str,
        now_ms: i64,
    ) -> Result<RoutingRuleRow, StoreError> {
        let task_type = normalize_rule_task_type(task_type)?;
        let reason = normalize_reason(reason)?;

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            r#"
            INSERT INTO routing_rules(task_type, tier, reason, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(task_type) DO UPDATE SET
              tier=excluded.tier,
              reason=excluded.reason,
              updated_at_ms=excluded.updated_at_ms
            "#,
            params![task_type, tier.as_str(), reason, now_ms],
        )?;
        tx.commit()?;

        Ok(RoutingRuleRow {
            task_type,
            tier: tier.clone(),
            reason,
            updated_at_ms: now_ms,
        })
    }

    pub fn routing_rules_list(&self) -> Result<Vec<RoutingRuleRow>, StoreError> {
        let mut stmt = self.conn().prepare(
            "SELECT task_type, tier, reason, updated_at_ms \
             FROM routing_rules ORDER BY task_type ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let tier: String = row.get(1)?;
            out.push(RoutingRuleRow {
                task_type: row.get(0)?,
                tier: ModelTier::try_new(tier)
                    .map_err(|_| StoreError::InvalidInput("invalid routing tier row"))?,
                reason: row.get(2)?,
                updated_at_ms: row.get(3)?,
            });
        }
        Ok(out)
    }
}

fn normalize_rule_task_type(raw: &str) -> Result<String, StoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoreError::InvalidInput("routing task_type must not be empty"));
    }
    if raw.len() > MAX_TASK_TYPE_LEN {
        return Err(StoreError::InvalidInput("routing task_type is too long"));
    }
    Ok(raw.to_string())
}

fn normalize_reason(raw: &str) -> Result<String, StoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoreError::InvalidInput("routing reason must not be empty"));
    }
    Ok(raw.chars().take(MAX_REASON_LEN).collect())
}
