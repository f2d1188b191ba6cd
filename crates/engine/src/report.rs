#![forbid(unsafe_code)]

use serde::Serialize;
use sprout_core::pricing::{PricingTable, cost_usd};
use sprout_storage::ModelUsageRow;

/// Spend attributed to one model. `fallback_rate` flags identifiers the
/// pricing table does not know; their spend is estimated at the configured
/// fallback rate rather than dropped from the report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CostEntry {
    pub model: String,
    pub tokens: i64,
    pub chunks: i64,
    pub rate_per_mtok: f64,
    pub cost_usd: f64,
    pub fallback_rate: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CostReport {
    pub entries: Vec<CostEntry>,
    pub total_usd: f64,
}

impl CostReport {
    pub fn build(usage: Vec<ModelUsageRow>, pricing: &PricingTable) -> Self {
        let mut entries = Vec::with_capacity(usage.len());
        let mut total_usd = 0.0;

        for row in usage {
            let rate = pricing.rate_for(&row.model);
            let cost = cost_usd(row.tokens, rate.per_mtok);
            total_usd += cost;
            entries.push(CostEntry {
                model: row.model,
                tokens: row.tokens,
                chunks: row.chunks,
                rate_per_mtok: rate.per_mtok,
                cost_usd: cost,
                fallback_rate: rate.fallback,
            });
        }

        Self { entries, total_usd }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_is_the_sum_of_entries() {
        let pricing = PricingTable::with_defaults();
        let report = CostReport::build(
            vec![
                ModelUsageRow {
                    model: "haiku-4.5".to_string(),
                    tokens: 1_000_000,
                    chunks: 10,
                },
                ModelUsageRow {
                    model: "opus-4.6".to_string(),
                    tokens: 200_000,
                    chunks: 2,
                },
            ],
            &pricing,
        );

        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].cost_usd, 5.0);
        assert_eq!(report.entries[1].cost_usd, 15.0);
        assert_eq!(
            report.total_usd,
            report.entries.iter().map(|e| e.cost_usd).sum::<f64>()
        );
    }

    #[test]
    fn unknown_models_are_flagged_not_dropped() {
        let pricing = PricingTable::with_defaults();
        let report = CostReport::build(
            vec![ModelUsageRow {
                model: "mystery-1".to_string(),
                tokens: 1_000_000,
                chunks: 1,
            }],
            &pricing,
        );
        assert_eq!(report.entries.len(), 1);
        assert!(report.entries[0].fallback_rate);
        assert_eq!(
            report.entries[0].rate_per_mtok,
            sprout_core::pricing::DEFAULT_FALLBACK_RATE_PER_MTOK
        );
    }
}
