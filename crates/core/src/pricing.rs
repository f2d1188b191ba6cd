#![forbid(unsafe_code)]

use std::collections::BTreeMap;

/// Rate looked up for one model. `fallback` marks identifiers missing from
/// the table so reports can flag them instead of silently omitting spend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rate {
    pub per_mtok: f64,
    pub fallback: bool,
}

/// Price per million output tokens, keyed by model identifier. Reporting
/// only; never consulted for routing decisions.
#[derive(Clone, Debug)]
pub struct PricingTable {
    rates: BTreeMap<String, f64>,
    fallback_per_mtok: f64,
}

pub const DEFAULT_FALLBACK_RATE_PER_MTOK: f64 = 5.0;

impl PricingTable {
    pub fn with_defaults() -> Self {
        let mut table = Self {
            rates: BTreeMap::new(),
            fallback_per_mtok: DEFAULT_FALLBACK_RATE_PER_MTOK,
        };
        table.set_rate("haiku-4.5", 5.0);
        table.set_rate("sonnet-4.6", 15.0);
        table.set_rate("opus-4.6", 75.0);
        table
    }

    pub fn set_rate(&mut self, model: impl Into<String>, per_mtok: f64) {
        self.rates.insert(model.into(), per_mtok);
    }

    pub fn set_fallback(&mut self, per_mtok: f64) {
        self.fallback_per_mtok = per_mtok;
    }

    pub fn rate_for(&self, model: &str) -> Rate {
        match self.rates.get(model) {
            Some(per_mtok) => Rate {
                per_mtok: *per_mtok,
                fallback: false,
            },
            None => Rate {
                per_mtok: self.fallback_per_mtok,
                fallback: true,
            },
        }
    }
}

/// Spend for `tokens` billed at `per_mtok` dollars per million output tokens.
pub fn cost_usd(tokens: i64, per_mtok: f64) -> f64 {
    tokens as f64 * per_mtok / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_models_use_their_rate() {
        let table = PricingTable::with_defaults();
        let rate = table.rate_for("opus-4.6");
        assert_eq!(rate.per_mtok, 75.0);
        assert!(!rate.fallback);
    }

    #[test]
    fn unknown_models_use_the_fallback_and_are_flagged() {
        let mut table = PricingTable::with_defaults();
        table.set_fallback(9.0);
        let rate = table.rate_for("mystery-1");
        assert_eq!(rate.per_mtok, 9.0);
        assert!(rate.fallback);
    }

    #[test]
    fn cost_is_tokens_times_rate_over_a_million() {
        assert_eq!(cost_usd(1_000_000, 15.0), 15.0);
        assert_eq!(cost_usd(250_000, 4.0), 1.0);
        assert_eq!(cost_usd(0, 75.0), 0.0);
    }
}
