#![forbid(unsafe_code)]

use crate::tier::ModelTier;
use std::collections::BTreeMap;

/// One routing entry: which tier handles a task type and why.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingRule {
    pub tier: ModelTier,
    pub reason: String,
}

/// Answer to `recommend`: always populated, never an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recommendation {
    pub task_type: String,
    pub tier: ModelTier,
    pub model_id: String,
    pub reason: String,
}

/// Total mapping from task type to (tier, reason). Lookups that miss every
/// explicit rule fall back to the default tier, so routing never fails on a
/// task type nobody registered.
#[derive(Clone, Debug)]
pub struct RoutingTable {
    rules: BTreeMap<String, RoutingRule>,
    model_ids: BTreeMap<ModelTier, String>,
    default_tier: ModelTier,
    default_reason: String,
}

impl RoutingTable {
    /// Built-in rules: cheap summarization/validation work goes to haiku,
    /// first-pass fact-checking to sonnet, deep verification to opus.
    pub fn with_defaults() -> Self {
        let mut table = Self {
            rules: BTreeMap::new(),
            model_ids: BTreeMap::new(),
            default_tier: ModelTier::haiku(),
            default_reason: "Default: start cheap, escalate if needed".to_string(),
        };

        table.register_model(ModelTier::haiku(), "haiku-4.5");
        table.register_model(ModelTier::sonnet(), "sonnet-4.6");
        table.register_model(ModelTier::opus(), "opus-4.6");

        let defaults: [(&str, ModelTier, &str); 7] = [
            (
                "biography_synthesis",
                ModelTier::haiku(),
                "Factual summarization from web sources",
            ),
            (
                "council_description",
                ModelTier::haiku(),
                "Historical summarization",
            ),
            (
                "document_synopsis",
                ModelTier::haiku(),
                "Content summarization",
            ),
            ("json_validation", ModelTier::haiku(), "Structural verification"),
            (
                "fact_check_first_pass",
                ModelTier::sonnet(),
                "Cross-reference claims",
            ),
            ("fact_check_final", ModelTier::opus(), "Deep factual verification"),
            (
                "theological_analysis",
                ModelTier::opus(),
                "Domain expertise required",
            ),
        ];
        for (task_type, tier, reason) in defaults {
            table.upsert(task_type, tier, reason);
        }

        table
    }

    pub fn recommend(&self, task_type: &str) -> Recommendation {
        match self.rules.get(task_type) {
            Some(rule) => Recommendation {
                task_type: task_type.to_string(),
                tier: rule.tier.clone(),
                model_id: self.model_for(&rule.tier),
                reason: rule.reason.clone(),
            },
            None => Recommendation {
                task_type: task_type.to_string(),
                tier: self.default_tier.clone(),
                model_id: self.model_for(&self.default_tier),
                reason: self.default_reason.clone(),
            },
        }
    }

    /// Last write wins; no versioning.
    pub fn upsert(&mut self, task_type: impl Into<String>, tier: ModelTier, reason: impl Into<String>) {
        self.rules.insert(
            task_type.into(),
            RoutingRule {
                tier,
                reason: reason.into(),
            },
        );
    }

    pub fn register_model(&mut self, tier: ModelTier, model_id: impl Into<String>) {
        self.model_ids.insert(tier, model_id.into());
    }

    pub fn set_default_tier(&mut self, tier: ModelTier) {
        self.default_tier = tier;
    }

    pub fn default_tier(&self) -> &ModelTier {
        &self.default_tier
    }

    pub fn rule(&self, task_type: &str) -> Option<&RoutingRule> {
        self.rules.get(task_type)
    }

    /// Tiers registered without a concrete model identifier resolve to the
    /// tier name itself, so custom tiers stay usable before configuration
    /// catches up.
    pub fn model_for(&self, tier: &ModelTier) -> String {
        self.model_ids
            .get(tier)
            .cloned()
            .unwrap_or_else(|| tier.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_task_types_use_their_rule() {
        let table = RoutingTable::with_defaults();
        let rec = table.recommend("fact_check_final");
        assert_eq!(rec.tier, ModelTier::opus());
        assert_eq!(rec.model_id, "opus-4.6");
        assert_eq!(rec.reason, "Deep factual verification");
    }

    #[test]
    fn unknown_task_types_fall_back_to_default() {
        let table = RoutingTable::with_defaults();
        let rec = table.recommend("summarization");
        assert_eq!(rec.tier, ModelTier::haiku());
        assert_eq!(rec.model_id, "haiku-4.5");
        assert_eq!(rec.reason, "Default: start cheap, escalate if needed");
    }

    #[test]
    fn upsert_overrides_builtin_rules() {
        let mut table = RoutingTable::with_defaults();
        table.upsert("json_validation", ModelTier::sonnet(), "stricter checks");
        let rec = table.recommend("json_validation");
        assert_eq!(rec.tier, ModelTier::sonnet());
        assert_eq!(rec.reason, "stricter checks");
    }

    #[test]
    fn custom_tier_without_model_id_resolves_to_tier_name() {
        let mut table = RoutingTable::with_defaults();
        let local = ModelTier::try_new("local-8b").expect("tier");
        table.upsert("scratch_notes", local.clone(), "free local pass");
        let rec = table.recommend("scratch_notes");
        assert_eq!(rec.model_id, "local-8b");
        assert_eq!(rec.tier, local);
    }
}
