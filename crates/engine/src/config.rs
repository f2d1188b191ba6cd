#![forbid(unsafe_code)]

use crate::error::EngineError;
use serde::Deserialize;
use sprout_core::backoff::RetryPolicy;
use sprout_core::pricing::DEFAULT_FALLBACK_RATE_PER_MTOK;
use sprout_core::tier::ModelTier;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const ENV_STORAGE_DIR: &str = "SPROUT_STORAGE_DIR";
pub const ENV_MAX_RETRIES: &str = "SPROUT_MAX_RETRIES";
pub const ENV_BACKOFF_BASE: &str = "SPROUT_BACKOFF_BASE";
pub const ENV_CONFIG_PATH: &str = "SPROUT_CONFIG_PATH";

const DEFAULT_STORAGE_DIR: &str = "./sprout_data";

/// Routing override as it appears in the JSON config file.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RoutingOverride {
    pub tier: String,
    pub reason: String,
}

/// Startup configuration for an [`crate::Engine`]. Built-in defaults are
/// always present; the optional JSON config file and the environment merge
/// over them, file/env winning on collision.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub storage_dir: PathBuf,
    pub policy: RetryPolicy,
    pub default_tier: ModelTier,
    pub fallback_rate_per_mtok: f64,
    pub routing: BTreeMap<String, RoutingOverride>,
    /// tier -> concrete model identifier.
    pub models: BTreeMap<String, String>,
    /// model identifier -> price per million output tokens.
    pub pricing: BTreeMap<String, f64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            policy: RetryPolicy::default(),
            default_tier: ModelTier::haiku(),
            fallback_rate_per_mtok: DEFAULT_FALLBACK_RATE_PER_MTOK,
            routing: BTreeMap::new(),
            models: BTreeMap::new(),
            pricing: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Reads `SPROUT_STORAGE_DIR`, `SPROUT_MAX_RETRIES`,
    /// `SPROUT_BACKOFF_BASE` and, when `SPROUT_CONFIG_PATH` is set, the JSON
    /// config file it points at. Malformed values fail loudly instead of
    /// being silently defaulted.
    pub fn from_env() -> Result<Self, EngineError> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var(ENV_STORAGE_DIR) {
            config.storage_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = std::env::var(ENV_MAX_RETRIES) {
            config.policy.max_attempts = raw
                .trim()
                .parse::<u32>()
                .map_err(|_| EngineError::Config(format!("{ENV_MAX_RETRIES} is not a u32: {raw}")))?;
        }
        if let Ok(raw) = std::env::var(ENV_BACKOFF_BASE) {
            config.policy.base_secs = raw.trim().parse::<f64>().map_err(|_| {
                EngineError::Config(format!("{ENV_BACKOFF_BASE} is not a number: {raw}"))
            })?;
        }
        if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
            config.apply_file(Path::new(&path))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Merges a JSON config file over the current values.
    pub fn apply_file(&mut self, path: &Path) -> Result<(), EngineError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            EngineError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        let file: ConfigFile = serde_json::from_str(&raw).map_err(|err| {
            EngineError::Config(format!("cannot parse {}: {err}", path.display()))
        })?;

        if let Some(tier) = file.default_tier {
            self.default_tier = ModelTier::try_new(&tier)
                .map_err(|_| EngineError::InvalidTier { value: tier })?;
        }
        if let Some(rate) = file.fallback_rate_per_mtok {
            self.fallback_rate_per_mtok = rate;
        }
        if let Some(max) = file.max_retries {
            self.policy.max_attempts = max;
        }
        if let Some(base) = file.backoff_base {
            self.policy.base_secs = base;
        }
        self.routing.extend(file.routing);
        self.models.extend(file.models);
        self.pricing.extend(file.pricing);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.policy.max_attempts == 0 {
            return Err(EngineError::Config("max retries must be >= 1".to_string()));
        }
        if !self.policy.base_secs.is_finite() || self.policy.base_secs < 1.0 {
            return Err(EngineError::Config("backoff base must be >= 1.0".to_string()));
        }
        if !self.fallback_rate_per_mtok.is_finite() || self.fallback_rate_per_mtok < 0.0 {
            return Err(EngineError::Config("fallback rate must be >= 0".to_string()));
        }
        for (task_type, rule) in &self.routing {
            if ModelTier::try_new(&rule.tier).is_err() {
                return Err(EngineError::Config(format!(
                    "routing override for `{task_type}` names invalid tier `{}`",
                    rule.tier
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    routing: BTreeMap<String, RoutingOverride>,
    #[serde(default)]
    models: BTreeMap<String, String>,
    #[serde(default)]
    pricing: BTreeMap<String, f64>,
    default_tier: Option<String>,
    fallback_rate_per_mtok: Option<f64>,
    max_retries: Option<u32>,
    backoff_base: Option<f64>,
}
