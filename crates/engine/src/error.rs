#![forbid(unsafe_code)]

use sprout_storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("config error: {0}")]
    Config(String),
    #[error("invalid tier `{value}`")]
    InvalidTier { value: String },
}
