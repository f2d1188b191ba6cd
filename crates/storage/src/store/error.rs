#![forbid(unsafe_code)]

use sprout_core::state::ChunkState;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    InvalidInput(&'static str),
    ConfidenceOutOfRange {
        value: f64,
    },
    FireAtInPast {
        fire_at_ms: i64,
        now_ms: i64,
    },
    UnknownChunk {
        id: String,
    },
    UnknownScheduledTask {
        id: String,
    },
    InvalidTransition {
        id: String,
        state: ChunkState,
    },
    StaleState {
        id: String,
        expected: ChunkState,
        actual: ChunkState,
    },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::ConfidenceOutOfRange { value } => {
                write!(f, "confidence must be within [0, 1] (got {value})")
            }
            Self::FireAtInPast { fire_at_ms, now_ms } => write!(
                f,
                "fire time is not in the future (fire_at_ms={fire_at_ms}, now_ms={now_ms})"
            ),
            Self::UnknownChunk { id } => write!(f, "unknown chunk (id={id})"),
            Self::UnknownScheduledTask { id } => {
                write!(f, "unknown or finished scheduled task (id={id})")
            }
            Self::InvalidTransition { id, state } => write!(
                f,
                "chunk cannot be promoted from its current state (id={id}, state={state})"
            ),
            Self::StaleState {
                id,
                expected,
                actual,
            } => write!(
                f,
                "stale chunk state (id={id}, expected={expected}, actual={actual})"
            ),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}
