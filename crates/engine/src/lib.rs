#![forbid(unsafe_code)]

//! Typed operations layer of the Sprout pipeline core: routing
//! recommendations, the chunk ledger, cost accounting, the retry tracker
//! and the poll-based scheduler, all backed by one SQLite store. A
//! transport (MCP server, HTTP, CLI) is expected to wrap these methods;
//! this crate never frames messages and never talks to a model service.

mod config;
mod engine;
mod error;
mod report;

pub use config::{EngineConfig, RoutingOverride};
pub use engine::{Engine, NewChunk, Review, ScheduleAt};
pub use error::EngineError;
pub use report::{CostEntry, CostReport};
