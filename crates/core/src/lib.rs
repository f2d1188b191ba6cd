#![forbid(unsafe_code)]

pub mod backoff;
pub mod pricing;
pub mod routing;
pub mod schedule;
pub mod state;
pub mod tier;
