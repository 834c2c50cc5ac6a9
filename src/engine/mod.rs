//! Bet resolution engine: queues, baseline capture and settlement.

pub mod backoff;
pub mod baseline;
pub mod lifecycle;
pub mod resolution;
pub mod settlement;

pub use settlement::{EngineConfig, JobDisposition, ProposeRequest, SettlementEngine};
