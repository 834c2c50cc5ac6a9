//! PROPBET: live prop bet resolution engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod api;
pub mod clock;
pub mod config;
pub mod data;
pub mod engine;
pub mod metrics;
pub mod modes;
pub mod storage;
pub mod types;
