//! Configuration loading from TOML.
//!
//! Reads `config.toml` into strongly-typed sections. Every field has a
//! default, so a missing section (or an empty file) yields a runnable
//! configuration. Durations are stored as integer seconds or
//! milliseconds and converted by the accessor methods below.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::data::breaker::BreakerConfig;
use crate::data::fetcher::FetcherConfig;
use crate::engine::backoff::RetryPolicy;
use crate::engine::EngineConfig;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineSection,
    pub provider: ProviderSection,
    pub breaker: BreakerSection,
    pub fetcher: FetcherSection,
    pub resolution: RetrySection,
    pub lifecycle: LifecycleSection,
    pub storage: StorageSection,
    pub server: ServerSection,
    pub metrics: MetricsSection,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineSection {
    pub tick_interval_ms: u64,
    pub max_workers: usize,
    pub claim_batch: usize,
    /// Delay before re-checking a not-evaluable or pending result.
    pub not_evaluable_delay_secs: i64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            max_workers: 8,
            claim_batch: 32,
            not_evaluable_delay_secs: 15,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProviderSection {
    pub name: String,
    /// Overrides the provider's public endpoint (useful for a local stub).
    pub base_url: Option<String>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            name: "espn".to_string(),
            base_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BreakerSection {
    pub failure_threshold: u32,
    pub cooldown_secs: i64,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FetcherSection {
    pub poll_interval_secs: i64,
    pub call_timeout_ms: u64,
}

impl Default for FetcherSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            call_timeout_ms: 15_000,
        }
    }
}

/// Backoff for transient resolution failures.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrySection {
    pub base_delay_secs: i64,
    pub max_delay_secs: i64,
    pub max_attempts: u32,
    pub jitter_pct: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            base_delay_secs: 2,
            max_delay_secs: 300,
            max_attempts: 8,
            jitter_pct: 0.2,
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: chrono::Duration::seconds(self.base_delay_secs),
            max_delay: chrono::Duration::seconds(self.max_delay_secs),
            max_attempts: self.max_attempts,
            jitter_pct: self.jitter_pct.clamp(0.0, 0.99),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LifecycleSection {
    /// Unsettled bets are voided this long after game start.
    pub void_after_hours: i64,
    /// Backoff for baseline capture retries.
    pub capture: RetrySection,
}

impl Default for LifecycleSection {
    fn default() -> Self {
        Self {
            void_after_hours: 8,
            capture: RetrySection::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageSection {
    pub backend: StorageBackend,
    pub url: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            url: "sqlite://propbet.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSection {
    pub enabled: bool,
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MetricsSection {
    pub namespace: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            namespace: "propbet".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            tick_interval: std::time::Duration::from_millis(self.engine.tick_interval_ms.max(10)),
            not_evaluable_delay: chrono::Duration::seconds(self.engine.not_evaluable_delay_secs),
            void_after: chrono::Duration::hours(self.lifecycle.void_after_hours),
            max_workers: self.engine.max_workers.max(1),
            claim_batch: self.engine.claim_batch.max(1),
            retry: self.resolution.policy(),
            capture_retry: self.lifecycle.capture.policy(),
        }
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker.failure_threshold.max(1),
            cooldown: chrono::Duration::seconds(self.breaker.cooldown_secs),
        }
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            poll_interval: chrono::Duration::seconds(self.fetcher.poll_interval_secs),
            call_timeout: std::time::Duration::from_millis(self.fetcher.call_timeout_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
