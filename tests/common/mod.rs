//! Shared fixtures for integration tests.

pub mod flaky_store;
pub mod mock_provider;

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use propbet::clock::ManualClock;
use propbet::data::breaker::{BreakerConfig, CircuitBreaker};
use propbet::data::fetcher::{FetcherConfig, SnapshotFetcher};
use propbet::data::SnapshotProvider;
use propbet::engine::backoff::RetryPolicy;
use propbet::engine::{EngineConfig, JobDisposition, SettlementEngine};
use propbet::metrics::Metrics;
use propbet::modes::ModeRegistry;
use propbet::storage::BetStore;
use propbet::types::LiveSnapshot;

use mock_provider::ScriptedProvider;

pub const GAME_ID: &str = "401547403";

pub fn kickoff() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 17, 0, 0).unwrap()
}

/// An engine wired to a scripted provider and a manual clock.
pub struct Harness {
    pub engine: Arc<SettlementEngine>,
    pub clock: Arc<ManualClock>,
    pub provider: Arc<ScriptedProvider>,
}

impl Harness {
    pub fn new(store: Arc<dyn BetStore>, initial: LiveSnapshot, start: DateTime<Utc>) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let provider = Arc::new(ScriptedProvider::new(initial));
        let metrics = Arc::new(Metrics::default());

        let breaker = Arc::new(CircuitBreaker::new(
            "scripted",
            BreakerConfig {
                failure_threshold: 100,
                cooldown: Duration::seconds(30),
            },
            clock.clone(),
        ));
        let fetcher = Arc::new(SnapshotFetcher::new(
            provider.clone() as Arc<dyn SnapshotProvider>,
            breaker,
            clock.clone(),
            metrics.clone(),
            FetcherConfig {
                poll_interval: Duration::seconds(5),
                call_timeout: std::time::Duration::from_secs(2),
            },
        ));

        let retry = RetryPolicy {
            base_delay: Duration::seconds(1),
            max_delay: Duration::seconds(8),
            max_attempts: 3,
            jitter_pct: 0.0,
        };
        let config = EngineConfig {
            not_evaluable_delay: Duration::seconds(15),
            retry: retry.clone(),
            capture_retry: retry,
            ..EngineConfig::default()
        };

        let engine = Arc::new(SettlementEngine::new(
            Arc::new(ModeRegistry::standard()),
            store,
            fetcher,
            clock.clone(),
            metrics,
            config,
        ));

        Self {
            engine,
            clock,
            provider,
        }
    }

    /// Advance the clock and run one synchronous engine pass.
    pub async fn step(&self, by: Duration) -> Vec<JobDisposition> {
        self.clock.advance(by);
        self.engine.run_pending().await
    }
}
