//! Breaker-protected, cached snapshot fetching.
//!
//! Bets on the same game share one upstream call per poll interval:
//! the latest successful snapshot is cached per (league, game) and
//! concurrent misses for one game wait on a per-game lock, then re-check
//! the cache before calling out.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::breaker::CircuitBreaker;
use super::{FetchError, SnapshotProvider};
use crate::clock::Clock;
use crate::metrics::Metrics;
use crate::types::LiveSnapshot;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// How long a snapshot stays fresh.
    pub poll_interval: Duration,
    /// Upper bound on one upstream call.
    pub call_timeout: std::time::Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::seconds(60),
            call_timeout: std::time::Duration::from_secs(15),
        }
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

type GameKey = (String, String);

struct CacheEntry {
    snapshot: Arc<LiveSnapshot>,
    inserted_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

pub struct SnapshotFetcher {
    provider: Arc<dyn SnapshotProvider>,
    breaker: Arc<CircuitBreaker>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    config: FetcherConfig,
    cache: Mutex<HashMap<GameKey, CacheEntry>>,
    gates: Mutex<HashMap<GameKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl SnapshotFetcher {
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        breaker: Arc<CircuitBreaker>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
        config: FetcherConfig,
    ) -> Self {
        metrics.set_breaker_state(provider.name(), breaker.state());
        Self {
            provider,
            breaker,
            clock,
            metrics,
            config,
            cache: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Latest snapshot for a game, from cache when fresh.
    pub async fn fetch(&self, league: &str, game_id: &str) -> Result<Arc<LiveSnapshot>, FetchError> {
        let key: GameKey = (league.trim().to_lowercase(), game_id.to_string());

        if let Some(snapshot) = self.cached(&key) {
            debug!(league = %key.0, game_id, "Snapshot cache hit");
            return Ok(snapshot);
        }

        let gate = self.gate(&key);
        let _guard = gate.lock().await;

        // Another caller may have filled the cache while we waited.
        if let Some(snapshot) = self.cached(&key) {
            debug!(league = %key.0, game_id, "Snapshot filled by concurrent fetch");
            return Ok(snapshot);
        }

        let snapshot = Arc::new(self.fetch_upstream(&key.0, game_id).await?);
        self.cache.lock().insert(
            key,
            CacheEntry {
                snapshot: snapshot.clone(),
                inserted_at: self.clock.now(),
            },
        );
        Ok(snapshot)
    }

    /// Drop the cached snapshot for one game.
    pub fn invalidate(&self, league: &str, game_id: &str) {
        let key: GameKey = (league.trim().to_lowercase(), game_id.to_string());
        self.cache.lock().remove(&key);
    }

    /// Remove stale cache entries and idle per-game gates.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.config.poll_interval;
        let mut cache = self.cache.lock();
        let before = cache.len();
        cache.retain(|_, entry| now - entry.inserted_at < ttl);
        let evicted = before - cache.len();
        drop(cache);

        self.gates.lock().retain(|_, gate| Arc::strong_count(gate) > 1);
        evicted
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    fn cached(&self, key: &GameKey) -> Option<Arc<LiveSnapshot>> {
        let now = self.clock.now();
        let cache = self.cache.lock();
        cache
            .get(key)
            .filter(|entry| now - entry.inserted_at < self.config.poll_interval)
            .map(|entry| entry.snapshot.clone())
    }

    fn gate(&self, key: &GameKey) -> Arc<tokio::sync::Mutex<()>> {
        self.gates
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn fetch_upstream(&self, league: &str, game_id: &str) -> Result<LiveSnapshot, FetchError> {
        let provider = self.provider.clone();
        let timeout = self.config.call_timeout;
        let started = Instant::now();
        let mut called = false;

        let result = self
            .breaker
            .call(|| {
                called = true;
                async move {
                    match tokio::time::timeout(timeout, provider.fetch_snapshot(league, game_id)).await {
                        Ok(result) => result,
                        Err(_) => Err(FetchError::Timeout(timeout)),
                    }
                }
            })
            .await;

        let name = self.provider.name();
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.label(),
        };
        if called {
            self.metrics
                .observe_external_call(name, outcome, started.elapsed().as_secs_f64());
        } else {
            self.metrics.inc_external_request(name, outcome);
        }
        self.metrics.set_breaker_state(name, self.breaker.state());

        if let Err(e) = &result {
            if e.is_transient() {
                warn!(provider = name, league, game_id, error = %e, "Snapshot fetch failed");
            }
        }
        let mut snapshot = result?;
        snapshot.fetched_at = self.clock.now();
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
