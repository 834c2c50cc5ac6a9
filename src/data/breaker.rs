//! Circuit breaker guarding calls to the live-stats provider.
//!
//! Classic three-state breaker:
//! - **closed**: calls pass; consecutive transient failures are counted and
//!   reaching the threshold opens the breaker.
//! - **open**: calls short-circuit with `FetchError::BreakerOpen` until the
//!   cooldown has elapsed; the next call then becomes the half-open probe.
//! - **half_open**: exactly one probe is in flight. Success closes the
//!   breaker, failure re-opens it with a fresh open time.
//!
//! Every transition happens under a single mutex, so each success or
//! failure event produces exactly one state decision.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use super::FetchError;
use crate::clock::Clock;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive transient failures before opening.
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a probe.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::seconds(30),
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    /// Numeric encoding for the state gauge.
    pub fn gauge_value(&self) -> f64 {
        match self {
            BreakerState::Closed => 0.0,
            BreakerState::Open => 1.0,
            BreakerState::HalfOpen => 2.0,
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Point-in-time view of the breaker for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub provider: String,
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
    probe_in_flight: bool,
}

// ---------------------------------------------------------------------------
// Breaker
// ---------------------------------------------------------------------------

pub struct CircuitBreaker {
    provider: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("provider", &self.provider)
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("consecutive_failures", &inner.consecutive_failures)
            .finish()
    }
}

/// Permission to make one upstream call. Must be settled with
/// `succeed` or `fail`; a probe permit dropped unsettled counts as a
/// failed probe.
#[must_use = "a permit must be settled with succeed() or fail()"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl Permit<'_> {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.on_failure(true);
        }
    }
}

impl CircuitBreaker {
    pub fn new(provider: &str, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            provider: provider.to_string(),
            config,
            clock,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            provider: self.provider.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            opened_at: inner.opened_at,
        }
    }

    /// Ask to make a call. Short-circuits while open.
    pub fn acquire(&self) -> Result<Permit<'_>, FetchError> {
        let mut inner = self.inner.lock();
        let probe = match inner.state {
            BreakerState::Closed => false,
            BreakerState::Open => {
                let now = self.clock.now();
                let cooled = inner
                    .opened_at
                    .map(|t| now - t >= self.config.cooldown)
                    .unwrap_or(true);
                if !cooled {
                    return Err(self.open_error());
                }
                inner.state = BreakerState::HalfOpen;
                inner.probe_in_flight = true;
                info!(provider = %self.provider, "Circuit breaker half-open, sending probe");
                true
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    return Err(self.open_error());
                }
                inner.probe_in_flight = true;
                true
            }
        };
        Ok(Permit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    /// Run one upstream call under the breaker. Only transient failures
    /// count against it; a permanent failure means the provider answered.
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let permit = self.acquire()?;
        match f().await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(e) if e.is_transient() => {
                permit.fail();
                Err(e)
            }
            Err(e) => {
                permit.succeed();
                Err(e)
            }
        }
    }

    fn open_error(&self) -> FetchError {
        FetchError::BreakerOpen {
            provider: self.provider.clone(),
        }
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.inner.lock();
        if probe {
            inner.state = BreakerState::Closed;
            inner.consecutive_failures = 0;
            inner.opened_at = None;
            inner.probe_in_flight = false;
            info!(provider = %self.provider, "Circuit breaker closed after successful probe");
        } else if inner.state == BreakerState::Closed {
            inner.consecutive_failures = 0;
        }
    }

    fn on_failure(&self, probe: bool) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        if probe {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(self.clock.now());
            inner.probe_in_flight = false;
            warn!(provider = %self.provider, "Probe failed, circuit breaker re-opened");
            return;
        }

        if inner.state == BreakerState::Closed
            && inner.consecutive_failures >= self.config.failure_threshold
        {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(self.clock.now());
            warn!(
                provider = %self.provider,
                failures = inner.consecutive_failures,
                cooldown_secs = self.config.cooldown.num_seconds(),
                "Circuit breaker opened"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
