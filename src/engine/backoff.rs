//! Retry budget and backoff schedule for transient failures.
//!
//! Delay for attempt `n` (1-based) is `base * 2^(n-1)`, capped at `max`,
//! then spread by up to ±`jitter_pct` so bets on one game that failed
//! together do not retry in lockstep.

use chrono::Duration;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Transient failures tolerated before routing to manual review.
    pub max_attempts: u32,
    /// Fraction in `[0, 1)`; 0 disables jitter.
    pub jitter_pct: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::seconds(2),
            max_delay: Duration::minutes(5),
            max_attempts: 8,
            jitter_pct: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay before retry number `attempt`.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(30);
        let base_ms = self.base_delay.num_milliseconds().max(0) as u64;
        let delay_ms = base_ms.saturating_mul(2u64.pow(exp));
        let capped = delay_ms.min(self.max_delay.num_milliseconds().max(0) as u64);
        Duration::milliseconds(capped as i64)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if self.jitter_pct <= 0.0 {
            return nominal;
        }
        let pct = self.jitter_pct.min(0.99);
        let factor = rand::thread_rng().gen_range((1.0 - pct)..=(1.0 + pct));
        Duration::milliseconds((nominal.num_milliseconds() as f64 * factor).round() as i64)
    }

    /// Whether the budget is spent after `attempt` transient failures.
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}
