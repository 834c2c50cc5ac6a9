//! Store wrapper that fails chosen writes a set number of times before
//! passing them through to an in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};

use propbet::storage::{BetStore, MemoryStore, StoreResult};
use propbet::types::{Baseline, BaselineKey, Bet, BetId, BetStatus, EngineError};

#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    void_failures: AtomicUsize,
    flag_failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` writes that move a bet to `voided`.
    pub fn fail_voids(&self, n: usize) {
        self.void_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` review flags.
    pub fn fail_flags(&self, n: usize) {
        self.flag_failures.store(n, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicUsize) -> StoreResult<()> {
        let left = counter.load(Ordering::SeqCst);
        if left == 0 {
            return Ok(());
        }
        counter.store(left - 1, Ordering::SeqCst);
        Err(EngineError::Storage("database is locked".into()))
    }
}

#[async_trait]
impl BetStore for FlakyStore {
    async fn insert_bet(&self, bet: &Bet) -> StoreResult<()> {
        self.inner.insert_bet(bet).await
    }

    async fn load_bet(&self, id: BetId) -> StoreResult<Option<Bet>> {
        self.inner.load_bet(id).await
    }

    async fn save_bet_status(&self, id: BetId, status: BetStatus, now: DateTime<Utc>) -> StoreResult<Bet> {
        if status == BetStatus::Voided {
            Self::take_failure(&self.void_failures)?;
        }
        self.inner.save_bet_status(id, status, now).await
    }

    async fn save_resolution(&self, id: BetId, winning_choice: &str, now: DateTime<Utc>) -> StoreResult<Bet> {
        self.inner.save_resolution(id, winning_choice, now).await
    }

    async fn flag_for_review(&self, id: BetId, reason: &str, now: DateTime<Utc>) -> StoreResult<Bet> {
        Self::take_failure(&self.flag_failures)?;
        self.inner.flag_for_review(id, reason, now).await
    }

    async fn save_baseline(&self, baseline: &Baseline) -> StoreResult<bool> {
        self.inner.save_baseline(baseline).await
    }

    async fn load_baseline(&self, key: &BaselineKey) -> StoreResult<Option<Baseline>> {
        self.inner.load_baseline(key).await
    }

    async fn load_baselines(&self, bet_id: BetId) -> StoreResult<Vec<Baseline>> {
        self.inner.load_baselines(bet_id).await
    }

    async fn list_bets(&self, statuses: &[BetStatus]) -> StoreResult<Vec<Bet>> {
        self.inner.list_bets(statuses).await
    }
}
