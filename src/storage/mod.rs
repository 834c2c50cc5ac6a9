//! Persistence layer.
//!
//! The engine talks to storage only through `BetStore`. Two
//! implementations ship: `MemoryStore` for tests and single-process
//! runs, and `SqliteStore` for durable state. Both only move status
//! forward and write each baseline key at most once.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::types::{Baseline, BaselineKey, Bet, BetId, BetStatus, EngineError};

pub use sqlite::SqliteStore;

pub type StoreResult<T> = std::result::Result<T, EngineError>;

/// Durable bet and baseline storage.
///
/// Every method may fail with `EngineError::Storage` (transient).
/// Status writers fail with `InvalidTransition` when the move would go
/// backwards or touch a settled bet.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BetStore: Send + Sync {
    async fn insert_bet(&self, bet: &Bet) -> StoreResult<()>;

    async fn load_bet(&self, id: BetId) -> StoreResult<Option<Bet>>;

    /// Move a bet to `status`. Returns the updated bet.
    async fn save_bet_status(&self, id: BetId, status: BetStatus, now: DateTime<Utc>)
        -> StoreResult<Bet>;

    /// Resolve a bet with its winning choice.
    async fn save_resolution(&self, id: BetId, winning_choice: &str, now: DateTime<Utc>)
        -> StoreResult<Bet>;

    /// Route a bet to manual review. Status is left unchanged.
    async fn flag_for_review(&self, id: BetId, reason: &str, now: DateTime<Utc>) -> StoreResult<Bet>;

    /// Write a baseline unless one exists for its key. Returns whether
    /// this call wrote it.
    async fn save_baseline(&self, baseline: &Baseline) -> StoreResult<bool>;

    async fn load_baseline(&self, key: &BaselineKey) -> StoreResult<Option<Baseline>>;

    async fn load_baselines(&self, bet_id: BetId) -> StoreResult<Vec<Baseline>>;

    /// Bets whose status is in `statuses`, oldest first.
    async fn list_bets(&self, statuses: &[BetStatus]) -> StoreResult<Vec<Bet>>;
}

/// Apply a status change to an in-hand bet, enforcing forward-only moves.
pub(crate) fn advance(bet: &mut Bet, next: BetStatus, now: DateTime<Utc>) -> StoreResult<()> {
    if !bet.status.can_advance_to(next) {
        return Err(EngineError::InvalidTransition {
            bet_id: bet.id,
            from: bet.status,
            to: next,
        });
    }
    bet.status = next;
    bet.updated_at = now;
    if next.is_terminal() {
        bet.settled_at = Some(now);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    bets: RwLock<HashMap<BetId, Bet>>,
    baselines: RwLock<HashMap<BaselineKey, Baseline>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, id: BetId, f: F) -> StoreResult<Bet>
    where
        F: FnOnce(&mut Bet) -> StoreResult<()>,
    {
        let mut bets = self.bets.write();
        let bet = bets.get_mut(&id).ok_or(EngineError::BetNotFound(id))?;
        let mut next = bet.clone();
        f(&mut next)?;
        *bet = next.clone();
        Ok(next)
    }
}

#[async_trait]
impl BetStore for MemoryStore {
    async fn insert_bet(&self, bet: &Bet) -> StoreResult<()> {
        let mut bets = self.bets.write();
        if bets.contains_key(&bet.id) {
            return Err(EngineError::Storage(format!("bet {} already exists", bet.id)));
        }
        bets.insert(bet.id, bet.clone());
        debug!(bet_id = %bet.id, "Bet stored");
        Ok(())
    }

    async fn load_bet(&self, id: BetId) -> StoreResult<Option<Bet>> {
        Ok(self.bets.read().get(&id).cloned())
    }

    async fn save_bet_status(
        &self,
        id: BetId,
        status: BetStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Bet> {
        self.update(id, |bet| advance(bet, status, now))
    }

    async fn save_resolution(
        &self,
        id: BetId,
        winning_choice: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Bet> {
        self.update(id, |bet| {
            advance(bet, BetStatus::Resolved, now)?;
            bet.winning_choice = Some(winning_choice.to_string());
            Ok(())
        })
    }

    async fn flag_for_review(&self, id: BetId, reason: &str, now: DateTime<Utc>) -> StoreResult<Bet> {
        self.update(id, |bet| {
            bet.review_reason = Some(reason.to_string());
            bet.updated_at = now;
            Ok(())
        })
    }

    async fn save_baseline(&self, baseline: &Baseline) -> StoreResult<bool> {
        let mut baselines = self.baselines.write();
        if baselines.contains_key(&baseline.key) {
            return Ok(false);
        }
        baselines.insert(baseline.key.clone(), baseline.clone());
        Ok(true)
    }

    async fn load_baseline(&self, key: &BaselineKey) -> StoreResult<Option<Baseline>> {
        Ok(self.baselines.read().get(key).cloned())
    }

    async fn load_baselines(&self, bet_id: BetId) -> StoreResult<Vec<Baseline>> {
        let mut found: Vec<Baseline> = self
            .baselines
            .read()
            .values()
            .filter(|b| b.key.bet_id == bet_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.key.player_id.cmp(&b.key.player_id));
        Ok(found)
    }

    async fn list_bets(&self, statuses: &[BetStatus]) -> StoreResult<Vec<Bet>> {
        let mut found: Vec<Bet> = self
            .bets
            .read()
            .values()
            .filter(|b| statuses.contains(&b.status))
            .cloned()
            .collect();
        found.sort_by_key(|b| b.created_at);
        Ok(found)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
