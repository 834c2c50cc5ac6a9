//! Baseline capture at lock time.
//!
//! For each (player, stat) a mode asks for, read the current value from
//! a fresh snapshot and store it once. Keys that already have a value
//! are left alone, so repeated captures never move the zero-point.

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::data::fetcher::SnapshotFetcher;
use crate::metrics::Metrics;
use crate::modes::GameMode;
use crate::storage::BetStore;
use crate::types::{Baseline, BaselineKey, Bet, FailureKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The mode needs no baseline for this config.
    NotRequired,
    /// Every key already had a value; nothing fetched.
    AlreadyCaptured,
    /// `written` new values stored.
    Captured { written: usize },
}

impl CaptureOutcome {
    fn label(&self) -> &'static str {
        match self {
            CaptureOutcome::NotRequired => "not_required",
            CaptureOutcome::AlreadyCaptured => "already_captured",
            CaptureOutcome::Captured { .. } => "captured",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("baseline capture failed ({kind}): {message}")]
pub struct CaptureError {
    pub kind: FailureKind,
    pub message: String,
}

impl CaptureError {
    fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

pub struct BaselineService {
    fetcher: Arc<SnapshotFetcher>,
    store: Arc<dyn BetStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

impl BaselineService {
    pub fn new(
        fetcher: Arc<SnapshotFetcher>,
        store: Arc<dyn BetStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            fetcher,
            store,
            clock,
            metrics,
        }
    }

    pub async fn capture(&self, bet: &Bet, mode: &dyn GameMode) -> Result<CaptureOutcome, CaptureError> {
        let result = self.capture_inner(bet, mode).await;
        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(e) if e.is_transient() => "transient_failure",
            Err(_) => "permanent_failure",
        };
        self.metrics.inc_baseline_capture(label);
        result
    }

    async fn capture_inner(&self, bet: &Bet, mode: &dyn GameMode) -> Result<CaptureOutcome, CaptureError> {
        let targets = mode.baseline_targets(&bet.config);
        if targets.is_empty() {
            return Ok(CaptureOutcome::NotRequired);
        }

        let keys: Vec<BaselineKey> = targets
            .into_iter()
            .map(|target| BaselineKey {
                bet_id: bet.id,
                stat_key: target.stat_key,
                player_id: target.player_id,
                game_id: bet.game_id.clone(),
            })
            .collect();
        let existing = try_join_all(keys.iter().map(|key| self.store.load_baseline(key)))
            .await
            .map_err(|e| CaptureError::transient(e.to_string()))?;
        let missing: Vec<BaselineKey> = keys
            .into_iter()
            .zip(existing)
            .filter(|(_, found)| found.is_none())
            .map(|(key, _)| key)
            .collect();
        if missing.is_empty() {
            debug!(bet_id = %bet.id, "Baselines already captured");
            return Ok(CaptureOutcome::AlreadyCaptured);
        }

        let snapshot = self
            .fetcher
            .fetch(&bet.league, &bet.game_id)
            .await
            .map_err(|e| CaptureError {
                kind: e.kind(),
                message: e.to_string(),
            })?;

        let captured_at = self.clock.now();
        let mut written = 0;
        for key in missing {
            let value = match snapshot.find_player(&key.player_id) {
                // Not in the box score yet: nothing accrued.
                None => 0.0,
                Some(player) => player.stat(&key.stat_key).ok_or_else(|| {
                    CaptureError::permanent(format!(
                        "stat '{}' not reported for player {}",
                        key.stat_key, key.player_id
                    ))
                })?,
            };
            let baseline = Baseline {
                key,
                value,
                captured_at,
            };
            let stored = self
                .store
                .save_baseline(&baseline)
                .await
                .map_err(|e| CaptureError::transient(e.to_string()))?;
            if stored {
                written += 1;
                info!(
                    bet_id = %bet.id,
                    player_id = %baseline.key.player_id,
                    stat = %baseline.key.stat_key,
                    value,
                    "Baseline captured"
                );
            }
        }

        Ok(CaptureOutcome::Captured { written })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::data::breaker::{BreakerConfig, CircuitBreaker};
    use crate::data::fetcher::FetcherConfig;
    use crate::data::espn::refine_summary;
    use crate::data::{FetchError, MockSnapshotProvider, SnapshotProvider};
    use crate::modes::catalog::StatCatalog;
    use crate::modes::threshold::PropHuntMode;
    use crate::storage::MemoryStore;
    use crate::types::{BetConfig, GameStatus, LiveSnapshot};
    use chrono::{Duration, Utc};
    use serde_json::json;

    struct Harness {
        service: BaselineService,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        metrics: Arc<Metrics>,
    }

    fn harness(provider: MockSnapshotProvider) -> Harness {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let metrics = Arc::new(Metrics::default());
        let store = Arc::new(MemoryStore::new());
        let provider: Arc<dyn SnapshotProvider> = Arc::new(provider);
        let breaker = Arc::new(CircuitBreaker::new("mock", BreakerConfig::default(), clock.clone()));
        let fetcher = Arc::new(SnapshotFetcher::new(
            provider,
            breaker,
            clock.clone(),
            metrics.clone(),
            FetcherConfig::default(),
        ));
        Harness {
            service: BaselineService::new(fetcher, store.clone(), clock.clone(), metrics.clone()),
            store,
            clock,
            metrics,
        }
    }

    fn bet(progress: &str) -> Bet {
        let config: BetConfig = json!({
            "playerId": "p1", "playerName": "Player One",
            "stat": "passingYards", "line": 50, "progressMode": progress
        })
        .as_object()
        .cloned()
        .unwrap();
        let now = Utc::now();
        Bet::new("nfl", "prop_hunt", "401547403", config, now, now)
    }

    fn snapshot(yards: f64) -> LiveSnapshot {
        LiveSnapshot::sample(GameStatus::InProgress, &[("p1", "Player One", &[("passingYards", yards)])])
    }

    fn key(bet: &Bet) -> BaselineKey {
        BaselineKey {
            bet_id: bet.id,
            stat_key: "passingYards".into(),
            player_id: "p1".into(),
            game_id: "401547403".into(),
        }
    }

    #[tokio::test]
    async fn test_capture_twice_keeps_first_value() {
        let mut mock = MockSnapshotProvider::new();
        mock.expect_name().return_const("mock");
        let mut seq = mockall::Sequence::new();
        mock.expect_fetch_snapshot()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(snapshot(30.0)));
        mock.expect_fetch_snapshot()
            .times(0..)
            .returning(|_, _| Ok(snapshot(90.0)));

        let h = harness(mock);
        let mode = PropHuntMode::new(StatCatalog::nfl());
        let b = bet("starting_now");

        let first = h.service.capture(&b, &mode).await.unwrap();
        assert_eq!(first, CaptureOutcome::Captured { written: 1 });

        h.clock.advance(Duration::minutes(10));
        let second = h.service.capture(&b, &mode).await.unwrap();
        assert_eq!(second, CaptureOutcome::AlreadyCaptured);

        let stored = h.store.load_baseline(&key(&b)).await.unwrap().unwrap();
        assert_eq!(stored.value, 30.0);
        assert_eq!(stored.source_game_id(), "401547403");
    }

    #[tokio::test]
    async fn test_cumulative_needs_no_baseline() {
        let mut mock = MockSnapshotProvider::new();
        mock.expect_name().return_const("mock");
        mock.expect_fetch_snapshot().times(0);

        let h = harness(mock);
        let mode = PropHuntMode::new(StatCatalog::nfl());
        let outcome = h.service.capture(&bet("cumulative"), &mode).await.unwrap();
        assert_eq!(outcome, CaptureOutcome::NotRequired);
    }

    #[tokio::test]
    async fn test_absent_player_captures_zero() {
        let mut mock = MockSnapshotProvider::new();
        mock.expect_name().return_const("mock");
        mock.expect_fetch_snapshot()
            .returning(|_, _| Ok(LiveSnapshot::sample(GameStatus::Scheduled, &[])));

        let h = harness(mock);
        let mode = PropHuntMode::new(StatCatalog::nfl());
        let b = bet("starting_now");
        h.service.capture(&b, &mode).await.unwrap();
        assert_eq!(h.store.load_baseline(&key(&b)).await.unwrap().unwrap().value, 0.0);
    }

    #[tokio::test]
    async fn test_fetch_failure_classified() {
        let mut mock = MockSnapshotProvider::new();
        mock.expect_name().return_const("mock");
        mock.expect_fetch_snapshot()
            .returning(|_, _| Err(FetchError::Network("reset".into())));

        let h = harness(mock);
        let mode = PropHuntMode::new(StatCatalog::nfl());
        let err = h.service.capture(&bet("starting_now"), &mode).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(
            h.metrics.counter_value("baseline_captures_total", &[("outcome", "transient_failure")]),
            1
        );
    }

    #[tokio::test]
    async fn test_player_yet_to_record_stat_captures_zero() {
        // p1 has run the ball but not thrown yet.
        let raw = json!({
            "header": {"competitions": [{"status": {"type": {"name": "STATUS_IN_PROGRESS"}}}]},
            "boxscore": {"players": [{
                "team": {"id": "2"},
                "statistics": [{
                    "name": "rushing",
                    "keys": ["rushingAttempts", "rushingYards"],
                    "athletes": [{"athlete": {"id": "p1", "displayName": "Player One"}, "stats": ["3", "12"]}]
                }]
            }]}
        });
        let mut mock = MockSnapshotProvider::new();
        mock.expect_name().return_const("mock");
        mock.expect_fetch_snapshot()
            .returning(move |league, game_id| refine_summary(&raw, league, game_id));

        let h = harness(mock);
        let mode = PropHuntMode::new(StatCatalog::nfl());
        let b = bet("starting_now");
        let outcome = h.service.capture(&b, &mode).await.unwrap();
        assert_eq!(outcome, CaptureOutcome::Captured { written: 1 });
        assert_eq!(h.store.load_baseline(&key(&b)).await.unwrap().unwrap().value, 0.0);
    }

    #[tokio::test]
    async fn test_stat_outside_catalog_is_permanent() {
        let mut mock = MockSnapshotProvider::new();
        mock.expect_name().return_const("mock");
        mock.expect_fetch_snapshot().returning(|_, _| {
            Ok(LiveSnapshot::sample(
                GameStatus::InProgress,
                &[("p1", "Player One", &[("rushingYards", 12.0)])],
            ))
        });

        let h = harness(mock);
        let mode = PropHuntMode::new(StatCatalog::nfl());
        let mut b = bet("starting_now");
        b.config.insert("stat".into(), json!("hotDogsEaten"));
        let err = h.service.capture(&b, &mode).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Permanent);
    }
}
