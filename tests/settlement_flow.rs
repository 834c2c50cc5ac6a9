//! End-to-end settlement scenarios: proposal through lock, baseline
//! capture and resolution, driven by a manual clock and a scripted
//! provider.

mod common;

use chrono::Duration;
use serde_json::{json, Value};
use std::sync::Arc;

use common::flaky_store::FlakyStore;
use common::mock_provider::{game, player_stat, AWAY_TEAM, HOME_TEAM};
use common::{kickoff, Harness, GAME_ID};
use propbet::data::FetchError;
use propbet::engine::lifecycle::LifecycleKind;
use propbet::engine::settlement::RecoverySummary;
use propbet::engine::{JobDisposition, ProposeRequest};
use propbet::storage::{BetStore, MemoryStore, SqliteStore};
use propbet::types::{BetStatus, EngineError, FailureKind, GameStatus};

fn request(league: &str, mode: &str, config: Value) -> ProposeRequest {
    ProposeRequest {
        league: league.to_string(),
        mode_key: mode.to_string(),
        game_id: GAME_ID.to_string(),
        config: config.as_object().cloned().unwrap(),
        game_starts_at: kickoff(),
    }
}

fn prop(line: f64, progress: &str) -> ProposeRequest {
    request(
        "nfl",
        "prop_hunt",
        json!({
            "playerId": "p1", "playerName": "Josh Allen",
            "stat": "passingYards", "line": line, "progressMode": progress
        }),
    )
}

fn rescheduled(kind: FailureKind) -> impl Fn(&JobDisposition) -> bool {
    move |d| matches!(d, JobDisposition::Rescheduled { kind: k, .. } if *k == kind)
}

#[tokio::test]
async fn test_starting_now_prop_measures_from_lock() {
    let store = Arc::new(MemoryStore::new());
    let h = Harness::new(
        store.clone(),
        player_stat("p1", "passingYards", 120.0),
        kickoff() - Duration::hours(1),
    );

    let bet = h.engine.propose_bet(prop(50.0, "starting_now")).await.unwrap();
    assert_eq!(bet.status, BetStatus::Open);
    assert!(h.engine.run_pending().await.is_empty());
    assert_eq!(h.provider.calls(), 0);

    // Kickoff: lock, capture 120 as the zero-point, first evaluation sees +0.
    h.clock.set(kickoff());
    let results = h.engine.run_pending().await;
    assert_eq!(results.len(), 1);
    assert!(rescheduled(FailureKind::NotEvaluable)(&results[0]));

    let baselines = store.load_baselines(bet.id).await.unwrap();
    assert_eq!(baselines.len(), 1);
    assert_eq!(baselines[0].value, 120.0);
    assert_eq!(baselines[0].key.game_id, GAME_ID);
    assert_eq!(
        h.engine.get_bet(bet.id).await.unwrap().status,
        BetStatus::Resolving
    );

    // +30 since lock: still under the line.
    h.provider.set_snapshot(player_stat("p1", "passingYards", 150.0));
    let results = h.step(Duration::seconds(15)).await;
    assert!(rescheduled(FailureKind::NotEvaluable)(&results[0]));

    // +55 since lock: crosses 50 even though the game total crossed long ago.
    h.provider.set_snapshot(player_stat("p1", "passingYards", 175.0));
    let results = h.step(Duration::seconds(15)).await;
    assert_eq!(
        results,
        vec![JobDisposition::Resolved {
            winning_choice: "over".into()
        }]
    );

    let stored = h.engine.get_bet(bet.id).await.unwrap();
    assert_eq!(stored.status, BetStatus::Resolved);
    assert_eq!(stored.winning_choice.as_deref(), Some("over"));
    assert!(stored.settled_at.is_some());
    assert_eq!(h.provider.calls(), 3);

    let status = h.engine.status();
    assert_eq!(status.resolution_queue_depth, 0);
    assert_eq!(status.lifecycle_queue_depth, 0);
}

#[tokio::test]
async fn test_either_or_settles_at_final_on_sqlite() {
    let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
    let snapshot = |status, a, b| {
        game(
            status,
            (Some(100.0), Some(98.0)),
            &[
                ("p1", "Jayson Tatum", &[("points", a)]),
                ("p2", "Jaylen Brown", &[("points", b)]),
            ],
        )
    };
    let h = Harness::new(
        store.clone(),
        snapshot(GameStatus::InProgress, 20.0, 25.0),
        kickoff(),
    );

    let bet = h
        .engine
        .propose_bet(request(
            "NBA",
            "either_or",
            json!({
                "player1Id": "p1", "player1Name": "Jayson Tatum",
                "player2Id": "p2", "player2Name": "Jaylen Brown",
                "stat": "points", "progressMode": "cumulative"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(bet.league, "nba");

    // In progress: a lead is not a result.
    let results = h.engine.run_pending().await;
    assert!(rescheduled(FailureKind::NotEvaluable)(&results[0]));

    h.provider.set_snapshot(snapshot(GameStatus::Final, 31.0, 28.0));
    let results = h.step(Duration::seconds(15)).await;
    assert_eq!(
        results,
        vec![JobDisposition::Resolved {
            winning_choice: "Jayson Tatum".into()
        }]
    );

    let stored = store.load_bet(bet.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BetStatus::Resolved);
    assert_eq!(stored.winning_choice.as_deref(), Some("Jayson Tatum"));
}

#[tokio::test]
async fn test_postponed_game_voids_bet() {
    let h = Harness::new(
        Arc::new(MemoryStore::new()),
        game(GameStatus::Postponed, (None, None), &[]),
        kickoff(),
    );

    let bet = h
        .engine
        .propose_bet(request(
            "nfl",
            "choose_winner",
            json!({
                "homeTeamId": HOME_TEAM, "homeTeamName": "Bills",
                "awayTeamId": AWAY_TEAM, "awayTeamName": "Chiefs"
            }),
        ))
        .await
        .unwrap();

    let results = h.engine.run_pending().await;
    assert_eq!(
        results,
        vec![JobDisposition::Voided {
            reason: "game postponed".into()
        }]
    );
    let stored = h.engine.get_bet(bet.id).await.unwrap();
    assert_eq!(stored.status, BetStatus::Voided);
    assert_eq!(stored.winning_choice, None);
}

#[tokio::test]
async fn test_provider_outage_exhausts_budget_into_manual_review() {
    let h = Harness::new(
        Arc::new(MemoryStore::new()),
        player_stat("p1", "passingYards", 0.0),
        kickoff(),
    );
    h.provider
        .set_error(FetchError::Network("connection reset".into()));

    let bet = h.engine.propose_bet(prop(50.0, "cumulative")).await.unwrap();

    let results = h.engine.run_pending().await;
    assert_eq!(
        results,
        vec![JobDisposition::Rescheduled {
            attempt: 1,
            kind: FailureKind::Transient
        }]
    );

    let results = h.step(Duration::seconds(10)).await;
    assert_eq!(
        results,
        vec![JobDisposition::Rescheduled {
            attempt: 2,
            kind: FailureKind::Transient
        }]
    );

    let results = h.step(Duration::seconds(10)).await;
    assert_eq!(
        results,
        vec![JobDisposition::ManualReview {
            reason: "retry_budget_exhausted"
        }]
    );
    assert_eq!(h.provider.calls(), 3);

    let stored = h.engine.get_bet(bet.id).await.unwrap();
    assert_eq!(stored.status, BetStatus::Resolving);
    assert!(stored
        .review_reason
        .as_deref()
        .is_some_and(|r| r.contains("retry_budget_exhausted")));
    assert_eq!(
        h.engine.metrics().counter_value(
            "manual_reviews_total",
            &[("reason", "retry_budget_exhausted")]
        ),
        1
    );

    // Flagged bets are left for operators, not voided at the deadline.
    h.clock.set(kickoff() + Duration::hours(9));
    assert!(h.engine.run_pending().await.is_empty());
    assert_eq!(
        h.engine.get_bet(bet.id).await.unwrap().status,
        BetStatus::Resolving
    );
}

#[tokio::test]
async fn test_void_drops_pending_resolution() {
    let h = Harness::new(
        Arc::new(MemoryStore::new()),
        player_stat("p1", "passingYards", 10.0),
        kickoff(),
    );
    let bet = h.engine.propose_bet(prop(50.0, "cumulative")).await.unwrap();

    let results = h.engine.run_pending().await;
    assert!(rescheduled(FailureKind::NotEvaluable)(&results[0]));
    assert!(h.engine.resolution_queue().contains(bet.id));

    let voided = h.engine.void_bet(bet.id, "host cancelled").await.unwrap();
    assert_eq!(voided.status, BetStatus::Voided);
    assert!(!h.engine.resolution_queue().contains(bet.id));

    // The line is crossed now, but the bet is gone.
    h.provider
        .set_snapshot(player_stat("p1", "passingYards", 80.0));
    assert!(h.step(Duration::seconds(15)).await.is_empty());
    assert_eq!(
        h.engine.get_bet(bet.id).await.unwrap().winning_choice,
        None
    );

    assert!(matches!(
        h.engine.void_bet(bet.id, "again").await,
        Err(EngineError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_bets_on_one_game_share_a_fetch() {
    let h = Harness::new(
        Arc::new(MemoryStore::new()),
        player_stat("p1", "passingYards", 80.0),
        kickoff(),
    );
    for line in [50.0, 70.0, 100.0] {
        h.engine
            .propose_bet(prop(line, "cumulative"))
            .await
            .unwrap();
    }

    let results = h.engine.run_pending().await;
    assert_eq!(results.len(), 3);
    let resolved = results
        .iter()
        .filter(|d| matches!(d, JobDisposition::Resolved { .. }))
        .count();
    assert_eq!(resolved, 2);
    assert_eq!(h.provider.calls(), 1);
    assert_eq!(h.engine.resolution_queue().depth(), 1);
}

#[tokio::test]
async fn test_restart_recovers_from_store() {
    let store = Arc::new(MemoryStore::new());
    let first = Harness::new(
        store.clone(),
        player_stat("p1", "passingYards", 10.0),
        kickoff() - Duration::hours(1),
    );

    let early = first.engine.propose_bet(prop(50.0, "cumulative")).await.unwrap();
    let mut later_req = prop(50.0, "cumulative");
    later_req.game_starts_at = kickoff() + Duration::hours(3);
    let later = first.engine.propose_bet(later_req).await.unwrap();

    first.clock.set(kickoff());
    first.engine.run_pending().await;
    assert_eq!(
        store.load_bet(early.id).await.unwrap().unwrap().status,
        BetStatus::Resolving
    );

    // A fresh process over the same store.
    let second = Harness::new(
        store.clone(),
        player_stat("p1", "passingYards", 80.0),
        kickoff() + Duration::minutes(1),
    );
    let summary = second.engine.recover().await.unwrap();
    assert_eq!(
        summary,
        RecoverySummary {
            open: 1,
            locked: 0,
            resolving: 1,
            awaiting_review: 0,
        }
    );

    let results = second.engine.run_pending().await;
    assert_eq!(
        results,
        vec![JobDisposition::Resolved {
            winning_choice: "over".into()
        }]
    );

    second.clock.set(kickoff() + Duration::hours(3));
    second.engine.run_pending().await;
    let stored = store.load_bet(later.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BetStatus::Resolved);
    assert_eq!(stored.winning_choice.as_deref(), Some("over"));
}

#[tokio::test]
async fn test_failed_void_writes_keep_bet_scheduled() {
    let store = Arc::new(FlakyStore::new());
    let h = Harness::new(
        store.clone(),
        player_stat("p1", "passingYards", 10.0),
        kickoff(),
    );
    let bet = h.engine.propose_bet(prop(50.0, "cumulative")).await.unwrap();
    let results = h.engine.run_pending().await;
    assert!(rescheduled(FailureKind::NotEvaluable)(&results[0]));

    // A host void that cannot be stored leaves all work in place.
    store.fail_voids(2);
    assert!(matches!(
        h.engine.void_bet(bet.id, "host cancelled").await,
        Err(EngineError::Storage(_))
    ));
    assert!(h.engine.resolution_queue().contains(bet.id));
    assert!(h
        .engine
        .lifecycle_queue()
        .has_pending(bet.id, LifecycleKind::VoidDeadline));

    // The deadline void fails once and is retried.
    h.clock.set(kickoff() + Duration::hours(8));
    h.engine.run_pending().await;
    let stored = h.engine.get_bet(bet.id).await.unwrap();
    assert_eq!(stored.status, BetStatus::Resolving);
    assert!(h
        .engine
        .lifecycle_queue()
        .has_pending(bet.id, LifecycleKind::VoidDeadline));

    h.step(Duration::seconds(10)).await;
    let stored = h.engine.get_bet(bet.id).await.unwrap();
    assert_eq!(stored.status, BetStatus::Voided);
    assert_eq!(stored.winning_choice, None);
    let status = h.engine.status();
    assert_eq!(status.resolution_queue_depth, 0);
    assert_eq!(status.lifecycle_queue_depth, 0);
}

#[tokio::test]
async fn test_unstored_review_flag_keeps_job_alive() {
    let store = Arc::new(FlakyStore::new());
    let h = Harness::new(
        store.clone(),
        player_stat("p1", "passingYards", 0.0),
        kickoff(),
    );
    h.provider
        .set_error(FetchError::Network("connection reset".into()));
    let bet = h.engine.propose_bet(prop(50.0, "cumulative")).await.unwrap();

    h.engine.run_pending().await;
    h.step(Duration::seconds(10)).await;

    // Budget spent, but the flag cannot be written: the job is held.
    store.fail_flags(1);
    let results = h.step(Duration::seconds(10)).await;
    assert_eq!(
        results,
        vec![JobDisposition::Rescheduled {
            attempt: 2,
            kind: FailureKind::Transient
        }]
    );
    let stored = h.engine.get_bet(bet.id).await.unwrap();
    assert_eq!(stored.review_reason, None);
    assert!(h.engine.resolution_queue().contains(bet.id));
    assert!(h
        .engine
        .lifecycle_queue()
        .has_pending(bet.id, LifecycleKind::VoidDeadline));

    let results = h.step(Duration::seconds(10)).await;
    assert_eq!(
        results,
        vec![JobDisposition::ManualReview {
            reason: "retry_budget_exhausted"
        }]
    );
    let stored = h.engine.get_bet(bet.id).await.unwrap();
    assert!(stored.needs_review());
    assert_eq!(h.engine.lifecycle_queue().depth(), 0);
    assert_eq!(
        h.engine.metrics().counter_value(
            "manual_reviews_total",
            &[("reason", "retry_budget_exhausted")]
        ),
        1
    );
}
