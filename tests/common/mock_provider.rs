//! Scripted stats provider for integration testing.
//!
//! Serves whatever snapshot (or error) the test last configured and
//! counts upstream calls, with no network access.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use propbet::data::{FetchError, SnapshotProvider};
use propbet::types::{GameStatus, LiveSnapshot, PlayerSnapshot, TeamSnapshot};

pub struct ScriptedProvider {
    current: Mutex<Result<LiveSnapshot, FetchError>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(initial: LiveSnapshot) -> Self {
        Self {
            current: Mutex::new(Ok(initial)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_snapshot(&self, snapshot: LiveSnapshot) {
        *self.current.lock().unwrap() = Ok(snapshot);
    }

    /// Fail every subsequent call with `error`.
    pub fn set_error(&self, error: FetchError) {
        *self.current.lock().unwrap() = Err(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotProvider for ScriptedProvider {
    async fn fetch_snapshot(&self, _league: &str, game_id: &str) -> Result<LiveSnapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut snapshot = self.current.lock().unwrap().clone()?;
        snapshot.game_id = game_id.to_string();
        snapshot.fetched_at = Utc::now();
        Ok(snapshot)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// Snapshot builders
// ---------------------------------------------------------------------------

pub const HOME_TEAM: &str = "2";
pub const AWAY_TEAM: &str = "12";

/// A two-team game. All listed players are on the home roster.
pub fn game(
    status: GameStatus,
    scores: (Option<f64>, Option<f64>),
    players: &[(&str, &str, &[(&str, f64)])],
) -> LiveSnapshot {
    let mut home = TeamSnapshot {
        team_id: HOME_TEAM.to_string(),
        abbreviation: "BUF".to_string(),
        name: "Buffalo Bills".to_string(),
        score: scores.0,
        players: HashMap::new(),
    };
    for (id, name, stats) in players {
        home.players.insert(
            id.to_string(),
            PlayerSnapshot {
                athlete_id: id.to_string(),
                full_name: name.to_string(),
                stats: stats.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            },
        );
    }
    let away = TeamSnapshot {
        team_id: AWAY_TEAM.to_string(),
        abbreviation: "KC".to_string(),
        name: "Kansas City Chiefs".to_string(),
        score: scores.1,
        players: HashMap::new(),
    };
    LiveSnapshot {
        game_id: String::new(),
        status,
        period: Some(2),
        teams: vec![home, away],
        fetched_at: Utc::now(),
    }
}

/// One player's single stat, game in progress.
pub fn player_stat(player_id: &str, stat: &str, value: f64) -> LiveSnapshot {
    game(
        GameStatus::InProgress,
        (Some(14.0), Some(10.0)),
        &[(player_id, "Josh Allen", &[(stat, value)])],
    )
}
