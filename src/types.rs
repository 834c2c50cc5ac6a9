//! Shared types for the PROPBET engine.
//!
//! These types form the data model used across all modules: bets and
//! their lifecycle, captured baselines, live snapshots from the stats
//! provider, queue job records, and the domain error enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::modes::ValidationError;

/// Bet identity.
pub type BetId = Uuid;

/// Opaque per-mode configuration, validated by the owning mode.
pub type BetConfig = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Bet
// ---------------------------------------------------------------------------

/// Lifecycle status of a bet. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    Open,
    Locked,
    Resolving,
    Resolved,
    Voided,
}

impl BetStatus {
    pub const ACTIVE: &'static [BetStatus] =
        &[BetStatus::Open, BetStatus::Locked, BetStatus::Resolving];

    /// Resolved and voided bets are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BetStatus::Resolved | BetStatus::Voided)
    }

    /// Whether `next` is a legal forward transition from `self`.
    pub fn can_advance_to(&self, next: BetStatus) -> bool {
        use BetStatus::*;
        matches!(
            (self, next),
            (Open, Locked)
                | (Locked, Resolving)
                | (Resolving, Resolved)
                | (Open, Voided)
                | (Locked, Voided)
                | (Resolving, Voided)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Open => "open",
            BetStatus::Locked => "locked",
            BetStatus::Resolving => "resolving",
            BetStatus::Resolved => "resolved",
            BetStatus::Voided => "voided",
        }
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BetStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(BetStatus::Open),
            "locked" => Ok(BetStatus::Locked),
            "resolving" => Ok(BetStatus::Resolving),
            "resolved" => Ok(BetStatus::Resolved),
            "voided" => Ok(BetStatus::Voided),
            other => anyhow::bail!("Unknown bet status: {other}"),
        }
    }
}

/// A peer-to-peer prop bet on a live game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub id: BetId,
    /// League key, lowercase: "nfl" | "nba"
    pub league: String,
    pub mode_key: String,
    /// Provider event id of the game the bet is on.
    pub game_id: String,
    pub config: BetConfig,
    pub status: BetStatus,
    /// Set once the bet is resolved.
    pub winning_choice: Option<String>,
    /// Set when the bet has been routed to manual review.
    pub review_reason: Option<String>,
    pub game_starts_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Bet {
    /// Build a fresh open bet.
    pub fn new(
        league: &str,
        mode_key: &str,
        game_id: &str,
        config: BetConfig,
        game_starts_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            league: league.trim().to_lowercase(),
            mode_key: mode_key.to_string(),
            game_id: game_id.to_string(),
            config,
            status: BetStatus::Open,
            winning_choice: None,
            review_reason: None,
            game_starts_at,
            created_at: now,
            updated_at: now,
            settled_at: None,
        }
    }

    pub fn needs_review(&self) -> bool {
        self.review_reason.is_some()
    }
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] bet {} on game {} ({})",
            self.league, self.mode_key, self.id, self.game_id, self.status
        )
    }
}

// ---------------------------------------------------------------------------
// Baseline
// ---------------------------------------------------------------------------

/// Identity of a captured baseline. One value per key, written once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaselineKey {
    pub bet_id: BetId,
    pub stat_key: String,
    pub player_id: String,
    pub game_id: String,
}

/// Stat value recorded at lock time, used as the zero-point for
/// `starting_now` bets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub key: BaselineKey,
    pub value: f64,
    pub captured_at: DateTime<Utc>,
}

impl Baseline {
    /// The game the value was read from.
    pub fn source_game_id(&self) -> &str {
        &self.key.game_id
    }

    /// Whether this baseline belongs to the given (player, stat) pair.
    pub fn matches(&self, player_id: &str, stat_key: &str) -> bool {
        self.key.player_id == player_id && self.key.stat_key == stat_key
    }
}

// ---------------------------------------------------------------------------
// Live snapshot
// ---------------------------------------------------------------------------

/// Game state as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Halftime,
    Final,
    Postponed,
    Cancelled,
    Unknown,
}

impl GameStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, GameStatus::Final)
    }

    /// The game will not be played (as scheduled).
    pub fn is_called_off(&self) -> bool {
        matches!(self, GameStatus::Postponed | GameStatus::Cancelled)
    }

    /// Map a provider status name such as `STATUS_FINAL`.
    pub fn from_provider_name(name: &str) -> Self {
        let n = name.trim().to_uppercase();
        if n.contains("FINAL") {
            GameStatus::Final
        } else if n.contains("HALFTIME") {
            GameStatus::Halftime
        } else if n.contains("IN_PROGRESS") || n.contains("END_PERIOD") || n.contains("DELAYED") {
            GameStatus::InProgress
        } else if n.contains("SCHEDULED") {
            GameStatus::Scheduled
        } else if n.contains("POSTPONED") {
            GameStatus::Postponed
        } else if n.contains("CANCELED") || n.contains("CANCELLED") {
            GameStatus::Cancelled
        } else {
            GameStatus::Unknown
        }
    }

    /// Map a provider short state (`pre` | `in` | `post`).
    pub fn from_provider_state(state: &str) -> Self {
        match state.trim().to_lowercase().as_str() {
            "pre" => GameStatus::Scheduled,
            "in" => GameStatus::InProgress,
            "post" => GameStatus::Final,
            "halftime" => GameStatus::Halftime,
            _ => GameStatus::Unknown,
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::InProgress => "in_progress",
            GameStatus::Halftime => "halftime",
            GameStatus::Final => "final",
            GameStatus::Postponed => "postponed",
            GameStatus::Cancelled => "cancelled",
            GameStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One player's stat line inside a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub athlete_id: String,
    pub full_name: String,
    /// stat name → value. Bare names and `category.name` both present.
    pub stats: HashMap<String, f64>,
}

impl PlayerSnapshot {
    pub fn stat(&self, key: &str) -> Option<f64> {
        self.stats.get(key).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamSnapshot {
    pub team_id: String,
    pub abbreviation: String,
    pub name: String,
    pub score: Option<f64>,
    /// athlete id → player
    pub players: HashMap<String, PlayerSnapshot>,
}

/// Point-in-time read of a game's live statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    pub game_id: String,
    pub status: GameStatus,
    pub period: Option<u32>,
    pub teams: Vec<TeamSnapshot>,
    pub fetched_at: DateTime<Utc>,
}

impl LiveSnapshot {
    /// Locate a player anywhere in the game by athlete id.
    pub fn find_player(&self, player_id: &str) -> Option<&PlayerSnapshot> {
        self.teams.iter().find_map(|t| t.players.get(player_id))
    }

    pub fn find_team(&self, team_id: &str) -> Option<&TeamSnapshot> {
        self.teams.iter().find(|t| t.team_id == team_id)
    }

    /// Helper to build a one-team test snapshot from (id, name, stats) rows.
    #[cfg(test)]
    pub fn sample(status: GameStatus, players: &[(&str, &str, &[(&str, f64)])]) -> Self {
        let mut team = TeamSnapshot {
            team_id: "1".to_string(),
            abbreviation: "HOME".to_string(),
            name: "Home Team".to_string(),
            score: None,
            players: HashMap::new(),
        };
        for (id, name, stats) in players {
            team.players.insert(
                id.to_string(),
                PlayerSnapshot {
                    athlete_id: id.to_string(),
                    full_name: name.to_string(),
                    stats: stats.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                },
            );
        }
        LiveSnapshot {
            game_id: "401547403".to_string(),
            status,
            period: Some(2),
            teams: vec![team],
            fetched_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Record shape shared by both queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub bet_id: BetId,
    pub attempt: u32,
    pub scheduled_at: DateTime<Utc>,
}

/// Classification of the last failure seen by a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Worth retrying: network, timeout, breaker open, storage hiccup.
    Transient,
    /// Retrying cannot help: unknown mode, bad stat key, malformed data.
    Permanent,
    /// Not a failure: baseline or player data not there yet.
    NotEvaluable,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Permanent => write!(f, "permanent"),
            FailureKind::NotEvaluable => write!(f, "not_evaluable"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for PROPBET.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid bet configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("No mode '{mode}' registered for league '{league}'")]
    ModeNotFound { league: String, mode: String },

    #[error("Bet not found: {0}")]
    BetNotFound(BetId),

    #[error("Illegal status transition {from} -> {to} for bet {bet_id}")]
    InvalidTransition {
        bet_id: BetId,
        from: BetStatus,
        to: BetStatus,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            EngineError::Storage(_) => FailureKind::Transient,
            _ => FailureKind::Permanent,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
