//! Game modes and the per-league mode registry.
//!
//! Defines the `GameMode` trait (how a bet's winning condition is
//! configured, validated and evaluated) and the `ModeRegistry` lookup
//! table built once at startup. Modes are pure: no I/O.

pub mod catalog;
pub mod head_to_head;
pub mod threshold;
pub mod winner;

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{Baseline, BetConfig, EngineError, LiveSnapshot};
use catalog::StatCatalog;
use head_to_head::EitherOrMode;
use threshold::PropHuntMode;
use winner::ChooseWinnerMode;

// ---------------------------------------------------------------------------
// Mode contract
// ---------------------------------------------------------------------------

/// A bad mode config, surfaced to the proposer before the bet exists.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("unknown stat '{stat}' for league '{league}'")]
    UnknownStat { league: String, stat: String },
}

/// One step of the bet-proposal wizard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigStep {
    pub key: &'static str,
    pub prompt: &'static str,
    pub input: StepInput,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepInput {
    Player,
    Team,
    Stat { options: Vec<String> },
    Number { min: f64, step: f64 },
    Choice { options: Vec<String> },
}

/// A (player, stat) pair whose value must be captured at lock time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineTarget {
    pub player_id: String,
    pub stat_key: String,
}

/// What a mode concluded from one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome {
    /// Definitive: settle with this choice.
    Decided {
        winning_choice: String,
        metric_value: Option<f64>,
    },
    /// Evaluated, but the game can still change the answer.
    Pending { metric_value: Option<f64> },
    /// Inputs not there yet (baseline, player not reporting). Retry quietly.
    NotEvaluable(String),
    /// No winner can exist (tie, did not play). Void the bet.
    Void(String),
    /// Broken config discovered at evaluation time. Never retried.
    Invalid(String),
}

impl EvalOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            EvalOutcome::Decided { .. } => "decided",
            EvalOutcome::Pending { .. } => "pending",
            EvalOutcome::NotEvaluable(_) => "not_evaluable",
            EvalOutcome::Void(_) => "void",
            EvalOutcome::Invalid(_) => "invalid",
        }
    }
}

/// Pluggable definition of how a bet is configured and settled.
pub trait GameMode: Send + Sync {
    fn key(&self) -> &'static str;

    fn label(&self) -> &'static str;

    /// The choices participants pick between for this config.
    fn winning_choices(&self, config: &BetConfig) -> Vec<String>;

    fn validate(&self, config: &BetConfig) -> Result<(), ValidationError>;

    fn config_steps(&self) -> Vec<ConfigStep>;

    /// Stats that must be captured when the bet locks.
    fn baseline_targets(&self, _config: &BetConfig) -> Vec<BaselineTarget> {
        Vec::new()
    }

    fn evaluate(
        &self,
        snapshot: &LiveSnapshot,
        config: &BetConfig,
        baselines: &[Baseline],
    ) -> EvalOutcome;
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// Read a non-empty identifier-like field. Numbers are accepted and
/// rendered as strings (provider ids are often numeric in JSON).
pub fn field_string(config: &BetConfig, field: &str) -> Option<String> {
    match config.get(field)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn require_string(
    config: &BetConfig,
    field: &'static str,
) -> Result<String, ValidationError> {
    field_string(config, field).ok_or(ValidationError::MissingField(field))
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Lookup table of modes keyed by (league, mode key).
#[derive(Default)]
pub struct ModeRegistry {
    modes: HashMap<(String, String), Arc<dyn GameMode>>,
}

impl ModeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in mode for NFL and NBA.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for catalog in [StatCatalog::nfl(), StatCatalog::nba()] {
            let league = catalog.league();
            registry.register(league, Arc::new(PropHuntMode::new(catalog.clone())));
            registry.register(league, Arc::new(EitherOrMode::new(catalog.clone())));
            registry.register(league, Arc::new(ChooseWinnerMode));
        }
        registry
    }

    /// Register (or replace) a mode for a league.
    pub fn register(&mut self, league: &str, mode: Arc<dyn GameMode>) {
        let key = (league.trim().to_lowercase(), mode.key().to_string());
        self.modes.insert(key, mode);
    }

    pub fn lookup(&self, league: &str, key: &str) -> Result<Arc<dyn GameMode>, EngineError> {
        let league = league.trim().to_lowercase();
        self.modes
            .get(&(league.clone(), key.to_string()))
            .cloned()
            .ok_or_else(|| EngineError::ModeNotFound {
                league,
                mode: key.to_string(),
            })
    }

    /// Modes registered for a league, sorted by key.
    pub fn modes(&self, league: &str) -> Vec<Arc<dyn GameMode>> {
        let league = league.trim().to_lowercase();
        let mut found: Vec<_> = self
            .modes
            .iter()
            .filter(|((l, _), _)| *l == league)
            .map(|(_, m)| m.clone())
            .collect();
        found.sort_by_key(|m| m.key());
        found
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(v: serde_json::Value) -> BetConfig {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_standard_registry_has_all_modes() {
        let registry = ModeRegistry::standard();
        assert_eq!(registry.len(), 6);
        for league in ["nfl", "nba"] {
            for key in ["prop_hunt", "either_or", "choose_winner"] {
                assert!(registry.lookup(league, key).is_ok(), "{league}/{key}");
            }
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive_on_league() {
        let registry = ModeRegistry::standard();
        let mode = registry.lookup("NFL", "prop_hunt").unwrap();
        assert_eq!(mode.key(), "prop_hunt");
    }

    #[test]
    fn test_lookup_missing_mode() {
        let registry = ModeRegistry::standard();
        match registry.lookup("nfl", "king_of_the_hill") {
            Err(EngineError::ModeNotFound { league, mode }) => {
                assert_eq!(league, "nfl");
                assert_eq!(mode, "king_of_the_hill");
            }
            _ => panic!("expected ModeNotFound"),
        }
        assert!(registry.lookup("mlb", "prop_hunt").is_err());
    }

    #[test]
    fn test_modes_listing_sorted() {
        let registry = ModeRegistry::standard();
        let keys: Vec<_> = registry.modes("nba").iter().map(|m| m.key()).collect();
        assert_eq!(keys, vec!["choose_winner", "either_or", "prop_hunt"]);
        assert!(registry.modes("mlb").is_empty());
    }

    #[test]
    fn test_field_string_accepts_numbers() {
        let cfg = config(json!({"playerId": 3139477, "name": "  ", "other": "abc"}));
        assert_eq!(field_string(&cfg, "playerId").as_deref(), Some("3139477"));
        assert_eq!(field_string(&cfg, "name"), None);
        assert_eq!(field_string(&cfg, "other").as_deref(), Some("abc"));
        assert_eq!(field_string(&cfg, "missing"), None);
    }

    #[test]
    fn test_step_input_serializes_tagged() {
        let step = ConfigStep {
            key: "line",
            prompt: "Set the line",
            input: StepInput::Number { min: 0.0, step: 0.5 },
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["input"]["type"], "number");
        assert_eq!(json["input"]["step"], 0.5);
    }
}
