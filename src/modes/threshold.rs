//! Threshold-crossing evaluation and the `prop_hunt` over/under mode.
//!
//! A prop is a player stat against a line. In `cumulative` progress mode
//! the whole-game value counts; in `starting_now` only what the player
//! adds after the bet locks counts, measured against a captured baseline.

use serde::Serialize;
use std::fmt;

use super::catalog::StatCatalog;
use super::{
    field_string, require_string, BaselineTarget, ConfigStep, EvalOutcome, GameMode, StepInput,
    ValidationError,
};
use crate::types::{Baseline, BetConfig, LiveSnapshot};

pub const CHOICE_OVER: &str = "over";
pub const CHOICE_UNDER: &str = "under";

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMode {
    Cumulative,
    StartingNow,
}

impl ProgressMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressMode::Cumulative => "cumulative",
            ProgressMode::StartingNow => "starting_now",
        }
    }
}

impl fmt::Display for ProgressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything other than the two known literals means `starting_now`.
pub fn normalize_progress_mode(raw: Option<&str>) -> ProgressMode {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("cumulative") => ProgressMode::Cumulative,
        _ => ProgressMode::StartingNow,
    }
}

pub(crate) fn progress_mode_of(config: &BetConfig) -> ProgressMode {
    normalize_progress_mode(config.get("progressMode").and_then(|v| v.as_str()))
}

/// Resolve the line, preferring the numeric `line_value` field.
/// Returns `None` when no usable number is present.
pub fn normalize_line(config: &BetConfig) -> Option<f64> {
    if let Some(v) = config.get("line_value").and_then(|v| v.as_f64()) {
        if v.is_finite() {
            return Some(v);
        }
    }
    match config.get("line")? {
        serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Metric reading
// ---------------------------------------------------------------------------

/// Result of reading one player's stat relative to the progress mode.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MetricRead {
    Value {
        current: f64,
        metric: f64,
        baseline: Option<f64>,
    },
    PlayerAbsent,
    MissingBaseline {
        current: f64,
    },
    UnknownStat,
}

pub(crate) fn read_metric(
    snapshot: &LiveSnapshot,
    player_id: &str,
    stat: &str,
    mode: ProgressMode,
    baseline: Option<&Baseline>,
) -> MetricRead {
    let Some(player) = snapshot.find_player(player_id) else {
        return MetricRead::PlayerAbsent;
    };
    let Some(current) = player.stat(stat) else {
        return MetricRead::UnknownStat;
    };
    match mode {
        ProgressMode::Cumulative => MetricRead::Value {
            current,
            metric: current,
            baseline: None,
        },
        ProgressMode::StartingNow => match baseline {
            Some(b) => MetricRead::Value {
                current,
                metric: current - b.value,
                baseline: Some(b.value),
            },
            None => MetricRead::MissingBaseline { current },
        },
    }
}

// ---------------------------------------------------------------------------
// Threshold evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdReading {
    pub crossed: bool,
    pub current_value: f64,
    /// Value compared against the line (current minus baseline for
    /// `starting_now`).
    pub metric_value: f64,
    pub baseline_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotEvaluable {
    PlayerNotReporting,
    /// `starting_now` with no captured baseline. The current value is
    /// reported but contributes nothing.
    MissingBaseline { current_value: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdEvaluation {
    Evaluated(ThresholdReading),
    NotEvaluable(NotEvaluable),
    /// Bad line or stat key; retrying cannot fix it.
    Invalid(String),
}

impl ThresholdEvaluation {
    pub fn crossed(&self) -> bool {
        matches!(self, ThresholdEvaluation::Evaluated(r) if r.crossed)
    }

    pub fn is_not_evaluable(&self) -> bool {
        matches!(self, ThresholdEvaluation::NotEvaluable(_))
    }

    pub fn reading(&self) -> Option<&ThresholdReading> {
        match self {
            ThresholdEvaluation::Evaluated(r) => Some(r),
            _ => None,
        }
    }
}

/// Evaluate a threshold prop. The line is crossed at `>=`.
pub fn evaluate_threshold(
    snapshot: &LiveSnapshot,
    config: &BetConfig,
    baseline: Option<&Baseline>,
) -> ThresholdEvaluation {
    let mode = progress_mode_of(config);
    let Some(line) = normalize_line(config) else {
        return ThresholdEvaluation::Invalid("line is not a number".to_string());
    };
    let Some(player_id) = field_string(config, "playerId") else {
        return ThresholdEvaluation::Invalid("playerId missing".to_string());
    };
    let Some(stat) = field_string(config, "stat") else {
        return ThresholdEvaluation::Invalid("stat missing".to_string());
    };

    match read_metric(snapshot, &player_id, &stat, mode, baseline) {
        MetricRead::PlayerAbsent => {
            ThresholdEvaluation::NotEvaluable(NotEvaluable::PlayerNotReporting)
        }
        MetricRead::UnknownStat => {
            ThresholdEvaluation::Invalid(format!("unknown stat key '{stat}'"))
        }
        MetricRead::MissingBaseline { current } => {
            ThresholdEvaluation::NotEvaluable(NotEvaluable::MissingBaseline {
                current_value: current,
            })
        }
        MetricRead::Value {
            current,
            metric,
            baseline,
        } => ThresholdEvaluation::Evaluated(ThresholdReading {
            crossed: metric >= line,
            current_value: current,
            metric_value: metric,
            baseline_value: baseline,
        }),
    }
}

// ---------------------------------------------------------------------------
// prop_hunt
// ---------------------------------------------------------------------------

/// Over/under on a single player stat.
pub struct PropHuntMode {
    catalog: StatCatalog,
}

impl PropHuntMode {
    pub fn new(catalog: StatCatalog) -> Self {
        Self { catalog }
    }
}

impl GameMode for PropHuntMode {
    fn key(&self) -> &'static str {
        "prop_hunt"
    }

    fn label(&self) -> &'static str {
        "Prop Hunt"
    }

    fn winning_choices(&self, _config: &BetConfig) -> Vec<String> {
        vec![CHOICE_OVER.to_string(), CHOICE_UNDER.to_string()]
    }

    fn validate(&self, config: &BetConfig) -> Result<(), ValidationError> {
        require_string(config, "playerId")?;
        let stat = require_string(config, "stat")?;
        if !self.catalog.contains(&stat) {
            return Err(ValidationError::UnknownStat {
                league: self.catalog.league().to_string(),
                stat,
            });
        }
        if !config.contains_key("line") && !config.contains_key("line_value") {
            return Err(ValidationError::MissingField("line"));
        }
        match normalize_line(config) {
            Some(line) if line >= 0.0 => Ok(()),
            Some(line) => Err(ValidationError::InvalidField {
                field: "line",
                reason: format!("must not be negative, got {line}"),
            }),
            None => Err(ValidationError::InvalidField {
                field: "line",
                reason: "not a number".to_string(),
            }),
        }
    }

    fn config_steps(&self) -> Vec<ConfigStep> {
        vec![
            ConfigStep {
                key: "playerId",
                prompt: "Pick a player",
                input: StepInput::Player,
            },
            ConfigStep {
                key: "stat",
                prompt: "Pick a stat",
                input: StepInput::Stat {
                    options: self.catalog.options(),
                },
            },
            ConfigStep {
                key: "line",
                prompt: "Set the line",
                input: StepInput::Number { min: 0.0, step: 0.5 },
            },
            ConfigStep {
                key: "progressMode",
                prompt: "Count from kickoff or from now?",
                input: StepInput::Choice {
                    options: vec![
                        ProgressMode::StartingNow.to_string(),
                        ProgressMode::Cumulative.to_string(),
                    ],
                },
            },
        ]
    }

    fn baseline_targets(&self, config: &BetConfig) -> Vec<BaselineTarget> {
        if progress_mode_of(config) == ProgressMode::Cumulative {
            return Vec::new();
        }
        match (field_string(config, "playerId"), field_string(config, "stat")) {
            (Some(player_id), Some(stat_key)) => vec![BaselineTarget { player_id, stat_key }],
            _ => Vec::new(),
        }
    }

    fn evaluate(
        &self,
        snapshot: &LiveSnapshot,
        config: &BetConfig,
        baselines: &[Baseline],
    ) -> EvalOutcome {
        let baseline = match (field_string(config, "playerId"), field_string(config, "stat")) {
            (Some(p), Some(s)) => baselines.iter().find(|b| b.matches(&p, &s)),
            _ => None,
        };
        let game_over = snapshot.status.is_final();

        match evaluate_threshold(snapshot, config, baseline) {
            ThresholdEvaluation::Evaluated(r) if r.crossed => EvalOutcome::Decided {
                winning_choice: CHOICE_OVER.to_string(),
                metric_value: Some(r.metric_value),
            },
            ThresholdEvaluation::Evaluated(r) if game_over => EvalOutcome::Decided {
                winning_choice: CHOICE_UNDER.to_string(),
                metric_value: Some(r.metric_value),
            },
            ThresholdEvaluation::Evaluated(r) => EvalOutcome::Pending {
                metric_value: Some(r.metric_value),
            },
            ThresholdEvaluation::NotEvaluable(NotEvaluable::PlayerNotReporting) if game_over => {
                EvalOutcome::Void("player recorded no stats".to_string())
            }
            ThresholdEvaluation::NotEvaluable(NotEvaluable::PlayerNotReporting) => {
                EvalOutcome::NotEvaluable("player not reporting yet".to_string())
            }
            ThresholdEvaluation::NotEvaluable(NotEvaluable::MissingBaseline { .. }) => {
                EvalOutcome::NotEvaluable("baseline not captured".to_string())
            }
            ThresholdEvaluation::Invalid(reason) => EvalOutcome::Invalid(reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
