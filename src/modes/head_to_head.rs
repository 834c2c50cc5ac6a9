//! `either_or`: which of two players gains more of a stat.
//!
//! Settles only once the game is final. A player missing from the final
//! box score recorded nothing and counts as zero; a tie voids the bet.

use super::catalog::StatCatalog;
use super::threshold::{progress_mode_of, read_metric, MetricRead, ProgressMode};
use super::{
    field_string, require_string, BaselineTarget, ConfigStep, EvalOutcome, GameMode, StepInput,
    ValidationError,
};
use crate::types::{Baseline, BetConfig, LiveSnapshot};

pub struct EitherOrMode {
    catalog: StatCatalog,
}

struct Side {
    id: String,
    name: String,
}

impl EitherOrMode {
    pub fn new(catalog: StatCatalog) -> Self {
        Self { catalog }
    }

    fn sides(config: &BetConfig) -> Option<(Side, Side)> {
        let one = Side {
            id: field_string(config, "player1Id")?,
            name: field_string(config, "player1Name")?,
        };
        let two = Side {
            id: field_string(config, "player2Id")?,
            name: field_string(config, "player2Name")?,
        };
        Some((one, two))
    }
}

impl GameMode for EitherOrMode {
    fn key(&self) -> &'static str {
        "either_or"
    }

    fn label(&self) -> &'static str {
        "Either Or"
    }

    fn winning_choices(&self, config: &BetConfig) -> Vec<String> {
        match Self::sides(config) {
            Some((one, two)) => vec![one.name, two.name],
            None => Vec::new(),
        }
    }

    fn validate(&self, config: &BetConfig) -> Result<(), ValidationError> {
        let p1 = require_string(config, "player1Id")?;
        require_string(config, "player1Name")?;
        let p2 = require_string(config, "player2Id")?;
        require_string(config, "player2Name")?;
        if p1 == p2 {
            return Err(ValidationError::InvalidField {
                field: "player2Id",
                reason: "must differ from player1Id".to_string(),
            });
        }
        let stat = require_string(config, "stat")?;
        if !self.catalog.contains(&stat) {
            return Err(ValidationError::UnknownStat {
                league: self.catalog.league().to_string(),
                stat,
            });
        }
        Ok(())
    }

    fn config_steps(&self) -> Vec<ConfigStep> {
        vec![
            ConfigStep {
                key: "player1Id",
                prompt: "Pick the first player",
                input: StepInput::Player,
            },
            ConfigStep {
                key: "player2Id",
                prompt: "Pick the second player",
                input: StepInput::Player,
            },
            ConfigStep {
                key: "stat",
                prompt: "Who gets more of...",
                input: StepInput::Stat {
                    options: self.catalog.options(),
                },
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
        let (Some((one, two)), Some(stat)) = (Self::sides(config), field_string(config, "stat"))
        else {
            return Vec::new();
        };
        vec![
            BaselineTarget {
                player_id: one.id,
                stat_key: stat.clone(),
            },
            BaselineTarget {
                player_id: two.id,
                stat_key: stat,
            },
        ]
    }

    fn evaluate(
        &self,
        snapshot: &LiveSnapshot,
        config: &BetConfig,
        baselines: &[Baseline],
    ) -> EvalOutcome {
        let (Some((one, two)), Some(stat)) = (Self::sides(config), field_string(config, "stat"))
        else {
            return EvalOutcome::Invalid("either_or config incomplete".to_string());
        };
        let mode = progress_mode_of(config);

        let mut metrics = Vec::with_capacity(2);
        for side in [&one, &two] {
            let baseline = baselines.iter().find(|b| b.matches(&side.id, &stat));
            match read_metric(snapshot, &side.id, &stat, mode, baseline) {
                MetricRead::UnknownStat => {
                    return EvalOutcome::Invalid(format!("unknown stat key '{stat}'"))
                }
                MetricRead::MissingBaseline { .. } => {
                    return EvalOutcome::NotEvaluable(format!("baseline missing for {}", side.name))
                }
                MetricRead::PlayerAbsent => metrics.push(None),
                MetricRead::Value { metric, .. } => metrics.push(Some(metric)),
            }
        }

        if !snapshot.status.is_final() {
            return EvalOutcome::Pending { metric_value: None };
        }

        let (a, b) = match (metrics[0], metrics[1]) {
            (None, None) => return EvalOutcome::Void("neither player recorded stats".to_string()),
            (a, b) => (a.unwrap_or(0.0), b.unwrap_or(0.0)),
        };

        if a > b {
            EvalOutcome::Decided {
                winning_choice: one.name,
                metric_value: Some(a - b),
            }
        } else if b > a {
            EvalOutcome::Decided {
                winning_choice: two.name,
                metric_value: Some(b - a),
            }
        } else {
            EvalOutcome::Void(format!("tie at {a}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BaselineKey, GameStatus};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn cfg(progress: &str) -> BetConfig {
        json!({
            "player1Id": "a", "player1Name": "Kelce",
            "player2Id": "b", "player2Name": "Hill",
            "stat": "receivingYards", "progressMode": progress
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn game(status: GameStatus, a: f64, b: f64) -> LiveSnapshot {
        LiveSnapshot::sample(
            status,
            &[
                ("a", "Kelce", &[("receivingYards", a)]),
                ("b", "Hill", &[("receivingYards", b)]),
            ],
        )
    }

    #[test]
    fn test_choices_are_player_names() {
        let mode = EitherOrMode::new(StatCatalog::nfl());
        assert_eq!(mode.winning_choices(&cfg("cumulative")), vec!["Kelce", "Hill"]);
    }

    #[test]
    fn test_validate_rejects_same_player() {
        let mode = EitherOrMode::new(StatCatalog::nfl());
        let mut c = cfg("cumulative");
        c.insert("player2Id".into(), json!("a"));
        assert!(matches!(
            mode.validate(&c),
            Err(ValidationError::InvalidField { field: "player2Id", .. })
        ));
        assert!(mode.validate(&cfg("cumulative")).is_ok());
    }

    #[test]
    fn test_pending_until_final() {
        let mode = EitherOrMode::new(StatCatalog::nfl());
        let outcome = mode.evaluate(&game(GameStatus::InProgress, 80.0, 10.0), &cfg("cumulative"), &[]);
        assert_eq!(outcome, EvalOutcome::Pending { metric_value: None });
    }

    #[test]
    fn test_final_decides_higher_metric() {
        let mode = EitherOrMode::new(StatCatalog::nfl());
        let outcome = mode.evaluate(&game(GameStatus::Final, 80.0, 95.0), &cfg("cumulative"), &[]);
        assert_eq!(
            outcome,
            EvalOutcome::Decided { winning_choice: "Hill".into(), metric_value: Some(15.0) }
        );
    }

    #[test]
    fn test_tie_voids() {
        let mode = EitherOrMode::new(StatCatalog::nfl());
        let outcome = mode.evaluate(&game(GameStatus::Final, 42.0, 42.0), &cfg("cumulative"), &[]);
        assert!(matches!(outcome, EvalOutcome::Void(_)));
    }

    #[test]
    fn test_starting_now_uses_baselines() {
        let mode = EitherOrMode::new(StatCatalog::nfl());
        let c = cfg("starting_now");
        assert_eq!(mode.baseline_targets(&c).len(), 2);

        let missing = mode.evaluate(&game(GameStatus::Final, 80.0, 95.0), &c, &[]);
        assert!(matches!(missing, EvalOutcome::NotEvaluable(_)));

        let bl = |player: &str, value: f64| Baseline {
            key: BaselineKey {
                bet_id: Uuid::new_v4(),
                stat_key: "receivingYards".into(),
                player_id: player.into(),
                game_id: "401547403".into(),
            },
            value,
            captured_at: Utc::now(),
        };
        // Kelce +60 after lock, Hill +15
        let outcome = mode.evaluate(
            &game(GameStatus::Final, 80.0, 95.0),
            &c,
            &[bl("a", 20.0), bl("b", 80.0)],
        );
        assert_eq!(
            outcome,
            EvalOutcome::Decided { winning_choice: "Kelce".into(), metric_value: Some(45.0) }
        );
    }
}
