//! `choose_winner`: pick which team wins the game.

use super::{require_string, field_string, ConfigStep, EvalOutcome, GameMode, StepInput, ValidationError};
use crate::types::{Baseline, BetConfig, LiveSnapshot};

pub struct ChooseWinnerMode;

impl GameMode for ChooseWinnerMode {
    fn key(&self) -> &'static str {
        "choose_winner"
    }

    fn label(&self) -> &'static str {
        "Choose the Winner"
    }

    fn winning_choices(&self, config: &BetConfig) -> Vec<String> {
        ["homeTeamName", "awayTeamName"]
            .iter()
            .filter_map(|f| field_string(config, f))
            .collect()
    }

    fn validate(&self, config: &BetConfig) -> Result<(), ValidationError> {
        let home = require_string(config, "homeTeamId")?;
        require_string(config, "homeTeamName")?;
        let away = require_string(config, "awayTeamId")?;
        require_string(config, "awayTeamName")?;
        if home == away {
            return Err(ValidationError::InvalidField {
                field: "awayTeamId",
                reason: "must differ from homeTeamId".to_string(),
            });
        }
        Ok(())
    }

    fn config_steps(&self) -> Vec<ConfigStep> {
        vec![
            ConfigStep {
                key: "homeTeamId",
                prompt: "Home team",
                input: StepInput::Team,
            },
            ConfigStep {
                key: "awayTeamId",
                prompt: "Away team",
                input: StepInput::Team,
            },
        ]
    }

    fn evaluate(
        &self,
        snapshot: &LiveSnapshot,
        config: &BetConfig,
        _baselines: &[Baseline],
    ) -> EvalOutcome {
        if !snapshot.status.is_final() {
            return EvalOutcome::Pending { metric_value: None };
        }

        let mut scored = Vec::with_capacity(2);
        for (id_field, name_field) in [("homeTeamId", "homeTeamName"), ("awayTeamId", "awayTeamName")] {
            let (Some(id), Some(name)) = (field_string(config, id_field), field_string(config, name_field))
            else {
                return EvalOutcome::Invalid("choose_winner config incomplete".to_string());
            };
            let Some(team) = snapshot.find_team(&id) else {
                return EvalOutcome::Invalid(format!("team {id} is not in game {}", snapshot.game_id));
            };
            let Some(score) = team.score else {
                return EvalOutcome::NotEvaluable(format!("no final score for {name}"));
            };
            scored.push((name, score));
        }

        let (away_name, away) = scored.pop().unwrap_or_default();
        let (home_name, home) = scored.pop().unwrap_or_default();
        if home > away {
            EvalOutcome::Decided {
                winning_choice: home_name,
                metric_value: Some(home - away),
            }
        } else if away > home {
            EvalOutcome::Decided {
                winning_choice: away_name,
                metric_value: Some(away - home),
            }
        } else {
            EvalOutcome::Void(format!("game tied {home}-{away}"))
        }
    }
}
