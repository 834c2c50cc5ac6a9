//! ESPN live box-score provider.
//!
//! Uses the public ESPN site API game summary, which carries both the
//! competition header (status, period, scores) and the box score
//! (per-athlete stat lines grouped by category).
//!
//! API: `https://site.api.espn.com/apis/site/v2/sports/{sport}/{league}/summary?event={id}`
//! Auth: none.
//!
//! The raw box score is refined into a `LiveSnapshot`: numeric coercion,
//! compound stats (`"12/20"`, `"5-10"`) split into their components, and
//! every stat stored under both its bare and its category-qualified name.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use super::{FetchError, SnapshotProvider};
use crate::modes::catalog::StatCatalog;
use crate::types::{GameStatus, LiveSnapshot, PlayerSnapshot, TeamSnapshot};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://site.api.espn.com/apis/site/v2/sports";
const PROVIDER_NAME: &str = "espn";

/// League key → ESPN sport path.
const SPORT_PATHS: &[(&str, &str)] = &[
    ("nfl", "football/nfl"),
    ("ncaaf", "football/college-football"),
    ("nba", "basketball/nba"),
    ("wnba", "basketball/wnba"),
];

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct EspnProvider {
    http: Client,
    base_url: String,
}

impl EspnProvider {
    /// Build a provider. The request timeout is enforced by the fetcher,
    /// so the client itself only bounds connection setup.
    pub fn new(base_url: Option<String>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(5))
            .user_agent("PROPBET/0.1.0")
            .build()
            .context("Failed to build ESPN HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    fn sport_path(league: &str) -> Option<&'static str> {
        let league = league.trim().to_lowercase();
        SPORT_PATHS
            .iter()
            .find(|(l, _)| *l == league)
            .map(|(_, path)| *path)
    }

    fn summary_url(&self, sport_path: &str, game_id: &str) -> String {
        format!(
            "{}/{}/summary?event={}",
            self.base_url.trim_end_matches('/'),
            sport_path,
            urlencoding::encode(game_id)
        )
    }
}

#[async_trait]
impl SnapshotProvider for EspnProvider {
    async fn fetch_snapshot(&self, league: &str, game_id: &str) -> Result<LiveSnapshot, FetchError> {
        let sport_path = Self::sport_path(league)
            .ok_or_else(|| FetchError::UnsupportedLeague(league.to_string()))?;
        let url = self.summary_url(sport_path, game_id);
        debug!(url = %url, "Fetching ESPN summary");

        let resp = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Network(format!("timeout: {e}"))
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                FetchError::UpstreamStatus(status.as_u16())
            } else {
                FetchError::Rejected(status.as_u16())
            });
        }

        let raw: Value = resp
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("invalid JSON: {e}")))?;

        refine_summary(&raw, league, game_id)
    }

    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

// ---------------------------------------------------------------------------
// Refinement
// ---------------------------------------------------------------------------

/// Turn a raw ESPN summary payload into a `LiveSnapshot`.
///
/// Every player seen in the box score carries each stat of the league
/// catalog, zero when no category reported it yet.
pub fn refine_summary(raw: &Value, league: &str, game_id: &str) -> Result<LiveSnapshot, FetchError> {
    let Some(root) = raw.as_object() else {
        return Err(FetchError::Malformed("payload is not an object".to_string()));
    };
    let Some(boxscore) = root.get("boxscore").and_then(Value::as_object) else {
        return Err(FetchError::Malformed("no boxscore in payload".to_string()));
    };

    let competition = raw
        .pointer("/header/competitions/0")
        .cloned()
        .unwrap_or(Value::Null);
    let scores = competitor_scores(&competition);
    let (status, period) = status_and_period(&competition);

    let mut teams: Vec<TeamSnapshot> = Vec::new();

    for team_block in array(boxscore.get("players")) {
        let Some(team) = team_entry(&mut teams, team_block.get("team"), &scores) else {
            continue;
        };
        for category in array(team_block.get("statistics")) {
            let cat_name = category.get("name").and_then(Value::as_str).unwrap_or("");
            let keys: Vec<&str> = array(category.get("keys"))
                .iter()
                .filter_map(Value::as_str)
                .collect();

            for entry in array(category.get("athletes")) {
                let athlete = entry.get("athlete").cloned().unwrap_or(Value::Null);
                let full_name = str_field(&athlete, "displayName")
                    .or_else(|| str_field(&athlete, "fullName"))
                    .unwrap_or_default();
                // Fall back to a name key so entries without an id still merge.
                let athlete_id = id_field(&athlete).unwrap_or_else(|| format!("name:{full_name}"));

                let player = team
                    .players
                    .entry(athlete_id.clone())
                    .or_insert_with(|| PlayerSnapshot {
                        athlete_id,
                        full_name,
                        stats: HashMap::new(),
                    });

                let values = array(entry.get("stats"));
                for (key, value) in keys.iter().zip(values.iter()) {
                    for (name, number) in split_stat(key, value) {
                        insert_stat(&mut player.stats, cat_name, &name, number);
                    }
                }
            }
        }
    }

    // Teams without player stats yet (pre-game) still belong in the snapshot.
    for team_block in array(boxscore.get("teams")) {
        team_entry(&mut teams, team_block.get("team"), &scores);
    }

    // Filled after parsing so bare names keep their first reporting category.
    if let Some(catalog) = StatCatalog::for_league(league) {
        for player in teams.iter_mut().flat_map(|t| t.players.values_mut()) {
            for stat in catalog.stats() {
                player.stats.entry(stat.to_string()).or_insert(0.0);
            }
        }
    }

    // Stamped with the engine clock by the fetcher.
    Ok(LiveSnapshot {
        game_id: game_id.to_string(),
        status,
        period,
        teams,
        fetched_at: DateTime::<Utc>::default(),
    })
}

fn array(v: Option<&Value>) -> &[Value] {
    v.and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

fn str_field(v: &Value, field: &str) -> Option<String> {
    v.get(field).and_then(Value::as_str).map(str::to_string)
}

fn id_field(v: &Value) -> Option<String> {
    match v.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Find or create the team entry for a box-score team object.
fn team_entry<'a>(
    teams: &'a mut Vec<TeamSnapshot>,
    team: Option<&Value>,
    scores: &HashMap<String, f64>,
) -> Option<&'a mut TeamSnapshot> {
    let team = team?;
    let team_id = id_field(team)?;
    let idx = match teams.iter().position(|t| t.team_id == team_id) {
        Some(idx) => idx,
        None => {
            teams.push(TeamSnapshot {
                abbreviation: str_field(team, "abbreviation").unwrap_or_default(),
                name: str_field(team, "displayName")
                    .or_else(|| str_field(team, "name"))
                    .unwrap_or_default(),
                score: scores.get(&team_id).copied(),
                team_id,
                players: HashMap::new(),
            });
            teams.len() - 1
        }
    };
    teams.get_mut(idx)
}

fn competitor_scores(competition: &Value) -> HashMap<String, f64> {
    let mut scores = HashMap::new();
    for competitor in array(competition.get("competitors")) {
        let Some(team_id) = competitor.get("team").and_then(id_field) else {
            continue;
        };
        if let Some(score) = competitor.get("score").and_then(coerce_number) {
            scores.insert(team_id, score);
        }
    }
    scores
}

fn status_and_period(competition: &Value) -> (GameStatus, Option<u32>) {
    let status_obj = competition.get("status").cloned().unwrap_or(Value::Null);
    let status_type = status_obj.get("type").cloned().unwrap_or(Value::Null);

    let status = match status_type.get("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => GameStatus::from_provider_name(name),
        _ => status_type
            .get("state")
            .and_then(Value::as_str)
            .map(GameStatus::from_provider_state)
            .unwrap_or(GameStatus::Unknown),
    };

    let period = if status == GameStatus::Scheduled {
        None
    } else {
        status_obj
            .get("period")
            .and_then(coerce_number)
            .filter(|p| *p >= 1.0)
            .map(|p| p as u32)
    };

    (status, period)
}

/// Coerce a provider value to a number. Placeholders read as 0;
/// anything else non-numeric is `None`.
pub fn coerce_number(v: &Value) -> Option<f64> {
    match v {
        Value::Null => Some(0.0),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if matches!(s, "" | "-" | "--" | "N/A") {
                return Some(0.0);
            }
            s.replace(',', "").parse::<f64>().ok()
        }
        _ => None,
    }
}

/// Split a possibly compound stat into (name, value) pairs.
///
/// `completions/passingAttempts` = `"12/20"` yields two stats;
/// `sacks-sackYardsLost` = `"2-14"` likewise.
fn split_stat(key: &str, value: &Value) -> Vec<(String, f64)> {
    for sep in ['/', '-'] {
        if !key.contains(sep) {
            continue;
        }
        let names: Vec<&str> = key.split(sep).collect();
        let Some(raw) = value.as_str() else {
            break;
        };
        let parts: Vec<&str> = raw.split(sep).collect();
        if names.len() != parts.len() {
            return Vec::new();
        }
        return names
            .iter()
            .zip(parts)
            .filter_map(|(name, part)| {
                coerce_number(&Value::String(part.to_string())).map(|n| (name.to_string(), n))
            })
            .collect();
    }
    coerce_number(value)
        .map(|n| vec![(key.to_string(), n)])
        .unwrap_or_default()
}

fn insert_stat(stats: &mut HashMap<String, f64>, category: &str, name: &str, value: f64) {
    if !category.is_empty() {
        stats.insert(format!("{category}.{name}"), value);
    }
    // First category to report a bare name keeps it.
    stats.entry(name.to_string()).or_insert(value);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
