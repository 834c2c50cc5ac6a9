//! Per-league stat catalogs.
//!
//! Stat names follow the provider's box-score keys. Category-qualified
//! names (`rushing.rushingYards`) are accepted when the bare name is known.

const NFL_STATS: &[&str] = &[
    "passingYards",
    "passingTouchdowns",
    "interceptions",
    "completions",
    "passingAttempts",
    "rushingAttempts",
    "rushingYards",
    "rushingTouchdowns",
    "longRushing",
    "receptions",
    "receivingYards",
    "receivingTouchdowns",
    "receivingTargets",
    "longReception",
    "fumbles",
    "fumblesLost",
    "totalTackles",
    "soloTackles",
    "sacks",
    "tacklesForLoss",
    "passesDefended",
    "QBHits",
    "interceptionYards",
    "kickReturnYards",
    "puntReturnYards",
    "fieldGoalsMade",
    "extraPointsMade",
    "totalKickingPoints",
    "punts",
    "puntYards",
];

const NBA_STATS: &[&str] = &[
    "points",
    "rebounds",
    "assists",
    "steals",
    "blocks",
    "turnovers",
    "fouls",
    "minutes",
    "offensiveRebounds",
    "defensiveRebounds",
    "fieldGoalsMade",
    "fieldGoalsAttempted",
    "threePointFieldGoalsMade",
    "threePointFieldGoalsAttempted",
    "freeThrowsMade",
    "freeThrowsAttempted",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatCatalog {
    league: &'static str,
    stats: &'static [&'static str],
}

impl StatCatalog {
    pub fn nfl() -> Self {
        Self {
            league: "nfl",
            stats: NFL_STATS,
        }
    }

    pub fn nba() -> Self {
        Self {
            league: "nba",
            stats: NBA_STATS,
        }
    }

    /// Catalog for a league key, case-insensitive.
    pub fn for_league(league: &str) -> Option<Self> {
        match league.trim().to_lowercase().as_str() {
            "nfl" => Some(Self::nfl()),
            "nba" => Some(Self::nba()),
            _ => None,
        }
    }

    pub fn league(&self) -> &'static str {
        self.league
    }

    pub fn stats(&self) -> &'static [&'static str] {
        self.stats
    }

    pub fn contains(&self, stat: &str) -> bool {
        let bare = stat.rsplit('.').next().unwrap_or(stat);
        self.stats.contains(&bare)
    }

    pub fn options(&self) -> Vec<String> {
        self.stats.iter().map(|s| s.to_string()).collect()
    }
}
