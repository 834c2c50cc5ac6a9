//! SQLite-backed `BetStore`.
//!
//! Timestamps are stored as RFC 3339 text and bet configs as JSON text.
//! Status updates read and write inside one transaction so the
//! forward-only rule holds across processes.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use super::{advance, BetStore, StoreResult};
use crate::types::{Baseline, BaselineKey, Bet, BetId, BetStatus, EngineError};

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS bets (
        id              TEXT PRIMARY KEY,
        league          TEXT NOT NULL,
        mode_key        TEXT NOT NULL,
        game_id         TEXT NOT NULL,
        config          TEXT NOT NULL,
        status          TEXT NOT NULL,
        winning_choice  TEXT,
        review_reason   TEXT,
        game_starts_at  TEXT NOT NULL,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL,
        settled_at      TEXT
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_bets_status ON bets (status)",
    r"
    CREATE TABLE IF NOT EXISTS baselines (
        bet_id      TEXT NOT NULL,
        stat_key    TEXT NOT NULL,
        player_id   TEXT NOT NULL,
        game_id     TEXT NOT NULL,
        value       REAL NOT NULL,
        captured_at TEXT NOT NULL,
        PRIMARY KEY (bet_id, stat_key, player_id, game_id)
    )
    ",
];

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn storage_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Storage(e.to_string())
}

fn parse_time(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| storage_err(format!("bad timestamp '{raw}': {e}")))
}

fn parse_opt_time(raw: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_time).transpose()
}

fn bet_from_row(row: &SqliteRow) -> StoreResult<Bet> {
    let id: String = row.try_get("id").map_err(storage_err)?;
    let config: String = row.try_get("config").map_err(storage_err)?;
    let status: String = row.try_get("status").map_err(storage_err)?;
    let game_starts_at: String = row.try_get("game_starts_at").map_err(storage_err)?;
    let created_at: String = row.try_get("created_at").map_err(storage_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(storage_err)?;

    Ok(Bet {
        id: Uuid::parse_str(&id).map_err(storage_err)?,
        league: row.try_get("league").map_err(storage_err)?,
        mode_key: row.try_get("mode_key").map_err(storage_err)?,
        game_id: row.try_get("game_id").map_err(storage_err)?,
        config: serde_json::from_str(&config).map_err(storage_err)?,
        status: BetStatus::from_str(&status).map_err(storage_err)?,
        winning_choice: row.try_get("winning_choice").map_err(storage_err)?,
        review_reason: row.try_get("review_reason").map_err(storage_err)?,
        game_starts_at: parse_time(&game_starts_at)?,
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
        settled_at: parse_opt_time(row.try_get("settled_at").map_err(storage_err)?)?,
    })
}

fn baseline_from_row(row: &SqliteRow) -> StoreResult<Baseline> {
    let bet_id: String = row.try_get("bet_id").map_err(storage_err)?;
    let captured_at: String = row.try_get("captured_at").map_err(storage_err)?;
    Ok(Baseline {
        key: BaselineKey {
            bet_id: Uuid::parse_str(&bet_id).map_err(storage_err)?,
            stat_key: row.try_get("stat_key").map_err(storage_err)?,
            player_id: row.try_get("player_id").map_err(storage_err)?,
            game_id: row.try_get("game_id").map_err(storage_err)?,
        },
        value: row.try_get("value").map_err(storage_err)?,
        captured_at: parse_time(&captured_at)?,
    })
}

impl SqliteStore {
    /// Open (or create) the database and ensure the schema exists.
    ///
    /// In-memory URLs get a single long-lived connection, since every
    /// SQLite in-memory connection is its own database.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid SQLite URL: {url}"))?
            .create_if_missing(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite database at {url}"))?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .context("Failed to create schema")?;
        }

        info!(url, "SQLite store ready");
        Ok(Self { pool })
    }

    /// Shared read-modify-write for status changes.
    async fn update_bet<F>(&self, id: BetId, f: F) -> StoreResult<Bet>
    where
        F: FnOnce(&mut Bet) -> StoreResult<()> + Send,
    {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let row = sqlx::query("SELECT * FROM bets WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_err)?
            .ok_or(EngineError::BetNotFound(id))?;
        let mut bet = bet_from_row(&row)?;
        f(&mut bet)?;

        sqlx::query(
            r"
            UPDATE bets
            SET status = ?2, winning_choice = ?3, review_reason = ?4,
                updated_at = ?5, settled_at = ?6
            WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .bind(bet.status.as_str())
        .bind(bet.winning_choice.clone())
        .bind(bet.review_reason.clone())
        .bind(bet.updated_at.to_rfc3339())
        .bind(bet.settled_at.map(|t| t.to_rfc3339()))
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        Ok(bet)
    }
}

#[async_trait]
impl BetStore for SqliteStore {
    async fn insert_bet(&self, bet: &Bet) -> StoreResult<()> {
        let config = serde_json::to_string(&bet.config).map_err(storage_err)?;
        sqlx::query(
            r"
            INSERT INTO bets (id, league, mode_key, game_id, config, status, winning_choice,
                              review_reason, game_starts_at, created_at, updated_at, settled_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ",
        )
        .bind(bet.id.to_string())
        .bind(&bet.league)
        .bind(&bet.mode_key)
        .bind(&bet.game_id)
        .bind(config)
        .bind(bet.status.as_str())
        .bind(bet.winning_choice.clone())
        .bind(bet.review_reason.clone())
        .bind(bet.game_starts_at.to_rfc3339())
        .bind(bet.created_at.to_rfc3339())
        .bind(bet.updated_at.to_rfc3339())
        .bind(bet.settled_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn load_bet(&self, id: BetId) -> StoreResult<Option<Bet>> {
        let row = sqlx::query("SELECT * FROM bets WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.as_ref().map(bet_from_row).transpose()
    }

    async fn save_bet_status(
        &self,
        id: BetId,
        status: BetStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Bet> {
        self.update_bet(id, |bet| advance(bet, status, now)).await
    }

    async fn save_resolution(
        &self,
        id: BetId,
        winning_choice: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Bet> {
        let choice = winning_choice.to_string();
        self.update_bet(id, move |bet| {
            advance(bet, BetStatus::Resolved, now)?;
            bet.winning_choice = Some(choice);
            Ok(())
        })
        .await
    }

    async fn flag_for_review(&self, id: BetId, reason: &str, now: DateTime<Utc>) -> StoreResult<Bet> {
        let reason = reason.to_string();
        self.update_bet(id, move |bet| {
            bet.review_reason = Some(reason);
            bet.updated_at = now;
            Ok(())
        })
        .await
    }

    async fn save_baseline(&self, baseline: &Baseline) -> StoreResult<bool> {
        let result = sqlx::query(
            r"
            INSERT OR IGNORE INTO baselines (bet_id, stat_key, player_id, game_id, value, captured_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(baseline.key.bet_id.to_string())
        .bind(&baseline.key.stat_key)
        .bind(&baseline.key.player_id)
        .bind(&baseline.key.game_id)
        .bind(baseline.value)
        .bind(baseline.captured_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn load_baseline(&self, key: &BaselineKey) -> StoreResult<Option<Baseline>> {
        let row = sqlx::query(
            r"
            SELECT * FROM baselines
            WHERE bet_id = ?1 AND stat_key = ?2 AND player_id = ?3 AND game_id = ?4
            ",
        )
        .bind(key.bet_id.to_string())
        .bind(&key.stat_key)
        .bind(&key.player_id)
        .bind(&key.game_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.as_ref().map(baseline_from_row).transpose()
    }

    async fn load_baselines(&self, bet_id: BetId) -> StoreResult<Vec<Baseline>> {
        let rows = sqlx::query("SELECT * FROM baselines WHERE bet_id = ?1 ORDER BY player_id")
            .bind(bet_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(baseline_from_row).collect()
    }

    async fn list_bets(&self, statuses: &[BetStatus]) -> StoreResult<Vec<Bet>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = (1..=statuses.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT * FROM bets WHERE status IN ({}) ORDER BY created_at",
            placeholders.join(", ")
        );
        let mut query = sqlx::query(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(storage_err)?;
        rows.iter().map(bet_from_row).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
