//! Settlement engine: drives bets from proposal to a final outcome.
//!
//! - `propose_bet` validates synchronously, stores the bet and schedules
//!   its lock and void-deadline jobs.
//! - The lifecycle tick locks bets at game start, captures baselines and
//!   moves them to `resolving`.
//! - Resolution workers fetch, evaluate and act on each claimed job:
//!   settle, void, reschedule or route to manual review.
//!
//! Transient failures stay inside the engine. Only validation and
//! lookup errors reach callers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use super::backoff::RetryPolicy;
use super::baseline::{BaselineService, CaptureOutcome};
use super::lifecycle::{LifecycleJob, LifecycleKind, LifecycleQueue};
use super::resolution::{ClaimedJob, EnqueueOutcome, ResolutionQueue};
use crate::clock::Clock;
use crate::data::breaker::BreakerSnapshot;
use crate::data::fetcher::SnapshotFetcher;
use crate::metrics::Metrics;
use crate::modes::{EvalOutcome, GameMode, ModeRegistry};
use crate::storage::BetStore;
use crate::types::{
    Baseline, Bet, BetConfig, BetId, BetStatus, EngineError, FailureKind, LiveSnapshot,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often the run loop ticks.
    pub tick_interval: std::time::Duration,
    /// Fixed delay for not-evaluable and pending results.
    pub not_evaluable_delay: Duration,
    /// Void deadline, measured from game start.
    pub void_after: Duration,
    pub max_workers: usize,
    /// Max resolution jobs claimed per tick.
    pub claim_batch: usize,
    /// Transient failures during resolution.
    pub retry: RetryPolicy,
    /// Transient failures while capturing baselines.
    pub capture_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: std::time::Duration::from_secs(1),
            not_evaluable_delay: Duration::seconds(15),
            void_after: Duration::hours(8),
            max_workers: 8,
            claim_batch: 32,
            retry: RetryPolicy::default(),
            capture_retry: RetryPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeRequest {
    pub league: String,
    pub mode_key: String,
    pub game_id: String,
    #[serde(default)]
    pub config: BetConfig,
    pub game_starts_at: DateTime<Utc>,
}

/// What a resolution worker did with one job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobDisposition {
    Resolved { winning_choice: String },
    Voided { reason: String },
    Rescheduled { attempt: u32, kind: FailureKind },
    ManualReview { reason: &'static str },
    /// The bet was voided while the job was in flight.
    Cancelled,
    /// Nothing to do: bet gone or no longer resolving.
    Skipped,
}

impl JobDisposition {
    pub fn label(&self) -> &'static str {
        match self {
            JobDisposition::Resolved { .. } => "resolved",
            JobDisposition::Voided { .. } => "voided",
            JobDisposition::Rescheduled {
                kind: FailureKind::Transient,
                ..
            } => "rescheduled_transient",
            JobDisposition::Rescheduled { .. } => "rescheduled_not_evaluable",
            JobDisposition::ManualReview { .. } => "manual_review",
            JobDisposition::Cancelled => "cancelled",
            JobDisposition::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoverySummary {
    pub open: usize,
    pub locked: usize,
    pub resolving: usize,
    pub awaiting_review: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub resolution_queue_depth: usize,
    pub resolution_in_flight: usize,
    pub lifecycle_queue_depth: usize,
    pub breaker: BreakerSnapshot,
    pub registered_modes: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct SettlementEngine {
    registry: Arc<ModeRegistry>,
    store: Arc<dyn BetStore>,
    fetcher: Arc<SnapshotFetcher>,
    baselines: BaselineService,
    resolution: ResolutionQueue,
    lifecycle: LifecycleQueue,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    config: EngineConfig,
}

impl SettlementEngine {
    pub fn new(
        registry: Arc<ModeRegistry>,
        store: Arc<dyn BetStore>,
        fetcher: Arc<SnapshotFetcher>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
        config: EngineConfig,
    ) -> Self {
        let baselines = BaselineService::new(
            fetcher.clone(),
            store.clone(),
            clock.clone(),
            metrics.clone(),
        );
        Self {
            registry,
            store,
            fetcher,
            baselines,
            resolution: ResolutionQueue::new(),
            lifecycle: LifecycleQueue::new(),
            clock,
            metrics,
            config,
        }
    }

    pub fn registry(&self) -> &ModeRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn resolution_queue(&self) -> &ResolutionQueue {
        &self.resolution
    }

    pub fn lifecycle_queue(&self) -> &LifecycleQueue {
        &self.lifecycle
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            resolution_queue_depth: self.resolution.depth(),
            resolution_in_flight: self.resolution.in_flight(),
            lifecycle_queue_depth: self.lifecycle.depth(),
            breaker: self.fetcher.breaker().snapshot(),
            registered_modes: self.registry.len(),
        }
    }

    // -- Public operations --------------------------------------------------

    /// Validate and store a new bet, then schedule its lifecycle.
    pub async fn propose_bet(&self, req: ProposeRequest) -> Result<Bet, EngineError> {
        let mode = self.registry.lookup(&req.league, &req.mode_key)?;
        mode.validate(&req.config)?;

        let now = self.clock.now();
        let bet = Bet::new(
            &req.league,
            mode.key(),
            &req.game_id,
            req.config,
            req.game_starts_at,
            now,
        );
        self.store.insert_bet(&bet).await?;

        self.lifecycle
            .schedule(bet.id, LifecycleKind::Lock, bet.game_starts_at, 0);
        self.lifecycle.schedule(
            bet.id,
            LifecycleKind::VoidDeadline,
            bet.game_starts_at + self.config.void_after,
            0,
        );
        self.update_gauges();

        info!(
            bet_id = %bet.id,
            league = %bet.league,
            mode = %bet.mode_key,
            game_id = %bet.game_id,
            starts_at = %bet.game_starts_at,
            "Bet proposed"
        );
        Ok(bet)
    }

    pub async fn get_bet(&self, id: BetId) -> Result<Bet, EngineError> {
        self.store
            .load_bet(id)
            .await?
            .ok_or(EngineError::BetNotFound(id))
    }

    /// Cancel a bet. Pending and in-flight work is dropped at the next
    /// checkpoint, once the void is stored. A failed write leaves every
    /// scheduled job in place.
    pub async fn void_bet(&self, id: BetId, reason: &str) -> Result<Bet, EngineError> {
        let bet = self
            .store
            .save_bet_status(id, BetStatus::Voided, self.clock.now())
            .await?;
        self.resolution.cancel(id);
        self.lifecycle.remove_bet(id);
        self.metrics.inc_resolution_outcome("voided");
        self.update_gauges();
        info!(bet_id = %id, reason, "Bet voided");
        Ok(bet)
    }

    /// Rebuild queue state from storage after a restart.
    pub async fn recover(&self) -> Result<RecoverySummary, EngineError> {
        let now = self.clock.now();
        let mut summary = RecoverySummary::default();

        for bet in self.store.list_bets(BetStatus::ACTIVE).await? {
            if bet.needs_review() {
                summary.awaiting_review += 1;
                continue;
            }
            match bet.status {
                BetStatus::Open => {
                    self.lifecycle
                        .schedule(bet.id, LifecycleKind::Lock, bet.game_starts_at, 0);
                    summary.open += 1;
                }
                BetStatus::Locked => {
                    self.lifecycle
                        .schedule(bet.id, LifecycleKind::CaptureBaseline, now, 0);
                    summary.locked += 1;
                }
                BetStatus::Resolving => {
                    self.resolution.enqueue(bet.id, now);
                    summary.resolving += 1;
                }
                BetStatus::Resolved | BetStatus::Voided => continue,
            }
            self.lifecycle.schedule(
                bet.id,
                LifecycleKind::VoidDeadline,
                bet.game_starts_at + self.config.void_after,
                0,
            );
        }

        self.update_gauges();
        info!(
            open = summary.open,
            locked = summary.locked,
            resolving = summary.resolving,
            awaiting_review = summary.awaiting_review,
            "Engine state recovered"
        );
        Ok(summary)
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Apply every lifecycle job that is due. Returns how many fired.
    pub async fn run_lifecycle_tick(&self) -> usize {
        let jobs = self.lifecycle.pop_due(self.clock.now());
        let fired = jobs.len();
        for job in jobs {
            self.handle_lifecycle_job(job).await;
        }
        self.update_gauges();
        fired
    }

    async fn handle_lifecycle_job(&self, job: LifecycleJob) {
        let id = job.record.bet_id;
        let bet = match self.store.load_bet(id).await {
            Ok(Some(bet)) => bet,
            Ok(None) => {
                debug!(bet_id = %id, kind = %job.kind, "Lifecycle job for unknown bet");
                return;
            }
            Err(e) => {
                warn!(bet_id = %id, kind = %job.kind, error = %e, "Lifecycle load failed, retrying");
                self.reschedule_lifecycle(&job);
                return;
            }
        };
        if bet.status.is_terminal() {
            return;
        }

        match job.kind {
            LifecycleKind::Lock => self.lock_bet(bet, &job).await,
            LifecycleKind::CaptureBaseline => {
                if bet.status == BetStatus::Locked && !bet.needs_review() {
                    self.capture_and_advance(bet, job.record.attempt).await;
                }
            }
            LifecycleKind::VoidDeadline => self.void_at_deadline(bet, &job).await,
        }
    }

    async fn lock_bet(&self, bet: Bet, job: &LifecycleJob) {
        if bet.status != BetStatus::Open || bet.needs_review() {
            debug!(bet_id = %bet.id, status = %bet.status, "Lock skipped");
            return;
        }
        let bet = match self
            .store
            .save_bet_status(bet.id, BetStatus::Locked, self.clock.now())
            .await
        {
            Ok(bet) => bet,
            Err(e) if e.kind() == FailureKind::Transient => {
                warn!(bet_id = %bet.id, error = %e, "Lock failed, retrying");
                self.reschedule_lifecycle(job);
                return;
            }
            Err(e) => {
                debug!(bet_id = %bet.id, error = %e, "Lock lost a race");
                return;
            }
        };
        info!(bet_id = %bet.id, game_id = %bet.game_id, "Bet locked");
        self.capture_and_advance(bet, 0).await;
    }

    /// Capture baselines for a locked bet, then hand it to resolution.
    async fn capture_and_advance(&self, bet: Bet, attempt: u32) {
        let mode = match self.registry.lookup(&bet.league, &bet.mode_key) {
            Ok(mode) => mode,
            Err(e) => {
                self.review_locked(&bet, attempt, "mode_not_found", &e.to_string())
                    .await;
                return;
            }
        };

        match self.baselines.capture(&bet, mode.as_ref()).await {
            Ok(outcome) => {
                if let CaptureOutcome::Captured { written } = outcome {
                    debug!(bet_id = %bet.id, written, "Baselines stored");
                }
                self.begin_resolving(&bet, attempt).await;
            }
            Err(e) if e.is_transient() => {
                let next = attempt + 1;
                if self.config.capture_retry.exhausted(next) {
                    self.review_locked(&bet, attempt, "baseline_capture_exhausted", &e.message)
                        .await;
                    return;
                }
                let delay = self.config.capture_retry.delay_for(next);
                warn!(
                    bet_id = %bet.id,
                    attempt = next,
                    delay_ms = delay.num_milliseconds(),
                    error = %e.message,
                    "Baseline capture failed, retrying"
                );
                self.lifecycle.schedule(
                    bet.id,
                    LifecycleKind::CaptureBaseline,
                    self.clock.now() + delay,
                    next,
                );
            }
            Err(e) => {
                self.review_locked(&bet, attempt, "baseline_capture_failed", &e.message)
                    .await;
            }
        }
    }

    /// Route a locked bet to review. Until the flag is stored the capture
    /// job keeps coming back, so the bet is never left unscheduled.
    async fn review_locked(&self, bet: &Bet, attempt: u32, reason: &'static str, detail: &str) {
        if self.manual_review(bet, reason, detail).await {
            return;
        }
        let at = self.clock.now() + self.config.capture_retry.delay_for(attempt + 1);
        self.lifecycle
            .schedule(bet.id, LifecycleKind::CaptureBaseline, at, attempt);
    }

    async fn begin_resolving(&self, bet: &Bet, attempt: u32) {
        let now = self.clock.now();
        match self
            .store
            .save_bet_status(bet.id, BetStatus::Resolving, now)
            .await
        {
            Ok(_) => {
                if self.resolution.enqueue(bet.id, now) == EnqueueOutcome::Scheduled {
                    debug!(bet_id = %bet.id, "Resolution scheduled");
                }
            }
            Err(e) if e.kind() == FailureKind::Transient => {
                // Capture is idempotent, so retrying the whole step is safe.
                let next = attempt + 1;
                self.lifecycle.schedule(
                    bet.id,
                    LifecycleKind::CaptureBaseline,
                    now + self.config.capture_retry.delay_for(next),
                    next,
                );
            }
            Err(e) => debug!(bet_id = %bet.id, error = %e, "Bet left locked state elsewhere"),
        }
    }

    async fn void_at_deadline(&self, bet: Bet, job: &LifecycleJob) {
        if bet.needs_review() {
            info!(bet_id = %bet.id, "Deadline reached, bet left for manual review");
            return;
        }
        match self.void_bet(bet.id, "deadline").await {
            Ok(_) => warn!(bet_id = %bet.id, game_id = %bet.game_id, "Bet voided at deadline"),
            Err(e) if e.kind() == FailureKind::Transient => {
                warn!(bet_id = %bet.id, error = %e, "Deadline void failed, retrying");
                self.reschedule_lifecycle(job);
            }
            Err(e) => debug!(bet_id = %bet.id, error = %e, "Deadline void lost a race"),
        }
    }

    fn reschedule_lifecycle(&self, job: &LifecycleJob) {
        let next = job.record.attempt + 1;
        let at = self.clock.now() + self.config.capture_retry.delay_for(next);
        self.lifecycle
            .schedule(job.record.bet_id, job.kind, at, next);
    }

    // -- Resolution ---------------------------------------------------------

    /// Evaluate one claimed job and act on the result.
    pub async fn process_resolution_job(&self, job: ClaimedJob) -> JobDisposition {
        let disposition = self.resolve(&job).await;
        self.metrics.inc_resolution_outcome(disposition.label());
        self.update_gauges();
        disposition
    }

    async fn resolve(&self, job: &ClaimedJob) -> JobDisposition {
        let id = job.record.bet_id;
        if self.resolution.is_cancelled(id) {
            self.resolution.ack(id);
            return JobDisposition::Cancelled;
        }

        let bet = match self.store.load_bet(id).await {
            Ok(Some(bet)) => bet,
            Ok(None) => {
                self.resolution.ack(id);
                return JobDisposition::Skipped;
            }
            Err(e) => return self.retry_transient(job, &e.to_string()).await,
        };
        if bet.status != BetStatus::Resolving || bet.needs_review() {
            self.resolution.ack(id);
            return JobDisposition::Skipped;
        }

        let mode = match self.registry.lookup(&bet.league, &bet.mode_key) {
            Ok(mode) => mode,
            Err(e) => return self.review_job(job, &bet, "mode_not_found", &e.to_string()).await,
        };
        let baselines = match self.store.load_baselines(id).await {
            Ok(b) => b,
            Err(e) => return self.retry_transient(job, &e.to_string()).await,
        };

        let snapshot = match self.fetcher.fetch(&bet.league, &bet.game_id).await {
            Ok(s) => s,
            Err(e) if e.is_transient() => return self.retry_transient(job, &e.to_string()).await,
            Err(e) => return self.review_job(job, &bet, "fetch_failed", &e.to_string()).await,
        };

        // Voided while we were waiting on the provider.
        if self.resolution.is_cancelled(id) {
            self.resolution.ack(id);
            return JobDisposition::Cancelled;
        }

        if snapshot.status.is_called_off() {
            let reason = format!("game {}", snapshot.status);
            return self.void_job(job, &bet, reason).await;
        }

        let outcome = evaluate_scoped(mode.as_ref(), &snapshot, &bet, &baselines);
        debug!(bet_id = %id, outcome = outcome.label(), status = %snapshot.status, "Bet evaluated");

        match outcome {
            EvalOutcome::Decided { winning_choice, metric_value } => {
                match self
                    .store
                    .save_resolution(id, &winning_choice, self.clock.now())
                    .await
                {
                    Ok(_) => {
                        self.resolution.ack(id);
                        self.lifecycle.remove_bet(id);
                        info!(
                            bet_id = %id,
                            winning_choice = %winning_choice,
                            metric = ?metric_value,
                            "Bet resolved"
                        );
                        JobDisposition::Resolved { winning_choice }
                    }
                    Err(e) if e.kind() == FailureKind::Transient => {
                        self.retry_transient(job, &e.to_string()).await
                    }
                    Err(e) => {
                        debug!(bet_id = %id, error = %e, "Resolution lost a race");
                        self.resolution.ack(id);
                        JobDisposition::Skipped
                    }
                }
            }
            EvalOutcome::Pending { .. } | EvalOutcome::NotEvaluable(_) => {
                self.reschedule_quietly(job)
            }
            EvalOutcome::Void(reason) => self.void_job(job, &bet, reason).await,
            EvalOutcome::Invalid(reason) => {
                self.review_job(job, &bet, "evaluation_invalid", &reason).await
            }
        }
    }

    fn reschedule_quietly(&self, job: &ClaimedJob) -> JobDisposition {
        let id = job.record.bet_id;
        match self.resolution.retry(
            id,
            self.config.not_evaluable_delay,
            false,
            FailureKind::NotEvaluable,
            self.clock.now(),
        ) {
            Some(record) => JobDisposition::Rescheduled {
                attempt: record.attempt,
                kind: FailureKind::NotEvaluable,
            },
            None => JobDisposition::Cancelled,
        }
    }

    async fn retry_transient(&self, job: &ClaimedJob, message: &str) -> JobDisposition {
        let id = job.record.bet_id;
        let attempt = job.record.attempt + 1;
        if self.config.retry.exhausted(attempt) {
            return self.flag_exhausted(job, message).await;
        }
        let delay = self.config.retry.delay_for(attempt);
        warn!(
            bet_id = %id,
            attempt,
            delay_ms = delay.num_milliseconds(),
            error = message,
            "Transient resolution failure, backing off"
        );
        match self
            .resolution
            .retry(id, delay, true, FailureKind::Transient, self.clock.now())
        {
            Some(record) => JobDisposition::Rescheduled {
                attempt: record.attempt,
                kind: FailureKind::Transient,
            },
            None => JobDisposition::Cancelled,
        }
    }

    async fn void_job(&self, job: &ClaimedJob, bet: &Bet, reason: String) -> JobDisposition {
        match self
            .store
            .save_bet_status(bet.id, BetStatus::Voided, self.clock.now())
            .await
        {
            Ok(_) => {
                self.resolution.ack(bet.id);
                self.lifecycle.remove_bet(bet.id);
                info!(bet_id = %bet.id, reason = %reason, "Bet voided by evaluation");
                JobDisposition::Voided { reason }
            }
            Err(e) if e.kind() == FailureKind::Transient => {
                self.retry_transient(job, &e.to_string()).await
            }
            Err(e) => {
                debug!(bet_id = %bet.id, error = %e, "Void lost a race");
                self.resolution.ack(bet.id);
                JobDisposition::Skipped
            }
        }
    }

    async fn review_job(
        &self,
        job: &ClaimedJob,
        bet: &Bet,
        reason: &'static str,
        detail: &str,
    ) -> JobDisposition {
        if !self.manual_review(bet, reason, detail).await {
            return self.hold_for_review(job);
        }
        self.resolution.ack(bet.id);
        JobDisposition::ManualReview { reason }
    }

    /// Flag a bet for operators. Returns whether the flag was stored.
    /// Scheduled work is only dropped once it is.
    async fn manual_review(&self, bet: &Bet, reason: &'static str, detail: &str) -> bool {
        let text = format!("{reason}: {detail}");
        if let Err(e) = self.store.flag_for_review(bet.id, &text, self.clock.now()).await {
            error!(bet_id = %bet.id, reason, error = %e, "Failed to flag bet for review");
            return false;
        }
        self.metrics.inc_manual_review(reason);
        self.lifecycle.remove_bet(bet.id);
        error!(
            bet_id = %bet.id,
            league = %bet.league,
            mode = %bet.mode_key,
            reason,
            detail,
            "Bet routed to manual review"
        );
        true
    }

    /// Put back a job whose bet could not be flagged. The retry budget is
    /// not touched, so the next failure tries the flag again.
    fn hold_for_review(&self, job: &ClaimedJob) -> JobDisposition {
        match self.resolution.retry(
            job.record.bet_id,
            self.config.retry.max_delay,
            false,
            FailureKind::Transient,
            self.clock.now(),
        ) {
            Some(record) => JobDisposition::Rescheduled {
                attempt: record.attempt,
                kind: FailureKind::Transient,
            },
            None => JobDisposition::Cancelled,
        }
    }

    /// Finish a job whose transient budget ran out. The store may be the
    /// thing failing, so the bet is re-read and the job held until the
    /// flag sticks.
    async fn flag_exhausted(&self, job: &ClaimedJob, last_error: &str) -> JobDisposition {
        let id = job.record.bet_id;
        match self.store.load_bet(id).await {
            Ok(Some(bet)) => {
                self.review_job(job, &bet, "retry_budget_exhausted", last_error)
                    .await
            }
            Ok(None) => {
                self.resolution.ack(id);
                JobDisposition::Skipped
            }
            Err(e) => {
                error!(bet_id = %id, error = %e, last_error, "Retry budget exhausted, bet unreadable");
                self.hold_for_review(job)
            }
        }
    }

    // -- Driving ------------------------------------------------------------

    /// One synchronous pass: fire due lifecycle jobs, then process every
    /// due resolution job in turn.
    pub async fn run_pending(&self) -> Vec<JobDisposition> {
        self.run_lifecycle_tick().await;
        let jobs = self.resolution.claim_due(self.clock.now(), usize::MAX);
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            results.push(self.process_resolution_job(job).await);
        }
        results
    }

    /// Run until `shutdown` flips to true, then wait for in-flight workers.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let workers = self.config.max_workers.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            workers,
            tick_ms = self.config.tick_interval.as_millis() as u64,
            "Settlement engine running"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }

            self.run_lifecycle_tick().await;
            self.fetcher.evict_expired();

            let limit = semaphore.available_permits().min(self.config.claim_batch);
            if limit == 0 {
                continue;
            }
            for job in self.resolution.claim_due(self.clock.now(), limit) {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let engine = self.clone();
                tokio::spawn(async move {
                    engine.process_resolution_job(job).await;
                    drop(permit);
                });
            }
        }

        info!("Settlement engine stopping, draining workers");
        let _ = semaphore.acquire_many(workers as u32).await;
        info!("Settlement engine stopped");
    }

    fn update_gauges(&self) {
        self.metrics
            .set_resolution_queue_depth(self.resolution.depth());
        self.metrics
            .set_lifecycle_queue_depth(self.lifecycle.depth());
    }
}

fn evaluate_scoped(
    mode: &dyn GameMode,
    snapshot: &LiveSnapshot,
    bet: &Bet,
    baselines: &[Baseline],
) -> EvalOutcome {
    // Baselines read from another game are never valid zero-points.
    let scoped: Vec<_> = baselines
        .iter()
        .filter(|b| b.source_game_id() == bet.game_id)
        .cloned()
        .collect();
    mode.evaluate(snapshot, &bet.config, &scoped)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
