//! Resolution queue: one logical job per bet.
//!
//! Jobs wait in a min-heap keyed by their next eligible time. Claiming a
//! job moves it to the in-flight set, and a bet that is queued or in
//! flight cannot be enqueued again, so at most one worker ever handles
//! a given bet. Heap entries carry a sequence number; entries whose job
//! has since been rescheduled or cancelled are skipped when popped.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::types::{BetId, FailureKind, JobRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Scheduled,
    /// Already queued or in flight; nothing added.
    Coalesced,
}

/// A job handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedJob {
    pub record: JobRecord,
    pub last_error: Option<FailureKind>,
}

#[derive(Debug, Clone)]
struct JobState {
    record: JobRecord,
    last_error: Option<FailureKind>,
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    heap: BinaryHeap<Reverse<(DateTime<Utc>, u64, BetId)>>,
    queued: HashMap<BetId, JobState>,
    in_flight: HashMap<BetId, ClaimedJob>,
    cancelled: HashSet<BetId>,
    next_seq: u64,
}

impl Inner {
    fn push(&mut self, record: JobRecord, last_error: Option<FailureKind>) {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.heap.push(Reverse((record.scheduled_at, seq, record.bet_id)));
        self.queued.insert(
            record.bet_id,
            JobState {
                record,
                last_error,
                seq,
            },
        );
    }
}

#[derive(Debug, Default)]
pub struct ResolutionQueue {
    inner: Mutex<Inner>,
}

impl ResolutionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a bet for evaluation at `now`.
    pub fn enqueue(&self, bet_id: BetId, now: DateTime<Utc>) -> EnqueueOutcome {
        let mut inner = self.inner.lock();
        if inner.queued.contains_key(&bet_id) || inner.in_flight.contains_key(&bet_id) {
            return EnqueueOutcome::Coalesced;
        }
        inner.cancelled.remove(&bet_id);
        inner.push(
            JobRecord {
                bet_id,
                attempt: 0,
                scheduled_at: now,
            },
            None,
        );
        EnqueueOutcome::Scheduled
    }

    /// Take up to `limit` jobs whose time has come and mark them in flight.
    pub fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Vec<ClaimedJob> {
        let mut inner = self.inner.lock();
        let mut claimed = Vec::new();

        while claimed.len() < limit {
            let Some(Reverse((due, seq, bet_id))) = inner.heap.peek().copied() else {
                break;
            };
            if due > now {
                break;
            }
            inner.heap.pop();

            let live = inner.queued.get(&bet_id).is_some_and(|job| job.seq == seq);
            if !live {
                continue;
            }
            if let Some(job) = inner.queued.remove(&bet_id) {
                let job = ClaimedJob {
                    record: job.record,
                    last_error: job.last_error,
                };
                inner.in_flight.insert(bet_id, job.clone());
                claimed.push(job);
            }
        }
        claimed
    }

    /// The job is finished for good (settled, voided, or sent to review).
    pub fn ack(&self, bet_id: BetId) {
        let mut inner = self.inner.lock();
        inner.in_flight.remove(&bet_id);
        inner.queued.remove(&bet_id);
        inner.cancelled.remove(&bet_id);
    }

    /// Put an in-flight job back after `delay`. `counted` failures
    /// consume the retry budget. Returns the new record, or `None` when
    /// the bet was cancelled while in flight or the job was not in flight.
    pub fn retry(
        &self,
        bet_id: BetId,
        delay: Duration,
        counted: bool,
        kind: FailureKind,
        now: DateTime<Utc>,
    ) -> Option<JobRecord> {
        let mut inner = self.inner.lock();
        let job = inner.in_flight.remove(&bet_id)?;
        if inner.cancelled.remove(&bet_id) {
            return None;
        }
        let record = JobRecord {
            bet_id,
            attempt: job.record.attempt + u32::from(counted),
            scheduled_at: now + delay,
        };
        inner.push(record.clone(), Some(kind));
        Some(record)
    }

    /// Drop a bet's job. An in-flight job is marked so its worker stops at
    /// the next checkpoint and `retry` will not reschedule it.
    pub fn cancel(&self, bet_id: BetId) -> bool {
        let mut inner = self.inner.lock();
        let was_queued = inner.queued.remove(&bet_id).is_some();
        let in_flight = inner.in_flight.contains_key(&bet_id);
        if in_flight {
            inner.cancelled.insert(bet_id);
        }
        was_queued || in_flight
    }

    pub fn is_cancelled(&self, bet_id: BetId) -> bool {
        self.inner.lock().cancelled.contains(&bet_id)
    }

    pub fn contains(&self, bet_id: BetId) -> bool {
        let inner = self.inner.lock();
        inner.queued.contains_key(&bet_id) || inner.in_flight.contains_key(&bet_id)
    }

    /// Queued plus in-flight jobs.
    pub fn depth(&self) -> usize {
        let inner = self.inner.lock();
        inner.queued.len() + inner.in_flight.len()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    /// Earliest time a queued job becomes due.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        let inner = self.inner.lock();
        inner.queued.values().map(|j| j.record.scheduled_at).min()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
