//! Time-driven lifecycle jobs.
//!
//! A min-heap of (trigger time, job). The engine tick pops everything
//! due and applies it; handlers check the bet's current status so a job
//! firing late or twice changes nothing.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;

use crate::types::{BetId, JobRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    /// open → locked at game start.
    Lock,
    /// Retry a baseline capture that failed transiently.
    CaptureBaseline,
    /// Fallback void for bets still unsettled long after the game.
    VoidDeadline,
}

impl fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleKind::Lock => write!(f, "lock"),
            LifecycleKind::CaptureBaseline => write!(f, "capture_baseline"),
            LifecycleKind::VoidDeadline => write!(f, "void_deadline"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleJob {
    pub kind: LifecycleKind,
    pub record: JobRecord,
}

#[derive(Debug, PartialEq, Eq)]
struct Entry {
    seq: u64,
    job: LifecycleJob,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.job
            .record
            .scheduled_at
            .cmp(&other.job.record.scheduled_at)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct Inner {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

#[derive(Debug, Default)]
pub struct LifecycleQueue {
    inner: Mutex<Inner>,
}

impl LifecycleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, bet_id: BetId, kind: LifecycleKind, at: DateTime<Utc>, attempt: u32) {
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.heap.push(Reverse(Entry {
            seq,
            job: LifecycleJob {
                kind,
                record: JobRecord {
                    bet_id,
                    attempt,
                    scheduled_at: at,
                },
            },
        }));
    }

    /// Remove and return every job due at or before `now`, earliest first.
    pub fn pop_due(&self, now: DateTime<Utc>) -> Vec<LifecycleJob> {
        let mut inner = self.inner.lock();
        let mut due = Vec::new();
        while inner
            .heap
            .peek()
            .is_some_and(|Reverse(e)| e.job.record.scheduled_at <= now)
        {
            if let Some(Reverse(entry)) = inner.heap.pop() {
                due.push(entry.job);
            }
        }
        due
    }

    /// Drop all pending jobs for a bet. Returns how many were removed.
    pub fn remove_bet(&self, bet_id: BetId) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.heap.len();
        inner.heap.retain(|Reverse(e)| e.job.record.bet_id != bet_id);
        before - inner.heap.len()
    }

    pub fn has_pending(&self, bet_id: BetId, kind: LifecycleKind) -> bool {
        self.inner
            .lock()
            .heap
            .iter()
            .any(|Reverse(e)| e.job.record.bet_id == bet_id && e.job.kind == kind)
    }

    pub fn depth(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.inner
            .lock()
            .heap
            .peek()
            .map(|Reverse(e)| e.job.record.scheduled_at)
    }
}
