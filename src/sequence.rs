//! Applied transaction tracking
//!
//! Transactions close in any order. `TxSequence` keeps the highest tx id
//! below which every id has been applied (the gap-free watermark) plus the
//! ids applied above it ("strays"). The watermark only advances, and only
//! across contiguous ids.
//!
//! A batch claims its tx id with `try_claim` before touching any state and
//! confirms it with `offer`, so two batches for one id never both apply.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{CountsError, Result};
use crate::health::StoreHealth;

#[derive(Debug)]
struct SequenceInner {
    gap_free: u64,
    strays: BTreeSet<u64>,
    highest_seen: u64,
    /// Ids claimed by a batch that is still being applied
    claimed: BTreeSet<u64>,
}

impl SequenceInner {
    fn is_applied(&self, tx_id: u64) -> bool {
        tx_id <= self.gap_free || self.strays.contains(&tx_id)
    }

    fn drain_contiguous(&mut self) {
        while self.strays.remove(&(self.gap_free + 1)) {
            self.gap_free += 1;
        }
    }
}

/// Point-in-time copy of the sequence, persisted by rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceSnapshot {
    pub gap_free: u64,
    pub strays: Vec<u64>,
}

/// Gap-free watermark with out-of-order arrivals
#[derive(Debug)]
pub struct TxSequence {
    inner: Mutex<SequenceInner>,
    advanced: Condvar,
}

impl TxSequence {
    /// Start from a persisted watermark and stray ids
    pub fn new(gap_free: u64, strays: impl IntoIterator<Item = u64>) -> Self {
        let strays: BTreeSet<u64> = strays.into_iter().filter(|id| *id > gap_free).collect();
        let highest_seen = strays.iter().next_back().copied().unwrap_or(gap_free);
        let mut inner = SequenceInner {
            gap_free,
            strays,
            highest_seen,
            claimed: BTreeSet::new(),
        };
        inner.drain_contiguous();
        Self {
            inner: Mutex::new(inner),
            advanced: Condvar::new(),
        }
    }

    /// Reserve `tx_id` for a batch about to be applied
    ///
    /// Returns false if it is already applied or claimed by another batch.
    pub fn try_claim(&self, tx_id: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.is_applied(tx_id) {
            return false;
        }
        inner.claimed.insert(tx_id)
    }

    /// Give back a claim whose batch was not applied
    pub fn release(&self, tx_id: u64) {
        self.inner.lock().claimed.remove(&tx_id);
    }

    /// Record `tx_id` as applied, confirming any claim on it. Returns false
    /// if it already was.
    pub fn offer(&self, tx_id: u64) -> bool {
        let mut inner = self.inner.lock();
        inner.claimed.remove(&tx_id);
        if inner.is_applied(tx_id) {
            return false;
        }

        inner.highest_seen = inner.highest_seen.max(tx_id);
        if tx_id == inner.gap_free + 1 {
            inner.gap_free = tx_id;
            inner.drain_contiguous();
            self.advanced.notify_all();
        } else {
            inner.strays.insert(tx_id);
        }
        true
    }

    /// Whether `tx_id` has been applied
    pub fn is_applied(&self, tx_id: u64) -> bool {
        self.inner.lock().is_applied(tx_id)
    }

    pub fn gap_free(&self) -> u64 {
        self.inner.lock().gap_free
    }

    /// Highest tx id ever applied, gap-free or not
    pub fn highest_seen(&self) -> u64 {
        self.inner.lock().highest_seen
    }

    pub fn snapshot(&self) -> SequenceSnapshot {
        let inner = self.inner.lock();
        SequenceSnapshot {
            gap_free: inner.gap_free,
            strays: inner.strays.iter().copied().collect(),
        }
    }

    /// Jump the watermark forward to `tx_id`, e.g. after an initial build
    pub fn advance_to(&self, tx_id: u64) {
        let mut inner = self.inner.lock();
        if tx_id > inner.gap_free {
            inner.gap_free = tx_id;
            inner.strays.retain(|id| *id > tx_id);
            inner.highest_seen = inner.highest_seen.max(tx_id);
            inner.drain_contiguous();
            self.advanced.notify_all();
        }
    }

    /// Block until the watermark reaches `tx_id`
    ///
    /// Wakes at least every `poll` to re-check `health`, and gives up after
    /// `timeout`.
    pub fn await_gap_free(
        &self,
        tx_id: u64,
        health: &StoreHealth,
        poll: Duration,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if inner.gap_free >= tx_id {
                return Ok(());
            }
            health.check()?;

            let now = Instant::now();
            if now >= deadline {
                return Err(CountsError::SnapshotTimeout {
                    tx_id,
                    gap_free: inner.gap_free,
                });
            }
            let wait = poll.min(deadline - now);
            self.advanced.wait_for(&mut inner, wait);
        }
    }
}
