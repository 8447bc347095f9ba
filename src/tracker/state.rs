//! Tracker state
//!
//! One durable file plus a concurrent overlay of absolute values for every
//! key touched since that file was written. An overlay entry is seeded from
//! the file on first touch, so a hit never needs the file again.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam::atomic::AtomicCell;
use crossbeam::utils::Backoff;
use dashmap::DashMap;

use crate::error::Result;
use crate::key::{CountsKey, CountsValue};
use crate::storage::{CountsVisitor, DurableStore, DurableWriter, Slot};

use super::merge::merge_sorted;

/// A pending modification of one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Add to whatever the value is
    Delta(CountsValue),
    /// Overwrite the value
    Replace(CountsValue),
}

impl Change {
    /// `self` followed by `next`, as one change
    pub fn then(self, next: Change) -> Change {
        match (self, next) {
            (_, Change::Replace(value)) => Change::Replace(value),
            (Change::Delta(a), Change::Delta(b)) => Change::Delta(a.plus(b)),
            (Change::Replace(a), Change::Delta(b)) => Change::Replace(a.plus(b)),
        }
    }

    /// Result of applying this change to `base`
    pub fn apply_to(self, base: CountsValue) -> CountsValue {
        match self {
            Change::Delta(delta) => base.plus(delta),
            Change::Replace(value) => value,
        }
    }
}

/// Live view: durable file + overlay
#[derive(Debug)]
pub struct TrackerState {
    store: Arc<DurableStore>,
    slot: Slot,
    overlay: DashMap<CountsKey, AtomicCell<CountsValue>>,
}

impl TrackerState {
    pub fn new(store: DurableStore, slot: Slot) -> Self {
        Self {
            store: Arc::new(store),
            slot,
            overlay: DashMap::new(),
        }
    }

    /// Current value: the overlay entry if present, otherwise the file's
    pub fn get(&self, key: &CountsKey) -> Result<CountsValue> {
        if let Some(cell) = self.overlay.get(key) {
            return Ok(cell.load());
        }
        self.store.get(key)
    }

    /// Add `delta` to `key`, returning the new value
    pub fn increment(&self, key: &CountsKey, delta: CountsValue) -> Result<CountsValue> {
        if let Some(cell) = self.overlay.get(key) {
            return Ok(add_to(&cell, delta));
        }
        let seed = self.store.get(key)?;
        let cell = self
            .overlay
            .entry(*key)
            .or_insert_with(|| AtomicCell::new(seed));
        Ok(add_to(&cell, delta))
    }

    /// Overwrite `key` regardless of its current value
    pub fn replace(&self, key: &CountsKey, value: CountsValue) {
        self.overlay
            .entry(*key)
            .and_modify(|cell| cell.store(value))
            .or_insert_with(|| AtomicCell::new(value));
    }

    /// Apply a transaction's batch
    ///
    /// All file reads needed for seeding happen before the first change is
    /// applied, so an I/O error leaves the overlay untouched.
    pub fn apply_changes(&self, changes: &HashMap<CountsKey, Change>) -> Result<()> {
        for (key, change) in changes {
            if matches!(change, Change::Delta(_)) && !self.overlay.contains_key(key) {
                let seed = self.store.get(key)?;
                self.overlay
                    .entry(*key)
                    .or_insert_with(|| AtomicCell::new(seed));
            }
        }
        for (key, change) in changes {
            match *change {
                Change::Delta(delta) => {
                    self.increment(key, delta)?;
                }
                Change::Replace(value) => self.replace(key, value),
            }
        }
        Ok(())
    }

    /// Whether anything was written since the file was created
    pub fn has_changes(&self) -> bool {
        !self.overlay.is_empty()
    }

    /// Number of overlay entries
    pub fn change_count(&self) -> usize {
        self.overlay.len()
    }

    /// Copy of the overlay in ascending key order
    pub fn sorted_changes(&self) -> Vec<(CountsKey, CountsValue)> {
        let mut changes: Vec<(CountsKey, CountsValue)> = self
            .overlay
            .iter()
            .map(|entry| (*entry.key(), entry.value().load()))
            .collect();
        changes.sort_unstable_by_key(|(key, _)| *key);
        changes
    }

    /// Write file contents merged with the overlay into `writer`
    pub fn write_merged(&self, writer: &mut DurableWriter) -> Result<()> {
        let changes = self.sorted_changes();
        merge_sorted(self.store.iter(), changes, |key, value| writer.add(key, value))
    }

    /// Stream the merged view in ascending key order
    pub fn visit_all<V: CountsVisitor + ?Sized>(&self, visitor: &mut V) -> Result<()> {
        let changes = self.sorted_changes();
        merge_sorted(self.store.iter(), changes, |key, value| {
            visitor.visit(key, value);
            Ok(())
        })
    }

    pub fn store(&self) -> &Arc<DurableStore> {
        &self.store
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn tx_id(&self) -> u64 {
        self.store.tx_id()
    }

    pub fn minor_version(&self) -> u64 {
        self.store.minor_version()
    }
}

/// Compare-and-swap loop adding `delta` to `cell`
fn add_to(cell: &AtomicCell<CountsValue>, delta: CountsValue) -> CountsValue {
    let backoff = Backoff::new();
    let mut current = cell.load();
    loop {
        let next = current.plus(delta);
        match cell.compare_exchange(current, next) {
            Ok(_) => return next,
            Err(actual) => {
                current = actual;
                backoff.spin();
            }
        }
    }
}
