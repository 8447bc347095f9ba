//! Consistent counts snapshots
//!
//! A `CountsSnapshot` holds every count as of exactly one transaction. While
//! it is being taken, transactions with ids up to that one may still be in
//! flight; their batches are folded into a `PendingSnapshot` as they close.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::key::{CountsKey, CountsValue};
use crate::tracker::Change;

/// Immutable point-in-time counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountsSnapshot {
    tx_id: u64,
    counts: BTreeMap<CountsKey, CountsValue>,
}

impl CountsSnapshot {
    pub fn new(tx_id: u64, counts: BTreeMap<CountsKey, CountsValue>) -> Self {
        Self { tx_id, counts }
    }

    /// The transaction this snapshot reflects
    pub fn tx_id(&self) -> u64 {
        self.tx_id
    }

    /// Value for `key`, zero if absent
    pub fn get(&self, key: &CountsKey) -> CountsValue {
        self.counts.get(key).copied().unwrap_or_default()
    }

    pub fn counts(&self) -> &BTreeMap<CountsKey, CountsValue> {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Entries in ascending key order
    pub fn iter(&self) -> impl Iterator<Item = (&CountsKey, &CountsValue)> {
        self.counts.iter()
    }

    /// Serialize for a backup consumer
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut writer, self)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Read a snapshot written by `write_to`
    pub fn read_from(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(bincode::deserialize_from(reader)?)
    }
}

/// The single mutable accumulator of a snapshot in progress
#[derive(Debug)]
pub(crate) struct PendingSnapshot {
    tx_id: u64,
    changes: Mutex<HashMap<CountsKey, Change>>,
}

impl PendingSnapshot {
    pub(crate) fn new(tx_id: u64) -> Self {
        Self {
            tx_id,
            changes: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn tx_id(&self) -> u64 {
        self.tx_id
    }

    /// Fold a late transaction's batch in
    pub(crate) fn fold(&self, batch: &HashMap<CountsKey, Change>) {
        let mut changes = self.changes.lock();
        for (key, change) in batch {
            changes
                .entry(*key)
                .and_modify(|existing| *existing = existing.then(*change))
                .or_insert(*change);
        }
    }

    /// Apply folded changes on top of `base` and freeze
    pub(crate) fn finish(&self, mut base: BTreeMap<CountsKey, CountsValue>) -> CountsSnapshot {
        let changes = std::mem::take(&mut *self.changes.lock());
        for (key, change) in changes {
            let current = base.get(&key).copied().unwrap_or_default();
            let value = change.apply_to(current);
            if value.is_zero() {
                base.remove(&key);
            } else {
                base.insert(key, value);
            }
        }
        CountsSnapshot::new(self.tx_id, base)
    }
}
