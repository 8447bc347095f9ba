//! Per-transaction counts updater
//!
//! A `CountsUpdater` collects every counts change of one transaction and
//! applies them as a single batch when closed (or dropped).

use std::collections::HashMap;

use crate::engine::CountsStore;
use crate::error::Result;
use crate::key::{CountsKey, CountsValue};
use crate::tracker::Change;

/// How an updater treats a transaction that was already applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Regular commit: applying a seen tx id is an error
    Normal,
    /// Log replay after a crash: a seen tx id turns the updater into a no-op
    Recovery,
}

/// Batches the changes of one transaction
pub struct CountsUpdater<'a> {
    store: &'a CountsStore,
    tx_id: u64,
    batch: HashMap<CountsKey, Change>,
    /// Transaction already applied before, every call is a no-op
    ignored: bool,
    closed: bool,
}

impl<'a> CountsUpdater<'a> {
    pub(crate) fn new(store: &'a CountsStore, tx_id: u64, ignored: bool) -> Self {
        Self {
            store,
            tx_id,
            batch: HashMap::new(),
            ignored,
            closed: false,
        }
    }

    pub fn tx_id(&self) -> u64 {
        self.tx_id
    }

    /// Whether this updater replays an already-applied transaction
    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    /// Add `delta` to the count held by `key`
    pub fn increment(&mut self, key: CountsKey, delta: i64) {
        self.record(key, Change::Delta(CountsValue::count(delta)));
    }

    /// Add `delta` to both registers of `key`
    pub fn increment_value(&mut self, key: CountsKey, delta: CountsValue) {
        self.record(key, Change::Delta(delta));
    }

    /// Overwrite `key` with `value`
    pub fn replace(&mut self, key: CountsKey, value: CountsValue) {
        self.record(key, Change::Replace(value));
    }

    pub fn increment_node_count(&mut self, label_id: i32, delta: i64) {
        self.increment(CountsKey::node(label_id), delta);
    }

    pub fn increment_relationship_count(
        &mut self,
        start_label_id: i32,
        type_id: i32,
        end_label_id: i32,
        delta: i64,
    ) {
        self.increment(
            CountsKey::relationship(start_label_id, type_id, end_label_id),
            delta,
        );
    }

    pub fn increment_index_size(&mut self, label_id: i32, property_key_id: i32, delta: i64) {
        self.increment(CountsKey::index_size(label_id, property_key_id), delta);
    }

    pub fn replace_index_size(&mut self, label_id: i32, property_key_id: i32, size: i64) {
        self.replace(
            CountsKey::index_size(label_id, property_key_id),
            CountsValue::count(size),
        );
    }

    pub fn replace_index_sample(
        &mut self,
        label_id: i32,
        property_key_id: i32,
        unique_values: i64,
        sample_size: i64,
    ) {
        self.replace(
            CountsKey::index_sample(label_id, property_key_id),
            CountsValue::new(unique_values, sample_size),
        );
    }

    fn record(&mut self, key: CountsKey, change: Change) {
        if self.ignored {
            return;
        }
        self.batch
            .entry(key)
            .and_modify(|existing| *existing = existing.then(change))
            .or_insert(change);
    }

    /// Apply the batch and mark the transaction applied
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.ignored {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.batch);
        self.store.apply_batch(self.tx_id, batch)
    }
}

impl<'a> Drop for CountsUpdater<'a> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.finish() {
            tracing::error!(tx_id = self.tx_id, error = %e, "Failed to apply counts on drop");
        }
    }
}
