//! Initial counts build
//!
//! When the counts files are created from scratch, the surrounding database
//! may already hold data. A `CountsBuilder` computes absolute counts from
//! that data once, before any transaction is applied.

use crate::error::Result;
use crate::key::{CountsKey, CountsValue};
use crate::tracker::TrackerState;

/// Source of counts for a freshly created store
pub trait CountsBuilder {
    /// Transaction the built counts correspond to
    fn last_committed_tx_id(&self) -> u64;

    /// Write absolute counts
    fn build(&self, writer: &mut InitialCountsWriter<'_>) -> Result<()>;
}

/// Builder for databases with no data: nothing to count, tx 0
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCountsBuilder;

impl CountsBuilder for EmptyCountsBuilder {
    fn last_committed_tx_id(&self) -> u64 {
        0
    }

    fn build(&self, _writer: &mut InitialCountsWriter<'_>) -> Result<()> {
        Ok(())
    }
}

/// Writes absolute values straight into the overlay
pub struct InitialCountsWriter<'a> {
    state: &'a TrackerState,
    written: usize,
}

impl<'a> InitialCountsWriter<'a> {
    pub(crate) fn new(state: &'a TrackerState) -> Self {
        Self { state, written: 0 }
    }

    pub fn write(&mut self, key: CountsKey, value: CountsValue) {
        self.state.replace(&key, value);
        self.written += 1;
    }

    pub fn node_count(&mut self, label_id: i32, count: i64) {
        self.write(CountsKey::node(label_id), CountsValue::count(count));
    }

    pub fn relationship_count(
        &mut self,
        start_label_id: i32,
        type_id: i32,
        end_label_id: i32,
        count: i64,
    ) {
        self.write(
            CountsKey::relationship(start_label_id, type_id, end_label_id),
            CountsValue::count(count),
        );
    }

    /// Number of values written so far
    pub fn written(&self) -> usize {
        self.written
    }
}
