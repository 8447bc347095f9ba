//! Engine Module
//!
//! The counts store that coordinates all components.
//!
//! ## Responsibilities
//! - Select or create the live counts file on startup
//! - Hand out per-transaction updaters and apply their batches
//! - Rotate: merge the overlay into the other file and publish it
//! - Take consistent snapshots while writes continue

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::RwLock;

use crate::builder::{CountsBuilder, EmptyCountsBuilder, InitialCountsWriter};
use crate::config::Config;
use crate::error::{CountsError, Result};
use crate::health::StoreHealth;
use crate::key::{CountsKey, CountsValue};
use crate::sequence::TxSequence;
use crate::snapshot::{CountsSnapshot, PendingSnapshot};
use crate::storage::{ConsistencyReport, CountsVisitor, DurableStore, StoreFiles, WriterOptions};
use crate::tracker::{merge_sorted, Change, TrackerState};
use crate::updater::{ApplyMode, CountsUpdater};

/// What a rotation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// Nothing to write, or the store is read-only
    Skipped,
    /// A new file was written and is now live
    Rotated {
        file: PathBuf,
        tx_id: u64,
        minor_version: u64,
        records: u64,
    },
}

/// The counts store
///
/// ## Concurrency Model
///
/// - **Reads** (`get`): load the published `TrackerState` and read it; never
///   blocked by rotation except for the pointer swap itself
/// - **Updater batches**: applied under the shared side of `lock`; the
///   overlay itself is sharded and per-key atomic
/// - **Rotation** and the **snapshot copy step**: exclusive side of `lock`
/// - **Snapshot wait**: no lock, blocks the calling thread only
pub struct CountsStore {
    /// Store configuration
    config: Config,

    /// The `.a`/`.b` pair
    files: StoreFiles,

    /// Live durable file + overlay, swapped by rotation
    state: ArcSwap<TrackerState>,

    /// Shared: applying batches. Exclusive: rotation, snapshot copy
    lock: RwLock<()>,

    /// Applied transaction ids
    sequence: TxSequence,

    /// Accumulator of the snapshot in progress, if any
    pending_snapshot: ArcSwapOption<PendingSnapshot>,

    /// Shared health signal
    health: StoreHealth,
}

impl CountsStore {
    /// Open or create a counts store with the given config
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with(config, StoreHealth::new(), &EmptyCountsBuilder)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config)
    }

    /// Open or create a counts store
    ///
    /// On startup:
    /// 1. Select the live file (or create a fresh pair)
    /// 2. Seed the applied-tx sequence from its header
    /// 3. If the files were just created, run `builder` and persist
    pub fn open_with(
        config: Config,
        health: StoreHealth,
        builder: &dyn CountsBuilder,
    ) -> Result<Self> {
        config.validate()?;

        let files = StoreFiles::new(&config.data_dir, &config.base_name);
        let selection = files.open_or_create(config.read_only, config.records_per_page())?;

        let header = *selection.store.header();
        let sequence = TxSequence::new(
            header.highest_gap_free_tx_id,
            selection.store.stray_tx_ids().iter().copied(),
        );
        let created = selection.created;
        let state = TrackerState::new(selection.store, selection.slot);

        let store = Self {
            config,
            files,
            state: ArcSwap::from_pointee(state),
            lock: RwLock::new(()),
            sequence,
            pending_snapshot: ArcSwapOption::empty(),
            health,
        };

        if created {
            store.build_initial(builder)?;
        }
        Ok(store)
    }

    fn build_initial(&self, builder: &dyn CountsBuilder) -> Result<()> {
        let tx_id = builder.last_committed_tx_id();
        let written = {
            let state = self.state.load();
            let mut writer = InitialCountsWriter::new(&state);
            builder.build(&mut writer)?;
            writer.written()
        };
        tracing::info!(tx_id, written, "Built initial counts");

        self.sequence.advance_to(tx_id);
        self.rotate(tx_id)?;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current value for `key`, zero if never counted
    pub fn get(&self, key: &CountsKey) -> Result<CountsValue> {
        self.state.load().get(key)
    }

    pub fn node_count(&self, label_id: i32) -> Result<i64> {
        Ok(self.get(&CountsKey::node(label_id))?.second)
    }

    pub fn relationship_count(
        &self,
        start_label_id: i32,
        type_id: i32,
        end_label_id: i32,
    ) -> Result<i64> {
        let key = CountsKey::relationship(start_label_id, type_id, end_label_id);
        Ok(self.get(&key)?.second)
    }

    pub fn index_size(&self, label_id: i32, property_key_id: i32) -> Result<i64> {
        Ok(self.get(&CountsKey::index_size(label_id, property_key_id))?.second)
    }

    /// (unique values, sample size)
    pub fn index_sample(&self, label_id: i32, property_key_id: i32) -> Result<(i64, i64)> {
        let value = self.get(&CountsKey::index_sample(label_id, property_key_id))?;
        Ok((value.first, value.second))
    }

    /// Stream the live merged view in ascending key order
    pub fn visit_all<V: CountsVisitor + ?Sized>(&self, visitor: &mut V) -> Result<()> {
        self.state.load_full().visit_all(visitor)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Updater for a committing transaction
    pub fn apply(&self, tx_id: u64) -> Result<CountsUpdater<'_>> {
        self.updater(tx_id, ApplyMode::Normal)
    }

    /// Updater for a transaction replayed during recovery
    pub fn apply_recovered(&self, tx_id: u64) -> Result<CountsUpdater<'_>> {
        self.updater(tx_id, ApplyMode::Recovery)
    }

    /// Updater for `tx_id` in the given mode
    pub fn updater(&self, tx_id: u64, mode: ApplyMode) -> Result<CountsUpdater<'_>> {
        let applied = self.sequence.is_applied(tx_id);
        match (mode, applied) {
            (ApplyMode::Normal, true) => Err(CountsError::WatermarkViolation {
                tx_id,
                gap_free: self.sequence.gap_free(),
            }),
            (ApplyMode::Recovery, true) => {
                tracing::debug!(tx_id, "Ignoring already applied transaction");
                Ok(CountsUpdater::new(self, tx_id, true))
            }
            (_, false) => Ok(CountsUpdater::new(self, tx_id, false)),
        }
    }

    /// Apply one transaction's batch and record it as applied
    ///
    /// The tx id is claimed before any state changes, so a second batch for
    /// the same id is rejected without effect. Folding into a pending
    /// snapshot happens before the tx id is offered to the sequence, so a
    /// snapshot that sees the watermark pass its tx id has every batch it
    /// needs.
    pub(crate) fn apply_batch(&self, tx_id: u64, batch: HashMap<CountsKey, Change>) -> Result<()> {
        let _guard = self.lock.read();

        if !self.sequence.try_claim(tx_id) {
            return Err(CountsError::WatermarkViolation {
                tx_id,
                gap_free: self.sequence.gap_free(),
            });
        }

        if let Err(e) = self.state.load().apply_changes(&batch) {
            self.sequence.release(tx_id);
            return Err(e);
        }

        let pending = self.pending_snapshot.load();
        if let Some(pending) = &*pending {
            if tx_id <= pending.tx_id() {
                pending.fold(&batch);
            }
        }

        if !self.sequence.offer(tx_id) {
            return Err(CountsError::WatermarkViolation {
                tx_id,
                gap_free: self.sequence.gap_free(),
            });
        }
        Ok(())
    }

    // =========================================================================
    // Rotation
    // =========================================================================

    /// Merge the overlay into a new file at `last_committed_tx_id` and make
    /// it live
    ///
    /// Steps (all under the exclusive lock):
    /// 1. Reject a tx id below the live file's
    /// 2. Skip if nothing changed and the tx id is the same
    /// 3. Stream file + overlay into the other slot
    /// 4. Open it and swap in a fresh `TrackerState`
    pub fn rotate(&self, last_committed_tx_id: u64) -> Result<RotationOutcome> {
        if self.config.read_only {
            tracing::debug!(tx_id = last_committed_tx_id, "Read-only, skipping rotation");
            return Ok(RotationOutcome::Skipped);
        }

        let _guard = self.lock.write();
        let current = self.state.load_full();

        if last_committed_tx_id < current.tx_id() {
            return Err(CountsError::BackwardRotation {
                requested: last_committed_tx_id,
                current: current.tx_id(),
            });
        }
        if last_committed_tx_id == current.tx_id() && !current.has_changes() {
            tracing::debug!(tx_id = last_committed_tx_id, "No counts changes, skipping rotation");
            return Ok(RotationOutcome::Skipped);
        }

        let minor_version = if last_committed_tx_id == current.tx_id() {
            current.minor_version() + 1
        } else {
            1
        };
        let slot = current.slot().other();
        let target = self.files.path(slot);

        tracing::info!(
            file = %target.display(),
            tx_id = last_committed_tx_id,
            minor_version,
            changes = current.change_count(),
            "Rotating counts store"
        );

        let store = match self.write_rotation(&current, &target, last_committed_tx_id, minor_version)
        {
            Ok(store) => store,
            Err(e) => {
                self.health.panic(format!(
                    "Counts rotation to {} failed: {}",
                    target.display(),
                    e
                ));
                return Err(e);
            }
        };

        let records = store.record_count();
        self.state.store(Arc::new(TrackerState::new(store, slot)));

        tracing::info!(
            file = %target.display(),
            tx_id = last_committed_tx_id,
            minor_version,
            records,
            "Counts store rotated"
        );
        Ok(RotationOutcome::Rotated {
            file: target,
            tx_id: last_committed_tx_id,
            minor_version,
            records,
        })
    }

    fn write_rotation(
        &self,
        current: &TrackerState,
        target: &Path,
        tx_id: u64,
        minor_version: u64,
    ) -> Result<DurableStore> {
        let applied = self.sequence.snapshot();
        let options = WriterOptions {
            last_committed_tx_id: tx_id,
            minor_version,
            highest_gap_free_tx_id: applied.gap_free,
            stray_tx_ids: applied.strays,
            records_per_page: self.config.records_per_page(),
        };

        let mut writer = DurableStore::new_writer(target, options)?;
        current.write_merged(&mut writer)?;
        writer.finish()?;
        DurableStore::open(target)
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Counts as of exactly `tx_id` (or the highest applied tx, if later)
    ///
    /// Copies the overlay under the exclusive lock, then waits without the
    /// lock until every transaction up to the snapshot tx id has been
    /// applied. Only one snapshot may be in progress.
    pub fn snapshot(&self, tx_id: u64) -> Result<CountsSnapshot> {
        self.health.check()?;

        let (pending, state, changes) = {
            let _guard = self.lock.write();
            if self.pending_snapshot.load().is_some() {
                return Err(CountsError::SnapshotInProgress);
            }
            let snapshot_tx_id = tx_id.max(self.sequence.highest_seen());
            let state = self.state.load_full();
            let changes = state.sorted_changes();
            let pending = Arc::new(PendingSnapshot::new(snapshot_tx_id));
            self.pending_snapshot.store(Some(Arc::clone(&pending)));
            (pending, state, changes)
        };
        let _clear = ClearPending(&self.pending_snapshot);

        tracing::info!(tx_id = pending.tx_id(), "Counts snapshot started");

        let mut base = BTreeMap::new();
        merge_sorted(state.store().iter(), changes, |key, value| {
            base.insert(key, value);
            Ok(())
        })?;
        drop(state);

        self.sequence.await_gap_free(
            pending.tx_id(),
            &self.health,
            self.config.snapshot_poll_interval(),
            self.config.snapshot_timeout(),
        )?;

        let snapshot = pending.finish(base);
        tracing::info!(
            tx_id = snapshot.tx_id(),
            entries = snapshot.len(),
            "Counts snapshot completed"
        );
        Ok(snapshot)
    }

    /// Structural check of the live durable file
    pub fn consistency_check(&self) -> Result<ConsistencyReport> {
        self.state.load().store().consistency_check()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the store, rotating any pending changes first
    pub fn close(self) -> Result<()> {
        let state = self.state.load_full();
        if state.has_changes() && !self.config.read_only {
            let tx_id = state.tx_id().max(self.sequence.gap_free());
            drop(state);
            self.rotate(tx_id)?;
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Tx id of the live file
    pub fn tx_id(&self) -> u64 {
        self.state.load().tx_id()
    }

    /// Minor version of the live file
    pub fn minor_version(&self) -> u64 {
        self.state.load().minor_version()
    }

    /// Highest tx id below which everything has been applied
    pub fn gap_free_tx_id(&self) -> u64 {
        self.sequence.gap_free()
    }

    /// Whether `tx_id` has been applied
    pub fn is_applied(&self, tx_id: u64) -> bool {
        self.sequence.is_applied(tx_id)
    }

    /// Whether there are changes not yet rotated into a file
    pub fn has_changes(&self) -> bool {
        self.state.load().has_changes()
    }

    /// Whether a snapshot is waiting for its transactions
    pub fn snapshot_in_progress(&self) -> bool {
        self.pending_snapshot.load().is_some()
    }

    /// Path of the live file
    pub fn live_file(&self) -> PathBuf {
        self.state.load().store().path().to_path_buf()
    }

    pub fn files(&self) -> &StoreFiles {
        &self.files
    }

    pub fn health(&self) -> &StoreHealth {
        &self.health
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Clears the pending snapshot slot however `snapshot()` exits
struct ClearPending<'a>(&'a ArcSwapOption<PendingSnapshot>);

impl Drop for ClearPending<'_> {
    fn drop(&mut self) {
        self.0.store(None);
    }
}
