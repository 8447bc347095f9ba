//! Tests for CountsUpdater
//!
//! These tests verify:
//! - Batching of several changes to one key
//! - Apply on drop
//! - Watermark violations in normal mode, including racing closes
//! - Idempotent replay in recovery mode, including across restarts

use std::sync::Barrier;
use std::thread;

use countstore::config::Config;
use countstore::engine::CountsStore;
use countstore::error::CountsError;
use countstore::key::{CountsKey, CountsValue};
use countstore::updater::ApplyMode;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn config_for(temp_dir: &TempDir) -> Config {
    Config::builder().data_dir(temp_dir.path()).build()
}

fn setup_temp_store() -> (TempDir, CountsStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = CountsStore::open(config_for(&temp_dir)).unwrap();
    (temp_dir, store)
}

/// The same transaction body, replayable
fn replay(store: &CountsStore, tx_id: u64) {
    let mut updater = store.apply_recovered(tx_id).unwrap();
    updater.increment_node_count(1, 1);
    updater.increment_relationship_count(1, 2, 1, 1);
    updater.close().unwrap();
}

// =============================================================================
// Batching Tests
// =============================================================================

#[test]
fn test_changes_to_one_key_compose() {
    let (_dir, store) = setup_temp_store();

    let mut updater = store.apply(1).unwrap();
    updater.increment_node_count(1, 5);
    updater.increment_node_count(1, -2);
    updater.replace_index_size(1, 1, 10);
    updater.increment_index_size(1, 1, 3);
    updater.increment_value(CountsKey::index_sample(1, 1), CountsValue::new(2, 8));
    updater.close().unwrap();

    assert_eq!(store.node_count(1).unwrap(), 3);
    assert_eq!(store.index_size(1, 1).unwrap(), 13);
    assert_eq!(store.index_sample(1, 1).unwrap(), (2, 8));
}

#[test]
fn test_replace_after_rotation_overrides_file_value() {
    let (_dir, store) = setup_temp_store();
    let mut updater = store.apply(1).unwrap();
    updater.replace_index_sample(1, 1, 5, 50);
    updater.close().unwrap();
    store.rotate(1).unwrap();

    let mut updater = store.apply(2).unwrap();
    updater.replace_index_sample(1, 1, 7, 60);
    updater.close().unwrap();

    assert_eq!(store.index_sample(1, 1).unwrap(), (7, 60));
}

#[test]
fn test_drop_applies_batch() {
    let (_dir, store) = setup_temp_store();
    {
        let mut updater = store.apply(1).unwrap();
        updater.increment_node_count(4, 2);
    }

    assert_eq!(store.node_count(4).unwrap(), 2);
    assert!(store.is_applied(1));
}

#[test]
fn test_empty_updater_still_advances_watermark() {
    let (_dir, store) = setup_temp_store();
    store.apply(1).unwrap().close().unwrap();
    assert_eq!(store.gap_free_tx_id(), 1);
}

// =============================================================================
// Normal Mode Tests
// =============================================================================

#[test]
fn test_applied_tx_rejected_in_normal_mode() {
    let (_dir, store) = setup_temp_store();
    store.apply(1).unwrap().close().unwrap();
    store.apply(3).unwrap().close().unwrap();

    for tx_id in [0, 1, 3] {
        let err = store.apply(tx_id).err().unwrap();
        assert!(
            matches!(err, CountsError::WatermarkViolation { .. }),
            "{}: {}",
            tx_id,
            err
        );
    }
    assert!(store.apply(2).is_ok());
}

#[test]
fn test_duplicate_open_updaters_rejected_at_close() {
    let (_dir, store) = setup_temp_store();
    let mut first = store.apply(1).unwrap();
    let mut second = store.apply(1).unwrap();
    first.increment_node_count(1, 1);
    second.increment_node_count(1, 1);

    first.close().unwrap();
    let err = second.close().unwrap_err();
    assert!(matches!(err, CountsError::WatermarkViolation { .. }), "{}", err);
    assert_eq!(store.node_count(1).unwrap(), 1);
}

#[test]
fn test_racing_duplicate_closes_apply_once() {
    let (_dir, store) = setup_temp_store();

    for tx_id in 1..=300u64 {
        let label = tx_id as i32;
        let barrier = Barrier::new(2);
        let rejected: usize = thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let mut updater = store.apply(tx_id).unwrap();
                    updater.increment_node_count(label, 1);
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        updater.close()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|r| matches!(r, Err(CountsError::WatermarkViolation { .. })))
                .count()
        });

        assert_eq!(rejected, 1, "tx {}", tx_id);
        assert_eq!(store.node_count(label).unwrap(), 1, "tx {}", tx_id);
    }
    assert_eq!(store.gap_free_tx_id(), 300);
}

// =============================================================================
// Recovery Mode Tests
// =============================================================================

#[test]
fn test_recovery_replay_is_idempotent() {
    let (_dir, store) = setup_temp_store();
    replay(&store, 1);
    replay(&store, 1);

    assert_eq!(store.node_count(1).unwrap(), 1);
    assert_eq!(store.relationship_count(1, 2, 1).unwrap(), 1);
}

#[test]
fn test_recovery_updater_reports_ignored() {
    let (_dir, store) = setup_temp_store();
    replay(&store, 1);

    let updater = store.updater(1, ApplyMode::Recovery).unwrap();
    assert!(updater.is_ignored());
    let updater = store.updater(2, ApplyMode::Recovery).unwrap();
    assert!(!updater.is_ignored());
}

#[test]
fn test_replay_after_restart_skips_rotated_transactions() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = CountsStore::open(config_for(&temp_dir)).unwrap();
        for tx_id in 1..=3 {
            replay(&store, tx_id);
        }
        store.rotate(3).unwrap();
        replay(&store, 4);
        // crash: tx 4 never rotated
    }

    let store = CountsStore::open(config_for(&temp_dir)).unwrap();
    for tx_id in 1..=5 {
        replay(&store, tx_id);
    }
    assert_eq!(store.node_count(1).unwrap(), 5);
    assert_eq!(store.gap_free_tx_id(), 5);
}

#[test]
fn test_out_of_order_transactions_survive_restart() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = CountsStore::open(config_for(&temp_dir)).unwrap();
        replay(&store, 1);
        replay(&store, 3);
        replay(&store, 5);
        // tx 2 and 4 still open when the checkpoint happens
        store.rotate(5).unwrap();
    }

    let store = CountsStore::open(config_for(&temp_dir)).unwrap();
    assert_eq!(store.gap_free_tx_id(), 1);
    assert!(store.is_applied(3));
    assert!(store.is_applied(5));
    assert!(!store.is_applied(2));

    for tx_id in 1..=5 {
        replay(&store, tx_id);
    }
    assert_eq!(store.node_count(1).unwrap(), 5);
    assert_eq!(store.gap_free_tx_id(), 5);
}
