//! Tests for the streaming merge
//!
//! These tests verify:
//! - Interleaving of stored and overlay entries
//! - Overlay values win on equal keys
//! - Zero results are dropped
//! - Errors from either side stop the merge

use countstore::error::{CountsError, Result};
use countstore::key::{CountsKey, CountsValue};
use countstore::tracker::merge_sorted;

fn node(label: i32, count: i64) -> (CountsKey, CountsValue) {
    (CountsKey::node(label), CountsValue::count(count))
}

fn merge(
    stored: Vec<(CountsKey, CountsValue)>,
    overlay: Vec<(CountsKey, CountsValue)>,
) -> Vec<(CountsKey, CountsValue)> {
    let mut out = Vec::new();
    merge_sorted(stored.into_iter().map(Ok), overlay, |key, value| {
        out.push((key, value));
        Ok(())
    })
    .unwrap();
    out
}

#[test]
fn test_overlay_interleaves_and_wins() {
    let out = merge(vec![node(1, 1), node(3, 3)], vec![node(2, 2), node(3, 13)]);
    assert_eq!(out, vec![node(1, 1), node(2, 2), node(3, 13)]);
}

#[test]
fn test_zero_overlay_value_removes_stored_entry() {
    let out = merge(vec![node(1, 1), node(2, 5)], vec![node(2, 0)]);
    assert_eq!(out, vec![node(1, 1)]);
}

#[test]
fn test_zero_only_in_overlay_is_skipped() {
    let out = merge(vec![], vec![node(1, 0), node(2, 4)]);
    assert_eq!(out, vec![node(2, 4)]);
}

#[test]
fn test_overlay_beyond_stored_range() {
    let out = merge(vec![node(5, 5)], vec![node(1, 1), node(9, 9)]);
    assert_eq!(out, vec![node(1, 1), node(5, 5), node(9, 9)]);
}

#[test]
fn test_mixed_key_kinds_keep_global_order() {
    let rel = (CountsKey::relationship(1, 2, 3), CountsValue::count(7));
    let sample = (CountsKey::index_sample(1, 1), CountsValue::new(3, 9));
    let out = merge(vec![node(1, 1), sample], vec![rel]);
    assert_eq!(out, vec![node(1, 1), rel, sample]);
}

#[test]
fn test_stored_error_propagates() {
    let stored: Vec<Result<(CountsKey, CountsValue)>> = vec![
        Ok(node(1, 1)),
        Err(CountsError::Storage("broken".to_string())),
        Ok(node(3, 3)),
    ];
    let mut seen = 0;
    let result = merge_sorted(stored, vec![node(2, 2)], |_, _| {
        seen += 1;
        Ok(())
    });
    assert!(result.is_err());
    assert_eq!(seen, 1);
}

#[test]
fn test_emit_error_propagates() {
    let result = merge_sorted(
        vec![Ok(node(1, 1)), Ok(node(2, 2))],
        Vec::<(CountsKey, CountsValue)>::new(),
        |key, _| {
            if key == CountsKey::node(2) {
                Err(CountsError::Storage("full".to_string()))
            } else {
                Ok(())
            }
        },
    );
    assert!(result.is_err());
}
