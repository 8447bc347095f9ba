//! Tests for CountsKey and CountsValue
//!
//! These tests verify:
//! - Key ordering (kind first, then fields in declaration order)
//! - MIN / MAX bounds
//! - Value arithmetic and zero handling
//! - Display formatting used by the dump tool

use countstore::key::{CountsKey, CountsValue, ANY_LABEL, ANY_RELATIONSHIP_TYPE};
use proptest::prelude::*;

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_kinds_order_node_relationship_index_size_index_sample() {
    let node = CountsKey::node(i32::MAX);
    let rel = CountsKey::relationship(i32::MIN, i32::MIN, i32::MIN);
    let size = CountsKey::index_size(i32::MIN, i32::MIN);
    let sample = CountsKey::index_sample(i32::MIN, i32::MIN);

    assert!(node < rel);
    assert!(rel < size);
    assert!(size < sample);
}

#[test]
fn test_relationship_fields_compare_in_order() {
    assert!(CountsKey::relationship(1, 9, 9) < CountsKey::relationship(2, 0, 0));
    assert!(CountsKey::relationship(1, 1, 9) < CountsKey::relationship(1, 2, 0));
    assert!(CountsKey::relationship(1, 1, 1) < CountsKey::relationship(1, 1, 2));
}

#[test]
fn test_wildcards_sort_before_concrete_ids() {
    assert!(CountsKey::node(ANY_LABEL) < CountsKey::node(0));
    assert!(
        CountsKey::relationship(ANY_LABEL, ANY_RELATIONSHIP_TYPE, ANY_LABEL)
            < CountsKey::relationship(0, 0, 0)
    );
}

fn any_key() -> impl Strategy<Value = CountsKey> {
    prop_oneof![
        any::<i32>().prop_map(CountsKey::node),
        (any::<i32>(), any::<i32>(), any::<i32>())
            .prop_map(|(s, t, e)| CountsKey::relationship(s, t, e)),
        (any::<i32>(), any::<i32>()).prop_map(|(l, p)| CountsKey::index_size(l, p)),
        (any::<i32>(), any::<i32>()).prop_map(|(l, p)| CountsKey::index_sample(l, p)),
    ]
}

proptest! {
    #[test]
    fn prop_every_key_within_bounds(key in any_key()) {
        prop_assert!(CountsKey::MIN <= key);
        prop_assert!(key <= CountsKey::MAX);
    }

    #[test]
    fn prop_order_is_total_and_antisymmetric(a in any_key(), b in any_key()) {
        let ab = a.cmp(&b);
        let ba = b.cmp(&a);
        prop_assert_eq!(ab, ba.reverse());
        prop_assert_eq!(ab == std::cmp::Ordering::Equal, a == b);
    }
}

// =============================================================================
// Value Tests
// =============================================================================

#[test]
fn test_count_uses_second_register() {
    let value = CountsValue::count(7);
    assert_eq!(value.first, 0);
    assert_eq!(value.second, 7);
}

#[test]
fn test_plus_adds_both_registers() {
    let value = CountsValue::new(1, 10).plus(CountsValue::new(2, -3));
    assert_eq!(value, CountsValue::new(3, 7));
}

#[test]
fn test_zero_detection() {
    assert!(CountsValue::ZERO.is_zero());
    assert!(CountsValue::default().is_zero());
    assert!(CountsValue::count(5).plus(CountsValue::count(-5)).is_zero());
    assert!(!CountsValue::new(1, 0).is_zero());
}

// =============================================================================
// Display Tests
// =============================================================================

#[test]
fn test_display_marks_wildcards() {
    let any = CountsKey::relationship(ANY_LABEL, ANY_RELATIONSHIP_TYPE, ANY_LABEL).to_string();
    let typed = CountsKey::relationship(1, 2, 3).to_string();
    assert_ne!(any, typed);
    assert!(typed.contains(":2"));
    assert_eq!(CountsValue::new(3, 4).to_string(), "(3, 4)");
}
