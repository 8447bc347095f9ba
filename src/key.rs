//! Counts keys and values
//!
//! A `CountsKey` names one tracked statistic. The derived ordering (variant
//! rank in declaration order, then fields in declaration order) is the
//! on-disk sort order, so reordering variants or fields is a format change.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Wildcard label id: "any label"
pub const ANY_LABEL: i32 = -1;

/// Wildcard relationship type id: "any type"
pub const ANY_RELATIONSHIP_TYPE: i32 = -1;

/// Identity of a tracked statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CountsKey {
    /// Number of nodes carrying a label
    Node { label_id: i32 },

    /// Number of relationships matching (start label, type, end label)
    Relationship {
        start_label_id: i32,
        type_id: i32,
        end_label_id: i32,
    },

    /// Number of entries in an index
    IndexSize { label_id: i32, property_key_id: i32 },

    /// (unique values, sample size) of an index sample
    IndexSample { label_id: i32, property_key_id: i32 },
}

impl CountsKey {
    pub fn node(label_id: i32) -> Self {
        CountsKey::Node { label_id }
    }

    pub fn relationship(start_label_id: i32, type_id: i32, end_label_id: i32) -> Self {
        CountsKey::Relationship {
            start_label_id,
            type_id,
            end_label_id,
        }
    }

    pub fn index_size(label_id: i32, property_key_id: i32) -> Self {
        CountsKey::IndexSize {
            label_id,
            property_key_id,
        }
    }

    pub fn index_sample(label_id: i32, property_key_id: i32) -> Self {
        CountsKey::IndexSample {
            label_id,
            property_key_id,
        }
    }

    /// Smallest possible key
    pub const MIN: CountsKey = CountsKey::Node { label_id: i32::MIN };

    /// Largest possible key
    pub const MAX: CountsKey = CountsKey::IndexSample {
        label_id: i32::MAX,
        property_key_id: i32::MAX,
    };
}

impl fmt::Display for CountsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountsKey::Node { label_id } => write!(f, "node[({})]", label(*label_id)),
            CountsKey::Relationship {
                start_label_id,
                type_id,
                end_label_id,
            } => write!(
                f,
                "relationship[({})-{}->({})]",
                label(*start_label_id),
                rel_type(*type_id),
                label(*end_label_id)
            ),
            CountsKey::IndexSize {
                label_id,
                property_key_id,
            } => write!(f, "index_size[:{}({})]", label_id, property_key_id),
            CountsKey::IndexSample {
                label_id,
                property_key_id,
            } => write!(f, "index_sample[:{}({})]", label_id, property_key_id),
        }
    }
}

fn label(id: i32) -> String {
    if id == ANY_LABEL {
        String::new()
    } else {
        format!(":{}", id)
    }
}

fn rel_type(id: i32) -> String {
    if id == ANY_RELATIONSHIP_TYPE {
        "[]".to_string()
    } else {
        format!("[:{}]", id)
    }
}

/// One or two 64-bit registers. Plain counts use only `second`; index
/// samples use `first` for unique values and `second` for sample size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CountsValue {
    pub first: i64,
    pub second: i64,
}

impl CountsValue {
    pub const ZERO: CountsValue = CountsValue { first: 0, second: 0 };

    pub fn new(first: i64, second: i64) -> Self {
        Self { first, second }
    }

    /// A single count held in the second register
    pub fn count(count: i64) -> Self {
        Self {
            first: 0,
            second: count,
        }
    }

    /// (0, 0) is equivalent to absence
    pub fn is_zero(&self) -> bool {
        self.first == 0 && self.second == 0
    }

    pub fn plus(self, delta: CountsValue) -> CountsValue {
        CountsValue {
            first: self.first.wrapping_add(delta.first),
            second: self.second.wrapping_add(delta.second),
        }
    }
}

impl fmt::Display for CountsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.first, self.second)
    }
}
