//! Tracker Module
//!
//! The mutable view layered over the live counts file.
//!
//! ## Responsibilities
//! - Serve reads: overlay first, durable file second
//! - Absorb concurrent increments without a coarse lock
//! - Produce the merged, sorted stream a rotation writes
//!
//! ## Data Structure Choice
//! A `DashMap` shards keys across independently locked buckets, and each
//! entry is an `AtomicCell` updated by compare-and-swap, so increments to
//! different keys never contend and increments to the same key never lose
//! updates.

mod merge;
mod state;

pub use merge::merge_sorted;
pub use state::{Change, TrackerState};
