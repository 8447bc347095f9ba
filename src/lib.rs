//! # countstore
//!
//! A durable, concurrent counts store for a graph database:
//! - Node counts per label, relationship counts per (start, type, end)
//! - Index size and sample statistics
//! - Two alternating durable files with atomic publication
//! - Lock-free increments on a concurrent overlay
//! - Consistent point-in-time snapshots while writes continue
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Committing Transactions                     │
//! │                (one CountsUpdater per tx)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     CountsStore                              │
//! │        (apply under read lock / rotate under write lock)     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼─────────────────┐
//!          │            │                 │
//!          ▼            ▼                 ▼
//!   ┌─────────────┐ ┌─────────────┐ ┌─────────────┐
//!   │ TxSequence  │ │TrackerState │ │  Pending    │
//!   │ (gap-free)  │ │  (overlay)  │ │  Snapshot   │
//!   └─────────────┘ └──────┬──────┘ └─────────────┘
//!                          │
//!                          ▼
//!                  ┌───────────────┐
//!                  │ DurableStore  │
//!                  │ (.a  /  .b)   │
//!                  └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod health;

pub mod key;
pub mod sequence;
pub mod storage;
pub mod tracker;
pub mod snapshot;
pub mod builder;
pub mod updater;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use builder::{CountsBuilder, EmptyCountsBuilder, InitialCountsWriter};
pub use config::Config;
pub use engine::{CountsStore, RotationOutcome};
pub use error::{CountsError, Result};
pub use health::StoreHealth;
pub use key::{CountsKey, CountsValue, ANY_LABEL, ANY_RELATIONSHIP_TYPE};
pub use snapshot::CountsSnapshot;
pub use storage::CountsVisitor;
pub use updater::{ApplyMode, CountsUpdater};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of countstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
