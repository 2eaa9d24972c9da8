//! Offset reconciliation for the Causeway bridge.
//!
//! This crate computes, from an unordered stream of per-message
//! acknowledgments, the largest commit-safe offset per partition. The broker
//! checkpoint is cumulative ("resume from offset + 1"), while AMQP peers
//! accept messages individually and possibly out of order; the trackers here
//! reconcile the two.
//!
//! # Strategies
//!
//! Three interchangeable [`OffsetTracker`] strategies trade safety for cost:
//!
//! - [`SimpleOffsetTracker`]: keeps only the highest delivered offset per
//!   partition. Cheapest, but commits past unacknowledged gaps.
//! - [`FullOffsetTracker`]: keeps an explicit set of every in-flight offset.
//!   Exact, highest memory cost.
//! - [`WindowOffsetTracker`]: exact like Full, but compact - one
//!   [`BitWindow`] per partition records acknowledgments as bits relative to
//!   the next offset to commit. The preferred production strategy.
//!
//! # Example
//!
//! ```
//! use causeway_core::{Offset, PartitionId};
//! use causeway_tracker::{OffsetTracker, WindowOffsetTracker};
//!
//! let mut tracker = WindowOffsetTracker::new();
//! let p = PartitionId::new(0);
//!
//! tracker.track(p, Offset::new(0));
//! tracker.track(p, Offset::new(1));
//! tracker.delivered(p, Offset::new(1)); // Out of order.
//! assert!(tracker.offsets_to_commit().is_empty()); // Gap at 0.
//!
//! tracker.delivered(p, Offset::new(0));
//! let offsets = tracker.offsets_to_commit();
//! assert_eq!(offsets[&p], Offset::new(1)); // Contiguous prefix.
//! tracker.commit(&offsets);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod tracker;
mod window;

pub use tracker::{
    CommitMap, FullOffsetTracker, OffsetTracker, SimpleOffsetTracker, TrackerStrategy,
    WindowOffsetTracker,
};
pub use window::BitWindow;
