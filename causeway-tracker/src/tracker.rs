//! Per-partition tracking of in-flight and acknowledged offsets.
//!
//! An [`OffsetTracker`] is told about every record read from the log
//! (`track`), every AMQP acceptance disposition (`delivered`, in any order),
//! and answers with the per-partition offsets that are safe to persist as
//! resume points (`offsets_to_commit`). Applying a commit result with
//! `commit` advances the bookkeeping so offsets are not reported twice.
//!
//! `track` calls arrive in offset order per partition (as the log delivers
//! them); `delivered` calls carry no ordering guarantee at all, and may land
//! after later offsets have already been tracked or delivered.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use causeway_core::{Offset, PartitionId};
use roaring::RoaringTreemap;
use tracing::debug;

use crate::window::BitWindow;

/// Mapping from partition to the offset that is newly safe to commit.
///
/// The broker resumes from `offset + 1`. Partitions with nothing newly
/// committable have no entry.
pub type CommitMap = HashMap<PartitionId, Offset>;

// Bound on contiguous-prefix walks, TigerStyle.
const MAX_PREFIX_WALK: u64 = 10_000_000;

// -----------------------------------------------------------------------------
// Tracker contract
// -----------------------------------------------------------------------------

/// Per-partition offset bookkeeping behind the sink endpoint.
///
/// Strategies differ in state kept and in how much safety they trade for
/// memory; see the crate docs. Committed offsets per partition are
/// monotonically non-decreasing across any call sequence, and a tracker
/// never reports an offset it has not been told was tracked first.
pub trait OffsetTracker: Send {
    /// Informs the tracker that a record at `offset` was read from the log.
    ///
    /// The first call for a partition establishes that partition's baseline.
    fn track(&mut self, partition: PartitionId, offset: Offset);

    /// Informs the tracker that the AMQP peer accepted the message at
    /// `offset`.
    ///
    /// Dispositions for partitions that are no longer tracked (for example
    /// after revocation) are ignored.
    fn delivered(&mut self, partition: PartitionId, offset: Offset);

    /// Returns the current commit result without mutating tracker state.
    fn offsets_to_commit(&self) -> CommitMap;

    /// Applies a previously obtained commit result.
    ///
    /// Idempotent against stale or duplicate entries; an empty map is a
    /// no-op.
    fn commit(&mut self, offsets: &CommitMap);

    /// Discards tracking state for the given partitions (revocation).
    fn clear_partitions(&mut self, partitions: &[PartitionId]);

    /// Discards all tracking state (shutdown).
    fn clear(&mut self);
}

// -----------------------------------------------------------------------------
// Strategy selection
// -----------------------------------------------------------------------------

/// Which tracker strategy the endpoint uses.
///
/// A closed set, selected by configuration; there is no plugin surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerStrategy {
    /// Highest-delivered-offset only; commits past gaps.
    Simple,
    /// Explicit per-offset records; exact.
    Full,
    /// Bit-window per partition; exact and compact.
    #[default]
    Window,
}

impl TrackerStrategy {
    /// Builds a tracker for this strategy.
    #[must_use]
    pub fn build(self) -> Box<dyn OffsetTracker> {
        match self {
            Self::Simple => Box::new(SimpleOffsetTracker::new()),
            Self::Full => Box::new(FullOffsetTracker::new()),
            Self::Window => Box::new(WindowOffsetTracker::new()),
        }
    }
}

// -----------------------------------------------------------------------------
// Simple (scalar) strategy
// -----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SimpleState {
    /// Highest offset the peer has accepted so far.
    highest_delivered: Option<Offset>,
    /// Last offset handed out in a commit result.
    last_committed: Option<Offset>,
}

/// Scalar tracker: remembers only the highest delivered offset per partition.
///
/// A later, higher acknowledgment commits past lower, still-unacknowledged
/// offsets. Acceptable only when losing skipped messages is tolerable.
#[derive(Debug, Default)]
pub struct SimpleOffsetTracker {
    partitions: HashMap<PartitionId, SimpleState>,
}

impl SimpleOffsetTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl OffsetTracker for SimpleOffsetTracker {
    fn track(&mut self, partition: PartitionId, _offset: Offset) {
        self.partitions.entry(partition).or_default();
    }

    fn delivered(&mut self, partition: PartitionId, offset: Offset) {
        let Some(state) = self.partitions.get_mut(&partition) else {
            debug!(%partition, %offset, "Disposition for untracked partition ignored");
            return;
        };
        if state.highest_delivered.is_none_or(|h| offset > h) {
            state.highest_delivered = Some(offset);
        }
    }

    fn offsets_to_commit(&self) -> CommitMap {
        let mut result = CommitMap::new();
        for (&partition, state) in &self.partitions {
            if let Some(highest) = state.highest_delivered {
                if state.last_committed.is_none_or(|c| highest > c) {
                    result.insert(partition, highest);
                }
            }
        }
        result
    }

    fn commit(&mut self, offsets: &CommitMap) {
        for (partition, &offset) in offsets {
            if let Some(state) = self.partitions.get_mut(partition) {
                if state.last_committed.is_none_or(|c| offset > c) {
                    state.last_committed = Some(offset);
                }
            }
        }
    }

    fn clear_partitions(&mut self, partitions: &[PartitionId]) {
        for partition in partitions {
            self.partitions.remove(partition);
        }
    }

    fn clear(&mut self) {
        self.partitions.clear();
    }
}

// -----------------------------------------------------------------------------
// Full (explicit) strategy
// -----------------------------------------------------------------------------

#[derive(Debug)]
struct FullState {
    /// Next offset that must be delivered before the commit point advances.
    next_to_commit: Offset,
    /// Every tracked, not-yet-committed offset.
    tracked: RoaringTreemap,
    /// Every delivered, not-yet-committed offset.
    delivered: RoaringTreemap,
}

/// Explicit tracker: one entry per in-flight message.
///
/// Exact commit rule (longest contiguous delivered prefix), at the cost of
/// per-message state.
#[derive(Debug, Default)]
pub struct FullOffsetTracker {
    partitions: HashMap<PartitionId, FullState>,
}

impl FullOffsetTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl OffsetTracker for FullOffsetTracker {
    fn track(&mut self, partition: PartitionId, offset: Offset) {
        let state = match self.partitions.entry(partition) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                debug!(%partition, baseline = %offset, "Tracking new partition");
                e.insert(FullState {
                    next_to_commit: offset,
                    tracked: RoaringTreemap::new(),
                    delivered: RoaringTreemap::new(),
                })
            }
        };
        state.tracked.insert(offset.get());
    }

    fn delivered(&mut self, partition: PartitionId, offset: Offset) {
        let Some(state) = self.partitions.get_mut(&partition) else {
            debug!(%partition, %offset, "Disposition for untracked partition ignored");
            return;
        };
        if state.tracked.contains(offset.get()) {
            state.delivered.insert(offset.get());
        }
    }

    fn offsets_to_commit(&self) -> CommitMap {
        let mut result = CommitMap::new();
        for (&partition, state) in &self.partitions {
            let start = state.next_to_commit.get();
            let mut next = start;
            while next - start < MAX_PREFIX_WALK && state.delivered.contains(next) {
                next += 1;
            }
            if next > start {
                result.insert(partition, Offset::new(next - 1));
            }
        }
        result
    }

    fn commit(&mut self, offsets: &CommitMap) {
        for (partition, &offset) in offsets {
            let Some(state) = self.partitions.get_mut(partition) else {
                continue;
            };
            // Stale entries (already committed past) are a no-op.
            if offset < state.next_to_commit {
                continue;
            }
            state.next_to_commit = offset.next();
            state.tracked.remove_range(..=offset.get());
            state.delivered.remove_range(..=offset.get());
        }
    }

    fn clear_partitions(&mut self, partitions: &[PartitionId]) {
        for partition in partitions {
            self.partitions.remove(partition);
        }
    }

    fn clear(&mut self) {
        self.partitions.clear();
    }
}

// -----------------------------------------------------------------------------
// Bit-window strategy
// -----------------------------------------------------------------------------

/// Bit-window tracker: one [`BitWindow`] per partition, baseline at the next
/// offset to commit.
///
/// Same commit rule as [`FullOffsetTracker`] but bits instead of per-message
/// records. The preferred production strategy.
#[derive(Debug, Default)]
pub struct WindowOffsetTracker {
    partitions: HashMap<PartitionId, BitWindow>,
}

impl WindowOffsetTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl OffsetTracker for WindowOffsetTracker {
    fn track(&mut self, partition: PartitionId, offset: Offset) {
        if let Entry::Vacant(e) = self.partitions.entry(partition) {
            debug!(%partition, baseline = %offset, "Tracking new partition");
            e.insert(BitWindow::new(offset));
        }
    }

    fn delivered(&mut self, partition: PartitionId, offset: Offset) {
        let Some(window) = self.partitions.get_mut(&partition) else {
            debug!(%partition, %offset, "Disposition for untracked partition ignored");
            return;
        };
        // Dispositions below the baseline are duplicates of already-committed
        // offsets.
        if offset >= window.baseline() {
            window.set(offset);
        }
    }

    fn offsets_to_commit(&self) -> CommitMap {
        let mut result = CommitMap::new();
        for (&partition, window) in &self.partitions {
            let lowest = window.lowest_set_bits();
            if lowest != 0 {
                result.insert(partition, Offset::new(window.baseline().get() + lowest - 1));
            }
        }
        result
    }

    fn commit(&mut self, offsets: &CommitMap) {
        for (partition, &offset) in offsets {
            let Some(window) = self.partitions.get_mut(partition) else {
                continue;
            };
            if offset < window.baseline() {
                continue;
            }
            let new_baseline = window.rshift(offset.get() - window.baseline().get() + 1);
            debug!(%partition, committed = %offset, baseline = %new_baseline, "Advanced window");
        }
    }

    fn clear_partitions(&mut self, partitions: &[PartitionId]) {
        for partition in partitions {
            self.partitions.remove(partition);
        }
    }

    fn clear(&mut self) {
        self.partitions.clear();
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const P0: PartitionId = PartitionId::new(0);

    fn track_range(tracker: &mut dyn OffsetTracker, partition: PartitionId, range: std::ops::Range<u64>) {
        for offset in range {
            tracker.track(partition, Offset::new(offset));
        }
    }

    /// Delivers one offset, then runs a full reconciliation cycle, returning
    /// the commit result that was applied.
    fn deliver_cycle(tracker: &mut dyn OffsetTracker, offset: u64) -> CommitMap {
        tracker.delivered(P0, Offset::new(offset));
        let offsets = tracker.offsets_to_commit();
        tracker.commit(&offsets);
        offsets
    }

    fn assert_commits(tracker: &mut dyn OffsetTracker, deliveries: &[u64], expected: &[Option<u64>]) {
        assert_eq!(deliveries.len(), expected.len());
        for (&delivery, &expect) in deliveries.iter().zip(expected) {
            let offsets = deliver_cycle(tracker, delivery);
            match expect {
                None => assert!(offsets.is_empty(), "delivery {delivery}: expected no commit, got {offsets:?}"),
                Some(offset) => {
                    assert_eq!(offsets.len(), 1, "delivery {delivery}");
                    assert_eq!(offsets[&P0], Offset::new(offset), "delivery {delivery}");
                }
            }
        }
    }

    #[test]
    fn test_full_tracker_in_order() {
        let mut tracker = FullOffsetTracker::new();
        track_range(&mut tracker, P0, 0..6);
        assert_commits(
            &mut tracker,
            &[0, 1, 2, 3, 4, 5],
            &[Some(0), Some(1), Some(2), Some(3), Some(4), Some(5)],
        );
        tracker.clear();
    }

    #[test]
    fn test_full_tracker_out_of_order() {
        let mut tracker = FullOffsetTracker::new();
        track_range(&mut tracker, P0, 0..6);
        assert_commits(
            &mut tracker,
            &[2, 3, 0, 1, 4, 5],
            &[None, None, Some(0), Some(3), Some(4), Some(5)],
        );
        tracker.clear();
    }

    #[test]
    fn test_window_tracker_in_order() {
        let mut tracker = WindowOffsetTracker::new();
        track_range(&mut tracker, P0, 0..6);
        assert_commits(
            &mut tracker,
            &[0, 1, 2, 3, 4, 5],
            &[Some(0), Some(1), Some(2), Some(3), Some(4), Some(5)],
        );
        tracker.clear();
    }

    #[test]
    fn test_window_tracker_out_of_order() {
        let mut tracker = WindowOffsetTracker::new();
        track_range(&mut tracker, P0, 0..6);
        assert_commits(
            &mut tracker,
            &[2, 3, 0, 1, 4, 5],
            &[None, None, Some(0), Some(3), Some(4), Some(5)],
        );
        tracker.clear();
    }

    #[test]
    fn test_simple_tracker_in_order() {
        let mut tracker = SimpleOffsetTracker::new();
        track_range(&mut tracker, P0, 0..6);
        assert_commits(
            &mut tracker,
            &[0, 1, 2, 3, 4, 5],
            &[Some(0), Some(1), Some(2), Some(3), Some(4), Some(5)],
        );
        tracker.clear();
    }

    #[test]
    fn test_simple_tracker_out_of_order_skips_gaps() {
        let mut tracker = SimpleOffsetTracker::new();
        track_range(&mut tracker, P0, 0..6);
        // The scalar strategy commits past the unacknowledged 0 and 1.
        assert_commits(
            &mut tracker,
            &[2, 3, 0, 1, 4, 5],
            &[Some(2), Some(3), None, None, Some(4), Some(5)],
        );
        tracker.clear();
    }

    #[test]
    fn test_commit_empty_map_is_noop() {
        for strategy in [TrackerStrategy::Simple, TrackerStrategy::Full, TrackerStrategy::Window] {
            let mut tracker = strategy.build();
            tracker.track(P0, Offset::new(0));
            tracker.delivered(P0, Offset::new(0));
            tracker.commit(&CommitMap::new());
            let offsets = tracker.offsets_to_commit();
            assert_eq!(offsets[&P0], Offset::new(0), "{strategy:?}");
        }
    }

    #[test]
    fn test_commit_is_idempotent_against_stale_entries() {
        for strategy in [TrackerStrategy::Simple, TrackerStrategy::Full, TrackerStrategy::Window] {
            let mut tracker = strategy.build();
            track_range(tracker.as_mut(), P0, 0..3);
            tracker.delivered(P0, Offset::new(0));
            tracker.delivered(P0, Offset::new(1));

            let offsets = tracker.offsets_to_commit();
            assert_eq!(offsets[&P0], Offset::new(1), "{strategy:?}");
            tracker.commit(&offsets);
            // Replaying the same (now stale) result must not regress.
            tracker.commit(&offsets);

            tracker.delivered(P0, Offset::new(2));
            let offsets = tracker.offsets_to_commit();
            assert_eq!(offsets[&P0], Offset::new(2), "{strategy:?}");
        }
    }

    #[test]
    fn test_commit_offsets_monotonic_per_partition() {
        for strategy in [TrackerStrategy::Simple, TrackerStrategy::Full, TrackerStrategy::Window] {
            let mut tracker = strategy.build();
            track_range(tracker.as_mut(), P0, 0..16);
            let deliveries = [3u64, 0, 7, 1, 2, 15, 4, 5, 6, 9, 8, 10, 12, 11, 14, 13];

            let mut last: Option<Offset> = None;
            for delivery in deliveries {
                tracker.delivered(P0, Offset::new(delivery));
                let offsets = tracker.offsets_to_commit();
                if let Some(&offset) = offsets.get(&P0) {
                    if let Some(prev) = last {
                        assert!(offset >= prev, "{strategy:?}: {offset} < {prev}");
                    }
                    last = Some(offset);
                    tracker.commit(&offsets);
                }
            }
            // Every strategy ends fully committed once all deliveries landed.
            assert_eq!(last, Some(Offset::new(15)), "{strategy:?}");
        }
    }

    #[test]
    fn test_never_commits_untracked_offsets() {
        // A gap that is never delivered pins the exact strategies forever.
        for strategy in [TrackerStrategy::Full, TrackerStrategy::Window] {
            let mut tracker = strategy.build();
            track_range(tracker.as_mut(), P0, 0..4);
            for offset in [1u64, 2, 3] {
                tracker.delivered(P0, Offset::new(offset));
            }
            assert!(tracker.offsets_to_commit().is_empty(), "{strategy:?}");
        }
    }

    #[test]
    fn test_independent_partitions() {
        let p1 = PartitionId::new(1);
        let mut tracker = WindowOffsetTracker::new();
        tracker.track(P0, Offset::new(0));
        tracker.track(p1, Offset::new(100));

        tracker.delivered(p1, Offset::new(100));
        let offsets = tracker.offsets_to_commit();
        assert_eq!(offsets.len(), 1);
        assert_eq!(offsets[&p1], Offset::new(100));

        tracker.delivered(P0, Offset::new(0));
        let offsets = tracker.offsets_to_commit();
        assert_eq!(offsets.len(), 2);
        assert_eq!(offsets[&P0], Offset::new(0));
    }

    #[test]
    fn test_clear_partitions_scoped_to_revoked_set() {
        let p1 = PartitionId::new(1);
        let mut tracker = FullOffsetTracker::new();
        tracker.track(P0, Offset::new(0));
        tracker.track(p1, Offset::new(0));
        tracker.delivered(P0, Offset::new(0));
        tracker.delivered(p1, Offset::new(0));

        tracker.clear_partitions(&[P0]);

        let offsets = tracker.offsets_to_commit();
        assert!(!offsets.contains_key(&P0));
        assert_eq!(offsets[&p1], Offset::new(0));
    }

    #[test]
    fn test_delivered_after_later_batch_tracked() {
        // Dispositions race with later batches: a `delivered` for batch one
        // may be observed after `track` for batch two.
        let mut tracker = WindowOffsetTracker::new();
        track_range(&mut tracker, P0, 0..2); // Batch one.
        tracker.delivered(P0, Offset::new(1));
        track_range(&mut tracker, P0, 2..4); // Batch two.
        tracker.delivered(P0, Offset::new(0)); // Late disposition.

        let offsets = tracker.offsets_to_commit();
        assert_eq!(offsets[&P0], Offset::new(1));
    }

    #[test]
    fn test_tracker_baseline_above_zero() {
        for strategy in [TrackerStrategy::Full, TrackerStrategy::Window] {
            let mut tracker = strategy.build();
            track_range(tracker.as_mut(), P0, 1000..1003);
            tracker.delivered(P0, Offset::new(1000));
            let offsets = tracker.offsets_to_commit();
            assert_eq!(offsets[&P0], Offset::new(1000), "{strategy:?}");
        }
    }

    #[test]
    fn test_strategy_build() {
        // The closed set of strategies all construct.
        for strategy in [TrackerStrategy::Simple, TrackerStrategy::Full, TrackerStrategy::Window] {
            let mut tracker = strategy.build();
            tracker.track(P0, Offset::new(0));
            assert!(tracker.offsets_to_commit().is_empty());
        }
    }
}
