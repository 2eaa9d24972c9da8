//! Exclusive partition claims shared across sink endpoints.
//!
//! A partition-filtered receiver gets its partition exclusively; a second
//! attach for the same topic partition is refused until the first endpoint
//! releases it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use causeway_core::TopicPartition;
use tracing::debug;

/// Registry of topic partitions currently held by a receiver.
///
/// Cheap to clone; all clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct PartitionClaims {
    claimed: Arc<Mutex<HashSet<TopicPartition>>>,
}

impl PartitionClaims {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a partition exclusively. Returns false when it is already held.
    #[must_use]
    pub fn try_claim(&self, tp: &TopicPartition) -> bool {
        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        let acquired = claimed.insert(tp.clone());
        debug!(%tp, acquired, "partition claim attempt");
        acquired
    }

    /// Releases a previously claimed partition. Releasing an unclaimed
    /// partition is a no-op.
    pub fn release(&self, tp: &TopicPartition) {
        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        if claimed.remove(tp) {
            debug!(%tp, "partition claim released");
        }
    }

    /// Whether the partition is currently held.
    #[must_use]
    pub fn is_claimed(&self, tp: &TopicPartition) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(tp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway_core::PartitionId;

    fn tp(partition: u64) -> TopicPartition {
        TopicPartition::new("my_topic".to_string(), PartitionId::new(partition))
    }

    #[test]
    fn test_claim_is_exclusive() {
        let claims = PartitionClaims::new();
        assert!(claims.try_claim(&tp(0)));
        assert!(!claims.try_claim(&tp(0)));
        assert!(claims.try_claim(&tp(1)));
    }

    #[test]
    fn test_release_frees_claim() {
        let claims = PartitionClaims::new();
        assert!(claims.try_claim(&tp(0)));
        claims.release(&tp(0));
        assert!(!claims.is_claimed(&tp(0)));
        assert!(claims.try_claim(&tp(0)));
    }

    #[test]
    fn test_clones_share_registry() {
        let claims = PartitionClaims::new();
        let other = claims.clone();
        assert!(claims.try_claim(&tp(3)));
        assert!(!other.try_claim(&tp(3)));
    }

    #[test]
    fn test_release_unclaimed_is_noop() {
        let claims = PartitionClaims::new();
        claims.release(&tp(9));
        assert!(!claims.is_claimed(&tp(9)));
    }
}
