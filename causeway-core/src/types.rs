//! Strongly-typed identifiers for Causeway entities.
//!
//! Following `TigerStyle`: explicit types prevent bugs from mixing up a
//! partition number with a log offset. Both are 64-bit to match the broker's
//! address space.

use std::fmt;

/// Macro to generate strongly-typed u64 wrappers.
///
/// Each wrapper provides:
/// - Type safety (can't mix `PartitionId` with `Offset`)
/// - Debug/Display formatting
/// - Zero-cost abstraction (same as raw u64)
macro_rules! define_id {
    ($name:ident, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new value from a raw u64.
            #[inline]
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw u64 value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }

            /// Returns the next value in sequence.
            ///
            /// # Panics
            /// Panics on overflow.
            #[inline]
            #[must_use]
            pub const fn next(self) -> Self {
                assert!(self.0 < u64::MAX, "overflow");
                Self(self.0 + 1)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.get()
            }
        }
    };
}

define_id!(PartitionId, "partition", "Identifier of a partition within a topic.");
define_id!(Offset, "offset", "Position of a record within one partition of the log.");

impl Offset {
    /// Returns the previous offset, saturating at zero.
    #[must_use]
    pub const fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

/// A topic name paired with a partition, identifying one partition of the log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPartition {
    /// Topic name.
    pub topic: String,
    /// Partition within the topic.
    pub partition: PartitionId,
}

impl TopicPartition {
    /// Creates a new topic-partition key.
    #[must_use]
    pub fn new(topic: impl Into<String>, partition: PartitionId) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_type_safety() {
        let partition = PartitionId::new(1);
        let offset = Offset::new(1);

        // Same raw value, different types; comparing them won't compile.
        assert_eq!(partition.get(), offset.get());
    }

    #[test]
    fn test_offset_arithmetic() {
        let offset = Offset::new(42);
        assert_eq!(offset.next().get(), 43);
        assert_eq!(offset.prev().get(), 41);
        assert_eq!(Offset::new(0).prev().get(), 0);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(format!("{}", PartitionId::new(3)), "3");
        assert_eq!(format!("{:?}", PartitionId::new(3)), "partition(3)");
        assert_eq!(format!("{}", Offset::new(7)), "7");
    }

    #[test]
    #[should_panic(expected = "overflow")]
    fn test_offset_overflow_panics() {
        let _ = Offset::new(u64::MAX).next();
    }

    #[test]
    fn test_topic_partition() {
        let a = TopicPartition::new("my_topic", PartitionId::new(0));
        let b = TopicPartition::new("my_topic", PartitionId::new(0));
        let c = TopicPartition::new("my_topic", PartitionId::new(1));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(format!("{a}"), "my_topic-0");
    }
}
