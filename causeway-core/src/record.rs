//! Log record type as delivered by the broker consumer.
//!
//! A record is the unit the sink endpoint converts and forwards: the tuple
//! `(topic, partition, offset, key, value)` read from one partition of the
//! log. Offsets are assigned by the broker and are gap-free per partition.

use bytes::Bytes;

use crate::types::{Offset, PartitionId, TopicPartition};

/// A single record read from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Topic the record was read from.
    pub topic: String,
    /// Partition within the topic.
    pub partition: PartitionId,
    /// Offset within the partition (broker-assigned).
    pub offset: Offset,
    /// Optional record key.
    pub key: Option<Bytes>,
    /// Record payload.
    pub value: Bytes,
}

impl Record {
    /// Creates a new record.
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        partition: PartitionId,
        offset: Offset,
        key: Option<Bytes>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key,
            value: value.into(),
        }
    }

    /// Returns the topic-partition this record belongs to.
    #[must_use]
    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }
}
