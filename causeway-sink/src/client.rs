//! The consumer-side abstraction the endpoint fetches records through.
//!
//! [`LogClient`] is the seam between the endpoint state machine and a real
//! broker client. Production wires a Kafka consumer behind it; tests use
//! [`crate::sim::SimulatedLogClient`].

use async_trait::async_trait;
use causeway_core::{Offset, PartitionId, Record, TopicPartition};
use causeway_tracker::CommitMap;
use thiserror::Error;

/// Errors surfaced by a log client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogError {
    /// An I/O or broker-protocol failure during the named operation.
    #[error("log client {operation} failed: {message}")]
    Io {
        /// The client operation that failed.
        operation: &'static str,
        /// Broker-provided failure detail.
        message: String,
    },
}

/// Result alias for log client operations.
pub type LogResult<T> = Result<T, LogError>;

/// Metadata for one partition of a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    /// The topic the partition belongs to.
    pub topic: String,
    /// The partition id.
    pub partition: PartitionId,
}

/// A consuming client over a partitioned log.
#[async_trait]
pub trait LogClient: Send {
    /// Lists the partitions of a topic.
    async fn partitions_for(&mut self, topic: &str) -> LogResult<Vec<PartitionInfo>>;

    /// Joins the consumer group for a topic, taking broker-assigned
    /// partitions.
    async fn subscribe(&mut self, topic: &str) -> LogResult<()>;

    /// Takes a manual assignment of a single partition, bypassing group
    /// rebalancing.
    async fn assign(&mut self, tp: &TopicPartition) -> LogResult<()>;

    /// Positions an assigned partition at the given offset.
    async fn seek(&mut self, tp: &TopicPartition, offset: Offset) -> LogResult<()>;

    /// Fetches up to `max_records` records from the assigned or subscribed
    /// partitions. Returns an empty batch when nothing is available.
    async fn fetch(&mut self, max_records: usize) -> LogResult<Vec<Record>>;

    /// Commits the given offsets to the consumer group.
    async fn commit(&mut self, offsets: &CommitMap) -> LogResult<()>;

    /// Pauses delivery without losing the assignment.
    fn pause(&mut self);

    /// Resumes delivery after a pause.
    fn resume(&mut self);

    /// Leaves the group and releases the connection.
    async fn close(&mut self);
}
