//! Causeway Core - Strongly-typed identifiers and record types.
//!
//! This crate provides the vocabulary shared by the offset trackers and the
//! sink endpoint: partition identifiers, log offsets, and the log record
//! shape as delivered by the broker consumer.
//!
//! # Design Principles (TigerStyle)
//!
//! - **Strongly-typed IDs**: Prevent mixing up a partition with an offset
//! - **Explicit types**: Use u32/u64, not usize
//! - **No unsafe code**: Safety > Performance

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod record;
mod types;

pub use record::Record;
pub use types::{Offset, PartitionId, TopicPartition};
