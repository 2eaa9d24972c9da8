//! AMQP sink endpoint for the Causeway bridge.
//!
//! A sink endpoint binds one AMQP attach to one broker subscription: it
//! validates the source address and filters, resolves a message converter,
//! subscribes to the log, and streams converted records to the AMQP peer.
//! Under at-least-once quality of service, acceptance dispositions feed the
//! offset trackers from `causeway-tracker`, whose commit results drive
//! consolidated broker commits.
//!
//! # Architecture
//!
//! ```text
//!  AMQP attach ──► SinkEndpoint ──► LogClient (subscribe/fetch/commit)
//!                      │
//!    dispositions ──►  │  (per-endpoint event queue)
//!    credit, close ──► │
//!                      ▼
//!                 OffsetTracker ──► consolidated commit
//! ```
//!
//! All validation, tracker mutation and protocol transitions for one
//! endpoint run on a single logical task; collaborators feed it through an
//! [`EndpointHandle`] rather than calling into it concurrently.
//!
//! # Quality of Service
//!
//! - **At-most-once**: each record is converted, sent presettled, and its
//!   offset committed immediately, independent of settlement.
//! - **At-least-once**: batches are announced to the tracker before any send;
//!   commits advance only along the contiguous prefix of accepted offsets.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod address;
mod claims;
mod client;
mod config;
mod converter;
mod endpoint;
mod error;
mod filter;
mod link;
pub mod sim;

pub use address::SinkAddress;
pub use claims::PartitionClaims;
pub use client::{LogClient, LogError, LogResult, PartitionInfo};
pub use config::SinkConfig;
pub use converter::{
    ConverterRegistry, DefaultConverter, MessageConverter, UnprocessablePolicy,
};
pub use endpoint::{AttachRequest, EndpointEvent, EndpointHandle, EndpointState, SinkEndpoint};
pub use error::{
    AddressError, ConfigurationError, ErrorCondition, FilterError, SinkError, SubscriptionError,
    AMQP_ERROR_CONFIGURATION, AMQP_ERROR_CONVERSION, AMQP_ERROR_KAFKA_FETCH,
    AMQP_ERROR_KAFKA_SUBSCRIBE, AMQP_ERROR_NO_FREE_PARTITIONS, AMQP_ERROR_NO_GROUPID,
    AMQP_ERROR_NO_PARTITION_FILTER, AMQP_ERROR_WRONG_FILTER, AMQP_ERROR_WRONG_OFFSET_FILTER,
    AMQP_ERROR_WRONG_PARTITION_FILTER,
};
pub use filter::{FilterMap, SinkFilters, AMQP_OFFSET_FILTER, AMQP_PARTITION_FILTER};
pub use link::{
    AmqpLink, AmqpMessage, AmqpValue, DeliveryTag, Disposition, Qos, AMQP_OFFSET_ANNOTATION,
    AMQP_PARTITION_ANNOTATION, AMQP_TOPIC_ANNOTATION,
};
