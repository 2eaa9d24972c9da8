//! Sink endpoint error types and the AMQP condition vocabulary.
//!
//! Endpoint-level errors detach the AMQP link with a structured condition
//! (short code plus human-readable description); they are non-fatal to the
//! bridge as a whole. Tracker-internal contract violations are not errors
//! but programming mistakes, and fail fast with assertions instead.

use causeway_core::{Offset, PartitionId};
use thiserror::Error;

/// Condition for malformed addresses (missing group, empty topic or group).
pub const AMQP_ERROR_NO_GROUPID: &str = "no-group-id";
/// Condition for a partition filter that does not decode as an integer.
pub const AMQP_ERROR_WRONG_PARTITION_FILTER: &str = "wrong-partition-filter";
/// Condition for an offset filter that does not decode as a long.
pub const AMQP_ERROR_WRONG_OFFSET_FILTER: &str = "wrong-offset-filter";
/// Condition for negative filter values.
pub const AMQP_ERROR_WRONG_FILTER: &str = "wrong-filter";
/// Condition for an offset filter supplied without a partition filter.
pub const AMQP_ERROR_NO_PARTITION_FILTER: &str = "no-partition-filter";
/// Condition for an exclusive partition claim that is already taken.
pub const AMQP_ERROR_NO_FREE_PARTITIONS: &str = "no-free-partitions";
/// Condition for converter resolution failures.
pub const AMQP_ERROR_CONFIGURATION: &str = "configuration";
/// Condition for partition discovery, subscribe and assignment failures.
pub const AMQP_ERROR_KAFKA_SUBSCRIBE: &str = "kafka-subscribe";
/// Condition for unrecoverable record fetch failures while streaming.
pub const AMQP_ERROR_KAFKA_FETCH: &str = "kafka-fetch";
/// Condition for an unprocessable record under the halt policy.
pub const AMQP_ERROR_CONVERSION: &str = "conversion";

/// Structured condition carried on a detach: short code plus description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCondition {
    /// Short machine-readable code.
    pub condition: &'static str,
    /// Human-readable description.
    pub description: String,
}

impl ErrorCondition {
    /// Creates a new condition.
    #[must_use]
    pub fn new(condition: &'static str, description: impl Into<String>) -> Self {
        Self {
            condition,
            description: description.into(),
        }
    }
}

/// Address validation failures (no-group-id class).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The literal `/group.id/` separator is missing.
    #[error("Mandatory group.id not specified in the address")]
    MissingGroupDelimiter,
    /// The topic part before the separator is empty.
    #[error("Empty topic in specified address")]
    EmptyTopic,
    /// The consumer group part after the separator is empty.
    #[error("Empty consumer group in specified address")]
    EmptyGroup,
}

/// Attach filter validation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Partition filter value does not decode as an integer.
    #[error("Wrong partition filter")]
    WrongPartitionFilter,
    /// Offset filter value does not decode as a long integer.
    #[error("Wrong offset filter")]
    WrongOffsetFilter,
    /// A filter value is negative.
    #[error("Wrong filter")]
    WrongFilter,
    /// Offset filter present without a partition filter.
    #[error("No partition filter specified")]
    NoPartitionFilter,
}

/// Converter resolution failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No factory under the configured name, or the factory failed.
    #[error("configured message converter could not be instantiated: {name}")]
    NotInstantiable {
        /// The configured converter name.
        name: String,
    },
    /// The factory produced something that is not a message converter.
    #[error("configured message converter is not an instance of the expected converter: {name}")]
    NotExpectedType {
        /// The configured converter name.
        name: String,
    },
}

/// Broker subscription and assignment failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Partition metadata lookup failed (broker unreachable, for example).
    #[error("Error getting partition info for topic {topic}")]
    PartitionInfo {
        /// The topic whose metadata could not be fetched.
        topic: String,
    },
    /// Consumer group subscription failed.
    #[error("Error subscribing to topic {topic}")]
    Subscribe {
        /// The topic that could not be subscribed.
        topic: String,
    },
    /// Explicit partition assignment or seek failed.
    #[error("Error assigning partition {partition} of topic {topic}")]
    Assign {
        /// The topic being assigned.
        topic: String,
        /// The partition being assigned.
        partition: PartitionId,
    },
}

/// Errors that detach a sink endpoint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The attach address failed validation.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// The attach filter map failed validation.
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// The configured converter could not be resolved.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Subscribing to the broker failed.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// The requested partition already has a receiver.
    #[error("All partitions already have a receiver")]
    NoFreePartitions,

    /// A record could not be converted and the policy is halt.
    #[error("Record at partition {partition} offset {offset} could not be converted")]
    Conversion {
        /// Partition of the unprocessable record.
        partition: PartitionId,
        /// Offset of the unprocessable record.
        offset: Offset,
    },

    /// Fetching records from the broker failed while streaming.
    #[error("Error fetching records for topic {topic}")]
    Fetch {
        /// The topic being fetched.
        topic: String,
    },
}

impl SinkError {
    /// Maps the error to the AMQP condition it detaches with.
    #[must_use]
    pub fn condition(&self) -> ErrorCondition {
        let condition = match self {
            Self::Address(_) => AMQP_ERROR_NO_GROUPID,
            Self::Filter(e) => match e {
                FilterError::WrongPartitionFilter => AMQP_ERROR_WRONG_PARTITION_FILTER,
                FilterError::WrongOffsetFilter => AMQP_ERROR_WRONG_OFFSET_FILTER,
                FilterError::WrongFilter => AMQP_ERROR_WRONG_FILTER,
                FilterError::NoPartitionFilter => AMQP_ERROR_NO_PARTITION_FILTER,
            },
            Self::Configuration(_) => AMQP_ERROR_CONFIGURATION,
            Self::Subscription(_) => AMQP_ERROR_KAFKA_SUBSCRIBE,
            Self::NoFreePartitions => AMQP_ERROR_NO_FREE_PARTITIONS,
            Self::Conversion { .. } => AMQP_ERROR_CONVERSION,
            Self::Fetch { .. } => AMQP_ERROR_KAFKA_FETCH,
        };
        ErrorCondition::new(condition, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_error_messages() {
        assert_eq!(
            AddressError::MissingGroupDelimiter.to_string(),
            "Mandatory group.id not specified in the address"
        );
        assert_eq!(
            AddressError::EmptyTopic.to_string(),
            "Empty topic in specified address"
        );
        assert_eq!(
            AddressError::EmptyGroup.to_string(),
            "Empty consumer group in specified address"
        );
    }

    #[test]
    fn test_filter_error_conditions() {
        let cases = [
            (FilterError::WrongPartitionFilter, AMQP_ERROR_WRONG_PARTITION_FILTER, "Wrong partition filter"),
            (FilterError::WrongOffsetFilter, AMQP_ERROR_WRONG_OFFSET_FILTER, "Wrong offset filter"),
            (FilterError::WrongFilter, AMQP_ERROR_WRONG_FILTER, "Wrong filter"),
            (FilterError::NoPartitionFilter, AMQP_ERROR_NO_PARTITION_FILTER, "No partition filter specified"),
        ];
        for (error, condition, description) in cases {
            let got = SinkError::from(error).condition();
            assert_eq!(got.condition, condition);
            assert_eq!(got.description, description);
        }
    }

    #[test]
    fn test_subscription_error_condition() {
        let error = SinkError::from(SubscriptionError::PartitionInfo {
            topic: "my_topic".to_string(),
        });
        let condition = error.condition();
        assert_eq!(condition.condition, AMQP_ERROR_KAFKA_SUBSCRIBE);
        assert_eq!(
            condition.description,
            "Error getting partition info for topic my_topic"
        );
    }

    #[test]
    fn test_no_free_partitions_condition() {
        let condition = SinkError::NoFreePartitions.condition();
        assert_eq!(condition.condition, AMQP_ERROR_NO_FREE_PARTITIONS);
        assert_eq!(condition.description, "All partitions already have a receiver");
    }

    #[test]
    fn test_configuration_error_messages() {
        let error = ConfigurationError::NotInstantiable {
            name: "foo.bar.Baz".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "configured message converter could not be instantiated: foo.bar.Baz"
        );

        let error = ConfigurationError::NotExpectedType {
            name: "identity".to_string(),
        };
        assert!(error.to_string().contains("not an instance of the expected converter"));
    }
}
