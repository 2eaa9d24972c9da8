//! Attach filter validation.
//!
//! A receiver may narrow the link to a single partition, optionally with a
//! starting offset, by sending filter map entries on attach. Validation is
//! ordered: type checks first (partition then offset), then sign checks,
//! then the offset-requires-partition rule.

use std::collections::HashMap;

use causeway_core::{Offset, PartitionId};

use crate::error::FilterError;
use crate::link::AmqpValue;

/// Filter symbol selecting a single partition.
pub const AMQP_PARTITION_FILTER: &str = "x-opt-bridge.partition.filter";
/// Filter symbol selecting the starting offset within the partition.
pub const AMQP_OFFSET_FILTER: &str = "x-opt-bridge.offset.filter";

/// Raw filter map from the attach frame.
pub type FilterMap = HashMap<String, AmqpValue>;

/// Validated sink filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkFilters {
    /// Requested partition, if any.
    pub partition: Option<PartitionId>,
    /// Requested starting offset, if any.
    pub offset: Option<Offset>,
}

impl SinkFilters {
    /// Validates the raw attach filter map.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] when a filter value has the wrong type, is
    /// negative, or an offset is requested without a partition.
    pub fn validate(filters: &FilterMap) -> Result<Self, FilterError> {
        let partition = match filters.get(AMQP_PARTITION_FILTER) {
            None => None,
            Some(AmqpValue::Int(p)) => Some(*p),
            Some(_) => return Err(FilterError::WrongPartitionFilter),
        };
        let offset = match filters.get(AMQP_OFFSET_FILTER) {
            None => None,
            Some(AmqpValue::Long(o)) => Some(*o),
            Some(_) => return Err(FilterError::WrongOffsetFilter),
        };

        if partition.is_some_and(|p| p < 0) || offset.is_some_and(|o| o < 0) {
            return Err(FilterError::WrongFilter);
        }
        if offset.is_some() && partition.is_none() {
            return Err(FilterError::NoPartitionFilter);
        }

        #[allow(clippy::cast_sign_loss)] // negative values rejected above
        Ok(Self {
            partition: partition.map(|p| PartitionId::new(p as u64)),
            offset: offset.map(|o| Offset::new(o as u64)),
        })
    }
}
