//! Attach address parsing.
//!
//! A sink address names the topic to stream and the consumer group to join,
//! separated by the literal `/group.id/`:
//!
//! ```text
//! my_topic/group.id/my_group
//! ```

use crate::error::AddressError;

/// Separator between the topic and the consumer group in an attach address.
const GROUP_ID_SEPARATOR: &str = "/group.id/";

/// A validated sink address: topic plus consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkAddress {
    topic: String,
    group: String,
}

impl SinkAddress {
    /// Parses and validates an attach address.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] when the `/group.id/` separator is missing,
    /// or either side of it is empty.
    pub fn parse(address: &str) -> Result<Self, AddressError> {
        let (topic, group) = address
            .split_once(GROUP_ID_SEPARATOR)
            .ok_or(AddressError::MissingGroupDelimiter)?;
        if topic.is_empty() {
            return Err(AddressError::EmptyTopic);
        }
        if group.is_empty() {
            return Err(AddressError::EmptyGroup);
        }
        Ok(Self {
            topic: topic.to_string(),
            group: group.to_string(),
        })
    }

    /// The topic to stream from.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The consumer group to join.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }
}

impl std::fmt::Display for SinkAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{GROUP_ID_SEPARATOR}{}", self.topic, self.group)
    }
}
