//! The AMQP sender side of the bridge: messages, dispositions and the
//! link abstraction the endpoint sends on.
//!
//! The endpoint never talks to a concrete AMQP stack. It drives an
//! [`AmqpLink`], which a transport layer implements over its connection
//! handling; tests implement it with an in-memory recorder.

use bytes::Bytes;
use causeway_core::{Offset, PartitionId};

use crate::error::ErrorCondition;

/// Message annotation carrying the source topic.
pub const AMQP_TOPIC_ANNOTATION: &str = "x-opt-bridge.topic";
/// Message annotation carrying the source partition.
pub const AMQP_PARTITION_ANNOTATION: &str = "x-opt-bridge.partition";
/// Message annotation carrying the source offset.
pub const AMQP_OFFSET_ANNOTATION: &str = "x-opt-bridge.offset";

/// A typed AMQP primitive value, as carried in filter maps and annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmqpValue {
    /// An AMQP string.
    Str(String),
    /// An AMQP 32-bit signed integer.
    Int(i32),
    /// An AMQP 64-bit signed integer.
    Long(i64),
}

/// An outbound AMQP message: annotations plus an opaque body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmqpMessage {
    annotations: Vec<(String, AmqpValue)>,
    body: Bytes,
}

impl AmqpMessage {
    /// Creates a message with the given body and no annotations.
    #[must_use]
    pub fn new(body: Bytes) -> Self {
        Self {
            annotations: Vec::new(),
            body,
        }
    }

    /// Adds a message annotation. Later values for the same key win on read.
    pub fn annotate(&mut self, key: &str, value: AmqpValue) {
        self.annotations.push((key.to_string(), value));
    }

    /// Looks up an annotation by key.
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&AmqpValue> {
        self.annotations
            .iter()
            .rev()
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    /// The message body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Delivery tag identifying an unsettled send, formatted `<partition>_<offset>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryTag(Bytes);

impl DeliveryTag {
    /// Builds the tag for a record at the given coordinates.
    #[must_use]
    pub fn for_record(partition: PartitionId, offset: Offset) -> Self {
        Self(Bytes::from(format!("{partition}_{offset}")))
    }

    /// The raw tag bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }
}

/// Receiver's verdict on an unsettled delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The receiver accepted the delivery.
    Accepted,
    /// The receiver rejected the delivery as invalid.
    Rejected,
    /// The receiver released the delivery without processing it.
    Released,
}

/// Delivery guarantee of an attached link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    /// Presettled deliveries, offsets committed as soon as records are read.
    AtMostOnce,
    /// Unsettled deliveries, offsets committed only after acceptance.
    AtLeastOnce,
}

/// The sender link a sink endpoint streams on.
pub trait AmqpLink: Send {
    /// Link credit currently granted by the receiver.
    fn credit(&self) -> u32;

    /// Sends a presettled message (at-most-once).
    fn send(&mut self, tag: DeliveryTag, message: AmqpMessage);

    /// Sends an unsettled message whose disposition will arrive later.
    fn send_unsettled(&mut self, tag: DeliveryTag, message: AmqpMessage);

    /// Detaches the link, with an error condition when closing abnormally.
    fn detach(&mut self, condition: Option<ErrorCondition>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_tag_format() {
        let tag = DeliveryTag::for_record(PartitionId::new(3), Offset::new(41));
        assert_eq!(tag.as_bytes().as_ref(), b"3_41");
    }

    #[test]
    fn test_annotation_lookup() {
        let mut message = AmqpMessage::new(Bytes::from_static(b"hello"));
        message.annotate(AMQP_TOPIC_ANNOTATION, AmqpValue::Str("t".to_string()));
        message.annotate(AMQP_PARTITION_ANNOTATION, AmqpValue::Int(0));
        message.annotate(AMQP_OFFSET_ANNOTATION, AmqpValue::Long(7));

        assert_eq!(
            message.annotation(AMQP_OFFSET_ANNOTATION),
            Some(&AmqpValue::Long(7))
        );
        assert_eq!(message.annotation("x-opt-missing"), None);
    }

    #[test]
    fn test_latest_annotation_wins() {
        let mut message = AmqpMessage::new(Bytes::new());
        message.annotate("k", AmqpValue::Int(1));
        message.annotate("k", AmqpValue::Int(2));
        assert_eq!(message.annotation("k"), Some(&AmqpValue::Int(2)));
    }
}
