//! Record-to-message conversion and converter resolution.
//!
//! The bridge converts each fetched record into an outbound AMQP message
//! through a [`MessageConverter`]. Which converter runs is configured by
//! name and resolved at attach time from a [`ConverterRegistry`]; resolution
//! failures detach the link with a `configuration` condition.

use std::any::Any;
use std::collections::HashMap;

use causeway_core::Record;

use crate::error::ConfigurationError;
use crate::link::{
    AmqpMessage, AmqpValue, AMQP_OFFSET_ANNOTATION, AMQP_PARTITION_ANNOTATION,
    AMQP_TOPIC_ANNOTATION,
};

/// What to do with a record no converter can handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnprocessablePolicy {
    /// Detach the link with a `conversion` condition.
    #[default]
    Halt,
    /// Log the record and carry on without delivering it.
    Drop,
}

/// Converts fetched records into outbound AMQP messages.
pub trait MessageConverter: Send {
    /// Converts one record. Returns `None` when the record cannot be
    /// represented; the configured [`UnprocessablePolicy`] decides what
    /// happens then.
    fn to_message(&self, record: &Record) -> Option<AmqpMessage>;
}

/// The stock converter: the record value becomes the message body, and the
/// source coordinates are carried as message annotations.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConverter;

impl MessageConverter for DefaultConverter {
    #[allow(clippy::cast_possible_wrap)]
    fn to_message(&self, record: &Record) -> Option<AmqpMessage> {
        let mut message = AmqpMessage::new(record.value.clone());
        message.annotate(
            AMQP_TOPIC_ANNOTATION,
            AmqpValue::Str(record.topic.clone()),
        );
        message.annotate(
            AMQP_PARTITION_ANNOTATION,
            AmqpValue::Int(record.partition.get() as i32),
        );
        message.annotate(
            AMQP_OFFSET_ANNOTATION,
            AmqpValue::Long(record.offset.get() as i64),
        );
        Some(message)
    }
}

type ConverterFactory = Box<dyn Fn() -> Option<Box<dyn Any + Send>> + Send + Sync>;

/// Named converter factories, resolved at attach time.
///
/// Factories produce type-erased values so misregistrations surface as
/// resolution errors rather than silently wrong conversions: a factory
/// whose product is not a boxed [`MessageConverter`] fails resolution
/// with a distinct error.
#[derive(Default)]
pub struct ConverterRegistry {
    factories: HashMap<String, ConverterFactory>,
}

impl ConverterRegistry {
    /// Creates a registry with the stock converter registered under
    /// `"default"`.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register::<DefaultConverter>("default");
        registry
    }

    /// Registers a converter type under a name, replacing any previous
    /// registration.
    pub fn register<C: MessageConverter + Default + 'static>(&mut self, name: &str) {
        self.factories.insert(
            name.to_string(),
            Box::new(|| {
                let converter: Box<dyn MessageConverter> = Box::new(C::default());
                Some(Box::new(converter))
            }),
        );
    }

    /// Registers a raw factory producing an arbitrary value. Resolution
    /// fails with `NotExpectedType` unless the value is a boxed
    /// [`MessageConverter`].
    pub fn register_raw(&mut self, name: &str, factory: ConverterFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    /// Resolves the converter configured under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::NotInstantiable`] when no factory is
    /// registered under the name or the factory fails, and
    /// [`ConfigurationError::NotExpectedType`] when the factory's product
    /// is not a message converter.
    pub fn resolve(&self, name: &str) -> Result<Box<dyn MessageConverter>, ConfigurationError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ConfigurationError::NotInstantiable {
                name: name.to_string(),
            })?;
        let instance = factory().ok_or_else(|| ConfigurationError::NotInstantiable {
            name: name.to_string(),
        })?;
        instance
            .downcast::<Box<dyn MessageConverter>>()
            .map(|boxed| *boxed)
            .map_err(|_| ConfigurationError::NotExpectedType {
                name: name.to_string(),
            })
    }
}

impl std::fmt::Debug for dyn MessageConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn MessageConverter")
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("names", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
