//! Sink endpoint configuration.

use causeway_tracker::TrackerStrategy;

use crate::converter::UnprocessablePolicy;

/// Configuration for a sink endpoint.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Name of the converter resolved from the registry at attach time.
    pub message_converter: String,
    /// Offset tracking strategy for at-least-once links.
    pub tracker: TrackerStrategy,
    /// What to do with records no converter can handle.
    pub unprocessable_policy: UnprocessablePolicy,
    /// Maximum records fetched per poll.
    pub max_poll_records: usize,
    /// Fetching pauses once this many deliveries are awaiting disposition.
    pub max_unsettled_deliveries: usize,
    /// Fetching resumes once unsettled deliveries fall back to this level.
    pub resume_threshold: usize,
    /// Back-off between polls when no records are available, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            message_converter: "default".to_string(),
            tracker: TrackerStrategy::default(),
            unprocessable_policy: UnprocessablePolicy::default(),
            max_poll_records: 500,
            max_unsettled_deliveries: 1000,
            resume_threshold: 500,
            poll_interval_ms: 100,
        }
    }
}

impl SinkConfig {
    /// Configuration with small limits and no poll back-off, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            max_poll_records: 10,
            max_unsettled_deliveries: 8,
            resume_threshold: 4,
            poll_interval_ms: 1,
            ..Self::default()
        }
    }

    /// Sets the converter name.
    #[must_use]
    pub fn with_message_converter(mut self, name: impl Into<String>) -> Self {
        self.message_converter = name.into();
        self
    }

    /// Sets the offset tracking strategy.
    #[must_use]
    pub const fn with_tracker(mut self, tracker: TrackerStrategy) -> Self {
        self.tracker = tracker;
        self
    }

    /// Sets the unprocessable record policy.
    #[must_use]
    pub const fn with_unprocessable_policy(mut self, policy: UnprocessablePolicy) -> Self {
        self.unprocessable_policy = policy;
        self
    }

    /// Sets the per-poll record cap.
    #[must_use]
    pub const fn with_max_poll_records(mut self, max: usize) -> Self {
        self.max_poll_records = max;
        self
    }

    /// Sets the unsettled-delivery pause and resume thresholds.
    ///
    /// # Panics
    ///
    /// Panics when `resume` exceeds `max`, which would pause forever.
    #[must_use]
    pub fn with_unsettled_window(mut self, max: usize, resume: usize) -> Self {
        assert!(
            resume <= max,
            "resume threshold ({resume}) must not exceed max unsettled ({max})"
        );
        self.max_unsettled_deliveries = max;
        self.resume_threshold = resume;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SinkConfig::default();
        assert_eq!(config.message_converter, "default");
        assert_eq!(config.tracker, TrackerStrategy::Window);
        assert_eq!(config.unprocessable_policy, UnprocessablePolicy::Halt);
        assert!(config.resume_threshold <= config.max_unsettled_deliveries);
    }

    #[test]
    fn test_builders() {
        let config = SinkConfig::for_testing()
            .with_message_converter("json")
            .with_tracker(TrackerStrategy::Simple)
            .with_unprocessable_policy(UnprocessablePolicy::Drop)
            .with_max_poll_records(3)
            .with_unsettled_window(6, 2);
        assert_eq!(config.message_converter, "json");
        assert_eq!(config.tracker, TrackerStrategy::Simple);
        assert_eq!(config.unprocessable_policy, UnprocessablePolicy::Drop);
        assert_eq!(config.max_poll_records, 3);
        assert_eq!(config.max_unsettled_deliveries, 6);
        assert_eq!(config.resume_threshold, 2);
    }

    #[test]
    #[should_panic(expected = "must not exceed")]
    fn test_inverted_window_panics() {
        let _ = SinkConfig::default().with_unsettled_window(2, 6);
    }
}
