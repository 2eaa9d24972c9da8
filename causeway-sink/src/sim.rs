//! Simulated collaborators for endpoint tests.
//!
//! [`SimulatedLogClient`] stands in for a broker consumer: tests seed it
//! with records and failure injections, then assert on the subscriptions,
//! seeks and commits it recorded. [`RecordingLink`] stands in for the AMQP
//! sender link and captures every send and the final detach. Both are
//! cheap clones over shared state, so a test keeps one clone and hands the
//! other to the endpoint.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use causeway_core::{Offset, Record, TopicPartition};
use causeway_tracker::CommitMap;

use crate::client::{LogClient, LogError, LogResult, PartitionInfo};
use crate::error::ErrorCondition;
use crate::link::{AmqpLink, AmqpMessage, DeliveryTag};

#[derive(Debug, Default)]
struct ClientState {
    partitions: Vec<PartitionInfo>,
    records: VecDeque<Record>,
    commits: Vec<CommitMap>,
    subscribed: Option<String>,
    assigned: Vec<TopicPartition>,
    seeks: Vec<(TopicPartition, Offset)>,
    pause_count: usize,
    resume_count: usize,
    closed: bool,
    fail_partitions_for: bool,
    fail_subscribe: bool,
    fail_assign: bool,
    fail_seek: bool,
    fail_fetch: bool,
    failing_commits: usize,
}

/// In-memory log client with scripted records and injectable failures.
#[derive(Debug, Clone, Default)]
pub struct SimulatedLogClient {
    state: Arc<Mutex<ClientState>>,
}

impl SimulatedLogClient {
    /// Creates an empty client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sets the partition metadata returned by `partitions_for`.
    pub fn set_partitions(&self, partitions: Vec<PartitionInfo>) {
        self.lock().partitions = partitions;
    }

    /// Appends records to the fetch queue.
    pub fn seed_records(&self, records: impl IntoIterator<Item = Record>) {
        self.lock().records.extend(records);
    }

    /// Makes `partitions_for` fail.
    pub fn fail_partitions_for(&self) {
        self.lock().fail_partitions_for = true;
    }

    /// Makes `subscribe` fail.
    pub fn fail_subscribe(&self) {
        self.lock().fail_subscribe = true;
    }

    /// Makes `assign` fail.
    pub fn fail_assign(&self) {
        self.lock().fail_assign = true;
    }

    /// Makes `seek` fail.
    pub fn fail_seek(&self) {
        self.lock().fail_seek = true;
    }

    /// Makes `fetch` fail.
    pub fn fail_fetch(&self) {
        self.lock().fail_fetch = true;
    }

    /// Makes the next `count` commits fail, then succeed again.
    pub fn fail_commits(&self, count: usize) {
        self.lock().failing_commits = count;
    }

    /// All commits recorded so far, in order.
    #[must_use]
    pub fn commits(&self) -> Vec<CommitMap> {
        self.lock().commits.clone()
    }

    /// The topic passed to `subscribe`, if any.
    #[must_use]
    pub fn subscribed(&self) -> Option<String> {
        self.lock().subscribed.clone()
    }

    /// All manual assignments recorded so far.
    #[must_use]
    pub fn assigned(&self) -> Vec<TopicPartition> {
        self.lock().assigned.clone()
    }

    /// All seeks recorded so far.
    #[must_use]
    pub fn seeks(&self) -> Vec<(TopicPartition, Offset)> {
        self.lock().seeks.clone()
    }

    /// Number of pause calls.
    #[must_use]
    pub fn pause_count(&self) -> usize {
        self.lock().pause_count
    }

    /// Number of resume calls.
    #[must_use]
    pub fn resume_count(&self) -> usize {
        self.lock().resume_count
    }

    /// Whether `close` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn io(operation: &'static str) -> LogError {
        LogError::Io {
            operation,
            message: "injected failure".to_string(),
        }
    }
}

#[async_trait]
impl LogClient for SimulatedLogClient {
    async fn partitions_for(&mut self, _topic: &str) -> LogResult<Vec<PartitionInfo>> {
        let state = self.lock();
        if state.fail_partitions_for {
            return Err(Self::io("partitions_for"));
        }
        Ok(state.partitions.clone())
    }

    async fn subscribe(&mut self, topic: &str) -> LogResult<()> {
        let mut state = self.lock();
        if state.fail_subscribe {
            return Err(Self::io("subscribe"));
        }
        state.subscribed = Some(topic.to_string());
        Ok(())
    }

    async fn assign(&mut self, tp: &TopicPartition) -> LogResult<()> {
        let mut state = self.lock();
        if state.fail_assign {
            return Err(Self::io("assign"));
        }
        state.assigned.push(tp.clone());
        Ok(())
    }

    async fn seek(&mut self, tp: &TopicPartition, offset: Offset) -> LogResult<()> {
        let mut state = self.lock();
        if state.fail_seek {
            return Err(Self::io("seek"));
        }
        state.seeks.push((tp.clone(), offset));
        Ok(())
    }

    async fn fetch(&mut self, max_records: usize) -> LogResult<Vec<Record>> {
        let mut state = self.lock();
        if state.fail_fetch {
            return Err(Self::io("fetch"));
        }
        let take = state.records.len().min(max_records);
        Ok(state.records.drain(..take).collect())
    }

    async fn commit(&mut self, offsets: &CommitMap) -> LogResult<()> {
        let mut state = self.lock();
        if state.failing_commits > 0 {
            state.failing_commits -= 1;
            return Err(Self::io("commit"));
        }
        state.commits.push(offsets.clone());
        Ok(())
    }

    fn pause(&mut self) {
        self.lock().pause_count += 1;
    }

    fn resume(&mut self) {
        self.lock().resume_count += 1;
    }

    async fn close(&mut self) {
        self.lock().closed = true;
    }
}

/// One send captured by a [`RecordingLink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentDelivery {
    /// The delivery tag.
    pub tag: DeliveryTag,
    /// The message sent.
    pub message: AmqpMessage,
    /// Whether the delivery was presettled.
    pub settled: bool,
}

#[derive(Debug)]
struct LinkState {
    credit: u32,
    sent: Vec<SentDelivery>,
    detached: Option<Option<ErrorCondition>>,
}

/// In-memory AMQP sender link capturing sends and the final detach.
#[derive(Debug, Clone)]
pub struct RecordingLink {
    state: Arc<Mutex<LinkState>>,
}

impl RecordingLink {
    /// Creates a link with the given initial credit.
    #[must_use]
    pub fn with_credit(credit: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(LinkState {
                credit,
                sent: Vec::new(),
                detached: None,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Grants additional credit, as a receiver flow frame would.
    pub fn grant_credit(&self, credit: u32) {
        self.lock().credit += credit;
    }

    /// Everything sent so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<SentDelivery> {
        self.lock().sent.clone()
    }

    /// Whether the link was detached.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.lock().detached.is_some()
    }

    /// The condition the link detached with, if it detached with an error.
    #[must_use]
    pub fn detach_condition(&self) -> Option<ErrorCondition> {
        self.lock().detached.clone().flatten()
    }
}

impl AmqpLink for RecordingLink {
    fn credit(&self) -> u32 {
        self.lock().credit
    }

    fn send(&mut self, tag: DeliveryTag, message: AmqpMessage) {
        let mut state = self.lock();
        state.credit = state.credit.saturating_sub(1);
        state.sent.push(SentDelivery {
            tag,
            message,
            settled: true,
        });
    }

    fn send_unsettled(&mut self, tag: DeliveryTag, message: AmqpMessage) {
        let mut state = self.lock();
        state.credit = state.credit.saturating_sub(1);
        state.sent.push(SentDelivery {
            tag,
            message,
            settled: false,
        });
    }

    fn detach(&mut self, condition: Option<ErrorCondition>) {
        self.lock().detached = Some(condition);
    }
}
