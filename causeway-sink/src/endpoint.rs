//! The sink endpoint state machine.
//!
//! One endpoint serves one AMQP attach: validate the address and filters,
//! resolve the converter, subscribe (or take an exclusive partition
//! assignment), then stream converted records until the link closes or an
//! error detaches it. Everything runs on a single task; dispositions,
//! credit notifications and close requests arrive through an
//! [`EndpointHandle`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use causeway_core::{Offset, PartitionId, Record, TopicPartition};
use causeway_tracker::{CommitMap, OffsetTracker};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::address::SinkAddress;
use crate::claims::PartitionClaims;
use crate::client::LogClient;
use crate::config::SinkConfig;
use crate::converter::{ConverterRegistry, MessageConverter, UnprocessablePolicy};
use crate::error::{SinkError, SubscriptionError};
use crate::filter::{FilterMap, SinkFilters};
use crate::link::{AmqpLink, AmqpMessage, DeliveryTag, Disposition, Qos};

/// The AMQP attach a sink endpoint serves.
#[derive(Debug, Clone)]
pub struct AttachRequest {
    /// Source address, `<topic>/group.id/<group>`.
    pub address: String,
    /// Delivery guarantee requested by the receiver.
    pub qos: Qos,
    /// Raw attach filter map.
    pub filters: FilterMap,
}

/// Events fed to a running endpoint by its collaborators.
#[derive(Debug)]
pub enum EndpointEvent {
    /// The receiver settled a delivery.
    Disposition {
        /// Tag of the settled delivery.
        tag: DeliveryTag,
        /// The receiver's verdict.
        outcome: Disposition,
    },
    /// The receiver granted more link credit.
    CreditReplenished,
    /// The group coordinator revoked partitions on rebalance.
    PartitionsRevoked(Vec<PartitionId>),
    /// The link is closing normally.
    Close,
}

/// Lifecycle phase of a sink endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Created, not yet attached.
    Created,
    /// Validating the source address.
    ValidatingAddress,
    /// Validating the attach filter map.
    ValidatingFilters,
    /// Resolving the configured message converter.
    ResolvingConverter,
    /// Subscribing or taking a partition assignment.
    Subscribing,
    /// Streaming records to the receiver.
    Streaming,
    /// Flushing pending commits before a normal close.
    Closing,
    /// Closed normally.
    Closed,
    /// Detached with an error condition.
    Detached,
}

/// Handle for feeding events to a running endpoint. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EndpointHandle {
    events: mpsc::UnboundedSender<EndpointEvent>,
    state: Arc<Mutex<EndpointState>>,
}

impl EndpointHandle {
    /// Reports a delivery disposition.
    pub fn disposition(&self, tag: DeliveryTag, outcome: Disposition) {
        let _ = self.events.send(EndpointEvent::Disposition { tag, outcome });
    }

    /// Wakes the endpoint after the receiver granted more credit.
    pub fn credit_replenished(&self) {
        let _ = self.events.send(EndpointEvent::CreditReplenished);
    }

    /// Reports partitions revoked by a group rebalance.
    pub fn partitions_revoked(&self, partitions: Vec<PartitionId>) {
        let _ = self.events.send(EndpointEvent::PartitionsRevoked(partitions));
    }

    /// Requests a normal close.
    pub fn close(&self) {
        let _ = self.events.send(EndpointEvent::Close);
    }

    /// Current lifecycle phase of the endpoint.
    #[must_use]
    pub fn state(&self) -> EndpointState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A sink endpoint bridging one broker subscription to one AMQP link.
pub struct SinkEndpoint<C: LogClient, L: AmqpLink> {
    config: SinkConfig,
    client: C,
    link: L,
    registry: Arc<ConverterRegistry>,
    claims: PartitionClaims,

    events: mpsc::UnboundedReceiver<EndpointEvent>,
    state: Arc<Mutex<EndpointState>>,

    qos: Qos,
    topic: String,
    converter: Option<Box<dyn MessageConverter>>,
    tracker: Box<dyn OffsetTracker>,
    unsettled: HashMap<DeliveryTag, (PartitionId, Offset)>,
    pending_commit: CommitMap,
    claimed: Option<TopicPartition>,
    throttled: bool,
    paused: bool,
    closing: bool,
}

impl<C: LogClient, L: AmqpLink> SinkEndpoint<C, L> {
    /// Creates an endpoint and the handle its collaborators feed it through.
    #[must_use]
    pub fn new(
        config: SinkConfig,
        client: C,
        link: L,
        registry: Arc<ConverterRegistry>,
        claims: PartitionClaims,
    ) -> (Self, EndpointHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(EndpointState::Created));
        let tracker = config.tracker.build();
        let endpoint = Self {
            config,
            client,
            link,
            registry,
            claims,
            events: rx,
            state: Arc::clone(&state),
            qos: Qos::AtLeastOnce,
            topic: String::new(),
            converter: None,
            tracker,
            unsettled: HashMap::new(),
            pending_commit: CommitMap::new(),
            claimed: None,
            throttled: false,
            paused: false,
            closing: false,
        };
        (endpoint, EndpointHandle { events: tx, state })
    }

    /// Serves the attach to completion: normal close or error detach.
    pub async fn run(mut self, request: AttachRequest) {
        let result = match self.attach(&request).await {
            Ok(()) => self.stream().await,
            Err(error) => Err(error),
        };
        match result {
            Ok(()) => self.shutdown().await,
            Err(error) => self.abort(error).await,
        }
    }

    // ---- Attach ----

    async fn attach(&mut self, request: &AttachRequest) -> Result<(), SinkError> {
        self.qos = request.qos;

        self.set_state(EndpointState::ValidatingAddress);
        let address = SinkAddress::parse(&request.address)?;
        self.topic = address.topic().to_string();

        self.set_state(EndpointState::ValidatingFilters);
        let filters = SinkFilters::validate(&request.filters)?;

        self.set_state(EndpointState::ResolvingConverter);
        let converter = self.registry.resolve(&self.config.message_converter)?;
        self.converter = Some(converter);

        self.set_state(EndpointState::Subscribing);
        match filters.partition {
            Some(partition) => self.assign(partition, filters.offset).await?,
            None => {
                self.client.subscribe(&self.topic).await.map_err(|error| {
                    debug!(%error, topic = %self.topic, "subscribe failed");
                    SubscriptionError::Subscribe {
                        topic: self.topic.clone(),
                    }
                })?;
            }
        }

        debug!(address = %address, qos = ?self.qos, "sink endpoint attached");
        self.set_state(EndpointState::Streaming);
        Ok(())
    }

    async fn assign(
        &mut self,
        partition: PartitionId,
        offset: Option<Offset>,
    ) -> Result<(), SinkError> {
        let infos = self
            .client
            .partitions_for(&self.topic)
            .await
            .map_err(|error| {
                debug!(%error, topic = %self.topic, "partition metadata lookup failed");
                SubscriptionError::PartitionInfo {
                    topic: self.topic.clone(),
                }
            })?;
        debug!(topic = %self.topic, partitions = infos.len(), "partition metadata fetched");

        let tp = TopicPartition::new(self.topic.clone(), partition);
        if !self.claims.try_claim(&tp) {
            return Err(SinkError::NoFreePartitions);
        }
        self.claimed = Some(tp.clone());

        self.client.assign(&tp).await.map_err(|error| {
            debug!(%error, %tp, "partition assignment failed");
            SubscriptionError::Assign {
                topic: self.topic.clone(),
                partition,
            }
        })?;
        if let Some(offset) = offset {
            self.client.seek(&tp, offset).await.map_err(|error| {
                debug!(%error, %tp, %offset, "seek failed");
                SubscriptionError::Assign {
                    topic: self.topic.clone(),
                    partition,
                }
            })?;
        }
        Ok(())
    }

    // ---- Streaming ----

    async fn stream(&mut self) -> Result<(), SinkError> {
        while !self.closing {
            self.drain_events();
            self.reconcile().await;
            if self.closing {
                break;
            }

            if self.can_fetch() {
                if self.paused {
                    self.client.resume();
                    self.paused = false;
                }
                let max = self.config.max_poll_records.min(self.link.credit() as usize);
                let batch = self.client.fetch(max).await.map_err(|error| {
                    warn!(%error, topic = %self.topic, "record fetch failed");
                    SinkError::Fetch {
                        topic: self.topic.clone(),
                    }
                })?;
                if batch.is_empty() {
                    self.idle().await;
                } else {
                    self.forward(batch)?;
                }
            } else {
                if !self.paused {
                    self.client.pause();
                    self.paused = true;
                }
                match self.events.recv().await {
                    Some(event) => self.handle_event(event),
                    None => self.closing = true,
                }
            }
        }
        Ok(())
    }

    /// Whether another fetch may run: the receiver must have granted
    /// credit, and under at-least-once the unsettled window gates fetching
    /// with hysteresis so it does not flap at the boundary.
    fn can_fetch(&mut self) -> bool {
        if self.link.credit() == 0 {
            return false;
        }
        if self.qos == Qos::AtMostOnce {
            return true;
        }
        if self.throttled {
            if self.unsettled.len() <= self.config.resume_threshold {
                self.throttled = false;
            }
        } else if self.unsettled.len() >= self.config.max_unsettled_deliveries {
            debug!(
                unsettled = self.unsettled.len(),
                "unsettled window full, suspending fetch"
            );
            self.throttled = true;
        }
        !self.throttled
    }

    fn forward(&mut self, batch: Vec<Record>) -> Result<(), SinkError> {
        match self.qos {
            Qos::AtLeastOnce => {
                // Announce the whole batch before sending anything, so the
                // commit point cannot run ahead of in-flight deliveries.
                for record in &batch {
                    self.tracker.track(record.partition, record.offset);
                }
                for record in batch {
                    let Some(message) = self.convert(&record)? else {
                        self.tracker.delivered(record.partition, record.offset);
                        continue;
                    };
                    let tag = DeliveryTag::for_record(record.partition, record.offset);
                    self.unsettled
                        .insert(tag.clone(), (record.partition, record.offset));
                    self.link.send_unsettled(tag, message);
                }
            }
            Qos::AtMostOnce => {
                for record in batch {
                    let Some(message) = self.convert(&record)? else {
                        continue;
                    };
                    let tag = DeliveryTag::for_record(record.partition, record.offset);
                    self.link.send(tag, message);
                    self.pending_commit
                        .insert(record.partition, record.offset);
                }
            }
        }
        Ok(())
    }

    /// Converts one record, applying the unprocessable policy when the
    /// converter declines it. `Ok(None)` means the record was dropped.
    fn convert(&mut self, record: &Record) -> Result<Option<AmqpMessage>, SinkError> {
        let converter = self
            .converter
            .as_ref()
            .ok_or(SinkError::Conversion {
                partition: record.partition,
                offset: record.offset,
            })?;
        match converter.to_message(record) {
            Some(message) => Ok(Some(message)),
            None => match self.config.unprocessable_policy {
                UnprocessablePolicy::Halt => Err(SinkError::Conversion {
                    partition: record.partition,
                    offset: record.offset,
                }),
                UnprocessablePolicy::Drop => {
                    warn!(
                        partition = %record.partition,
                        offset = %record.offset,
                        "dropping unprocessable record"
                    );
                    Ok(None)
                }
            },
        }
    }

    fn handle_event(&mut self, event: EndpointEvent) {
        match event {
            EndpointEvent::Disposition { tag, outcome } => {
                let Some((partition, offset)) = self.unsettled.remove(&tag) else {
                    debug!(?tag, "disposition for unknown delivery tag");
                    return;
                };
                match outcome {
                    Disposition::Accepted => self.tracker.delivered(partition, offset),
                    Disposition::Rejected | Disposition::Released => {
                        warn!(
                            %partition,
                            %offset,
                            ?outcome,
                            "delivery not accepted, offset will not be committed"
                        );
                    }
                }
            }
            EndpointEvent::CreditReplenished => {}
            EndpointEvent::PartitionsRevoked(partitions) => {
                debug!(?partitions, "partitions revoked");
                self.tracker.clear_partitions(&partitions);
                self.unsettled
                    .retain(|_, (partition, _)| !partitions.contains(partition));
            }
            EndpointEvent::Close => self.closing = true,
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
    }

    /// Commits whatever the tracker says is safe. A failed commit is
    /// retried on the next cycle without advancing the tracker.
    async fn reconcile(&mut self) {
        let offsets = match self.qos {
            Qos::AtLeastOnce => self.tracker.offsets_to_commit(),
            Qos::AtMostOnce => std::mem::take(&mut self.pending_commit),
        };
        if offsets.is_empty() {
            return;
        }
        match self.client.commit(&offsets).await {
            Ok(()) => {
                debug!(?offsets, "offsets committed");
                if self.qos == Qos::AtLeastOnce {
                    self.tracker.commit(&offsets);
                }
            }
            Err(error) => {
                warn!(%error, "offset commit failed, will retry");
                if self.qos == Qos::AtMostOnce {
                    self.pending_commit.extend(offsets);
                }
            }
        }
    }

    async fn idle(&mut self) {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        tokio::select! {
            event = self.events.recv() => match event {
                Some(event) => self.handle_event(event),
                None => self.closing = true,
            },
            () = tokio::time::sleep(interval) => {}
        }
    }

    // ---- Teardown ----

    async fn shutdown(&mut self) {
        self.set_state(EndpointState::Closing);
        self.drain_events();
        self.reconcile().await;
        self.client.close().await;
        self.release_claim();
        self.link.detach(None);
        self.set_state(EndpointState::Closed);
        debug!(topic = %self.topic, "sink endpoint closed");
    }

    async fn abort(&mut self, error: SinkError) {
        let condition = error.condition();
        warn!(
            condition = condition.condition,
            description = %condition.description,
            "detaching sink endpoint"
        );
        self.client.close().await;
        self.release_claim();
        self.link.detach(Some(condition));
        self.set_state(EndpointState::Detached);
    }

    fn release_claim(&mut self) {
        if let Some(tp) = self.claimed.take() {
            self.claims.release(&tp);
        }
    }

    fn set_state(&self, state: EndpointState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }
}
