//! Protocol Engine
//!
//! Everything the process worker does with a datagram or a clock tick, kept
//! independent of the socket so it can be driven directly.
//!
//! ## Responsibilities
//! - **Sending**: build, track and first-transmit outbound messages.
//! - **Receiving**: grow the node table, match acks to in-flight messages, dedup and
//!   dispatch everything else, and acknowledge every non-ack datagram.
//! - **Sweeping**: resend unacknowledged messages, time out expired ones, forget
//!   expired inbound records.
//!
//! Callbacks (handlers, completions, event listeners) always run after every map
//! guard has been released, so they may call straight back into the engine.

use anyhow::Result;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use super::options::ClusterOptions;
use crate::membership::service::MembershipService;
use crate::membership::types::{ClusterEvent, ClusterNode, ClusterState, NodeId};
use crate::messaging::handlers::{DeferredQueue, Dispatch, HandlerRegistry};
use crate::messaging::registry::MessageRegistry;
use crate::messaging::types::{AckOutcome, CompletionFn, Message, OutboundMessage};
use crate::stats::collector::StatsCollector;
use crate::transport::socket::DatagramSink;
use crate::wire::codec::{Datagram, Header, MAX_TIMEOUT_SECS};
use crate::wire::types::{AckPayload, InstanceId, MessageId};

const EVENT_CAPACITY: usize = 64;

/// What the sweep decided for one in-flight message.
enum SweepAction {
    Expire,
    Resend(MessageId, Vec<u8>),
    Wait,
}

pub struct ClusterEngine {
    pub options: ClusterOptions,
    pub local_id: NodeId,
    pub local_address: IpAddr,
    pub multicast_node: ClusterNode,
    pub membership: MembershipService,
    pub messages: MessageRegistry,
    pub handlers: HandlerRegistry,
    pub deferred: Arc<DeferredQueue>,
    pub stats: Arc<StatsCollector>,
    events: broadcast::Sender<ClusterEvent>,
    sink: Arc<dyn DatagramSink>,
    next_counter: AtomicU32,
    started: Instant,
}

impl ClusterEngine {
    pub fn new(
        options: ClusterOptions,
        local_id: NodeId,
        local_address: IpAddr,
        sink: Arc<dyn DatagramSink>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let multicast_node = ClusterNode::new(options.multicast_group, NodeId::BROADCAST);
        let membership = MembershipService::new(local_id, options.expected_nodes);

        Self {
            options,
            local_id,
            local_address,
            multicast_node,
            membership,
            messages: MessageRegistry::new(),
            handlers: HandlerRegistry::new(),
            deferred: Arc::new(DeferredQueue::new()),
            stats: Arc::new(StatsCollector::new()),
            events,
            sink,
            next_counter: AtomicU32::new(0),
            started: Instant::now(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.events.subscribe()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn next_instance_id(&self) -> InstanceId {
        let counter = self
            .next_counter
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1);
        InstanceId::new(self.local_id, counter)
    }

    /// Kicks off discovery: a single-node cluster is ready at once; otherwise
    /// the identify broadcast is resent until it times out, and its expiry
    /// decides between `Ready` and `TimedOut`.
    pub fn start_discovery(self: &Arc<Self>) -> Result<InstanceId> {
        if self.membership.required_peers() == 0 {
            self.publish(self.membership.check_ready());
        }

        let engine: Weak<ClusterEngine> = Arc::downgrade(self);
        let timeout = self.options.identify_timeout();

        self.send_message(
            &self.multicast_node,
            MessageId::IDENTIFY,
            &[],
            Some(timeout),
            Some(Box::new(move |report| {
                let Some(engine) = engine.upgrade() else {
                    return;
                };
                if report.timed_out {
                    tracing::debug!(
                        "Identify broadcast expired after {:.4} seconds",
                        report.total_time.as_secs_f32()
                    );
                    engine.publish(engine.membership.identify_expired());
                } else {
                    engine.publish(engine.membership.check_ready());
                }
            })),
        )
    }

    /// Tracks and transmits a message; retries happen on the sweep.
    ///
    /// Multicast sends expect one ack per node known right now. A node leaving
    /// before it acks leaves the message to time out.
    pub fn send_message(
        &self,
        target: &ClusterNode,
        message_id: MessageId,
        payload: &[u8],
        timeout: Option<Duration>,
        completion: Option<CompletionFn>,
    ) -> Result<InstanceId> {
        anyhow::ensure!(message_id.0 != 0, "Message id must be non-zero");
        anyhow::ensure!(
            self.membership.state() != ClusterState::Disposed,
            "Cluster has been disposed"
        );

        let timeout = timeout.unwrap_or_else(|| self.options.send_timeout());
        anyhow::ensure!(!timeout.is_zero(), "Send timeout must be positive");
        anyhow::ensure!(
            timeout.as_secs_f32() <= MAX_TIMEOUT_SECS,
            "Send timeout {:?} exceeds {} seconds",
            timeout,
            MAX_TIMEOUT_SECS
        );

        let instance_id = self.next_instance_id();
        let expected_acks = if target.is_multicast() {
            self.membership.node_count()
        } else {
            1
        };

        let datagram = Header {
            recipient: target.id,
            message_id,
            instance_id,
            secret: self.options.secret,
            timeout_secs: timeout.as_secs_f32(),
            sender: self.local_address,
        }
        .encode(payload);

        let message = OutboundMessage::new(
            message_id,
            *target,
            instance_id,
            timeout,
            expected_acks,
            Instant::now(),
            datagram.clone(),
            completion,
        );
        self.messages.track_outbound(message)?;

        tracing::trace!(
            "Sending message {} instance {} to {} expecting {} acks",
            message_id,
            instance_id,
            target,
            expected_acks
        );
        self.transmit(&datagram, message_id, instance_id);

        Ok(instance_id)
    }

    /// Handles one accepted datagram from the receive queue.
    pub fn handle_datagram(&self, datagram: Datagram, now: Instant) {
        let header = datagram.header;
        let sender_id = header.instance_id.sender();

        // A leave notice must not re-add the node it is about to remove.
        if header.message_id != MessageId::SHUTDOWN {
            self.publish_all(self.membership.add_node_if_absent(header.sender, sender_id));
        }

        if header.message_id == MessageId::ACK {
            self.handle_ack(&header, &datagram.payload, now);
        } else {
            self.handle_message(header, datagram.payload, now);
        }
    }

    fn handle_ack(&self, header: &Header, payload: &[u8], now: Instant) {
        let Some(ack) = AckPayload::decode(payload) else {
            tracing::trace!("Dropping malformed ack {}", header.instance_id);
            return;
        };
        let acker = header.instance_id.sender();

        let result = self.messages.with_outbound(&ack.instance_id, |message| {
            let rtt = now.saturating_duration_since(message.last_sent);
            (message.record_ack(acker, header.sender, now), rtt)
        });

        match result {
            Some((AckOutcome::Duplicate, _)) => {
                tracing::trace!("Ignoring repeated ack for {} from {}", ack.instance_id, acker);
            }
            Some((outcome, rtt)) => {
                self.stats
                    .record_peer_ack(header.sender, rtt.as_secs_f32(), ack.avg_dispatch_delay);
                tracing::trace!(
                    "Ack for {} took {:.4} seconds. Dispatch delay {:.4}",
                    ack.instance_id,
                    rtt.as_secs_f32(),
                    ack.avg_dispatch_delay
                );
                if outcome == AckOutcome::Completed {
                    self.finish(&ack.instance_id, now);
                }
            }
            None => {
                tracing::trace!("Ack for unknown or finished instance {}", ack.instance_id);
            }
        }
    }

    fn handle_message(&self, header: Header, payload: Vec<u8>, now: Instant) {
        let message = Message {
            message_id: header.message_id,
            sender: header.sender,
            instance_id: header.instance_id,
            arrival: now,
            timeout: Duration::try_from_secs_f32(header.timeout_secs).unwrap_or_default(),
            payload,
        };

        if self.messages.record_inbound(message.clone()) {
            tracing::trace!(
                "Dispatching message {} instance {}",
                message.message_id,
                message.instance_id
            );
            self.dispatch(Arc::new(message));
        } else {
            tracing::trace!(
                "Already dispatched message {} instance {}",
                header.message_id,
                header.instance_id
            );
        }

        // Duplicates are acknowledged too, in case our earlier ack was lost.
        self.send_ack(&header);
    }

    fn dispatch(&self, message: Arc<Message>) {
        match message.message_id {
            MessageId::IDENTIFY => self.publish(self.membership.check_ready()),
            MessageId::SHUTDOWN => {
                self.publish_all(self.membership.remove_node(&message.sender_id()))
            }
            _ => {}
        }

        for handler in self.handlers.handlers_for(&message.message_id) {
            match handler.dispatch {
                Dispatch::Immediate => (handler.callback)(&message),
                Dispatch::Deferred => {
                    let message = message.clone();
                    let stats = self.stats.clone();
                    self.deferred.push(Box::new(move || {
                        stats.record_dispatch_delay(message.arrival.elapsed().as_secs_f32());
                        (handler.callback)(&message);
                    }));
                }
            }
        }
    }

    fn send_ack(&self, header: &Header) {
        let instance_id = self.next_instance_id();
        let payload = AckPayload {
            instance_id: header.instance_id,
            avg_dispatch_delay: self.stats.avg_dispatch_delay(),
        }
        .encode();

        let datagram = Header {
            recipient: header.instance_id.sender(),
            message_id: MessageId::ACK,
            instance_id,
            secret: self.options.secret,
            timeout_secs: 0.0,
            sender: self.local_address,
        }
        .encode(&payload);

        self.transmit(&datagram, MessageId::ACK, header.instance_id);
    }

    /// Periodic pass over in-flight and remembered messages.
    pub fn sweep(&self, now: Instant) {
        let retry_interval = self.options.ack_retry_interval();

        for instance_id in self.messages.outbound_ids() {
            let action = self.messages.with_outbound(&instance_id, |message| {
                if message.is_expired(now) {
                    message.expire();
                    SweepAction::Expire
                } else if message.needs_resend(now, retry_interval) {
                    message.last_sent = now;
                    SweepAction::Resend(message.message_id, message.datagram.clone())
                } else {
                    SweepAction::Wait
                }
            });

            match action {
                Some(SweepAction::Expire) => self.finish(&instance_id, now),
                Some(SweepAction::Resend(message_id, datagram)) => {
                    tracing::trace!("Resending message {} instance {}", message_id, instance_id);
                    self.transmit(&datagram, message_id, instance_id);
                }
                Some(SweepAction::Wait) | None => {}
            }
        }

        self.messages.expire_inbound(now);
    }

    /// Removes a completed or timed out message and runs its completion once.
    fn finish(&self, instance_id: &InstanceId, now: Instant) {
        let Some(mut message) = self.messages.remove_outbound(instance_id) else {
            return;
        };

        let (report, completion) = message.finish(now);

        if !report.timed_out {
            self.stats
                .record_message_completed(report.message_id, report.total_time.as_secs_f32());
        }

        tracing::debug!(
            "Message {} instance {} finished in {:.4} seconds. timed out {}",
            report.message_id,
            report.instance_id,
            report.total_time.as_secs_f32(),
            report.timed_out
        );

        if let Some(completion) = completion {
            completion(&report);
        }
    }

    fn transmit(&self, datagram: &[u8], message_id: MessageId, instance_id: InstanceId) {
        match self.sink.send_datagram(datagram) {
            Ok(sent) if sent == datagram.len() => {}
            Ok(sent) => tracing::warn!(
                "Short send for {}: {} of {} bytes",
                instance_id,
                sent,
                datagram.len()
            ),
            Err(e) => {
                if self.membership.state() == ClusterState::Disposed {
                    tracing::trace!("Send after dispose for {}: {}", instance_id, e);
                } else {
                    tracing::error!(
                        "Failed to send message {} instance {}: {}",
                        message_id,
                        instance_id,
                        e
                    );
                }
            }
        }
    }

    pub fn publish(&self, event: Option<ClusterEvent>) {
        if let Some(event) = event {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }

    pub fn publish_all(&self, events: Vec<ClusterEvent>) {
        for event in events {
            self.publish(Some(event));
        }
    }
}
