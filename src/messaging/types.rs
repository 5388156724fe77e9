use anyhow::Result;
use serde::de::DeserializeOwned;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use crate::membership::types::{ClusterNode, NodeId};
use crate::wire::types::{InstanceId, MessageId};

/// A received application message, kept until its timeout elapses so that
/// retransmissions of the same instance are acknowledged but not redispatched.
#[derive(Debug, Clone)]
pub struct Message {
    pub message_id: MessageId,
    pub sender: IpAddr,
    pub instance_id: InstanceId,
    pub arrival: Instant,
    pub timeout: Duration,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn sender_id(&self) -> NodeId {
        self.instance_id.sender()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.arrival
            .checked_add(self.timeout)
            .is_some_and(|deadline| now > deadline)
    }

    /// Decodes a payload sent with `ClusterManager::send_serialized`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(bincode::deserialize(&self.payload)?)
    }
}

/// Lifecycle of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Sending,
    Completed,
    TimedOut,
}

/// Result of feeding one ack into an [`OutboundMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// This node already acked the instance, or the message is no longer sending.
    Duplicate,
    Pending { remaining: usize },
    Completed,
}

/// Final outcome handed to the completion callback.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub message_id: MessageId,
    pub instance_id: InstanceId,
    pub destination: ClusterNode,
    pub timed_out: bool,
    pub expected_acks: usize,
    /// Nodes that acknowledged, with the time since first transmission.
    pub acked_by: Vec<(NodeId, IpAddr, Duration)>,
    pub total_time: Duration,
}

pub type CompletionFn = Box<dyn FnOnce(&DeliveryReport) + Send + Sync + 'static>;

/// A message this node is trying to deliver.
pub struct OutboundMessage {
    pub message_id: MessageId,
    pub destination: ClusterNode,
    pub instance_id: InstanceId,
    pub timeout: Duration,
    pub started: Instant,
    pub last_sent: Instant,
    pub expected_acks: usize,
    acks: Vec<(NodeId, IpAddr, Duration)>,
    state: DeliveryState,
    /// Complete encoded datagram, resent unchanged.
    pub datagram: Vec<u8>,
    completion: Option<CompletionFn>,
}

impl OutboundMessage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        message_id: MessageId,
        destination: ClusterNode,
        instance_id: InstanceId,
        timeout: Duration,
        expected_acks: usize,
        now: Instant,
        datagram: Vec<u8>,
        completion: Option<CompletionFn>,
    ) -> Self {
        Self {
            message_id,
            destination,
            instance_id,
            timeout,
            started: now,
            last_sent: now,
            expected_acks,
            acks: Vec::with_capacity(expected_acks),
            state: DeliveryState::Sending,
            datagram,
            completion,
        }
    }

    pub fn state(&self) -> DeliveryState {
        self.state
    }

    pub fn remaining_acks(&self) -> usize {
        self.expected_acks.saturating_sub(self.acks.len())
    }

    pub fn has_ack_from(&self, node: NodeId) -> bool {
        self.acks.iter().any(|(id, _, _)| *id == node)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.started
            .checked_add(self.timeout)
            .is_some_and(|deadline| now > deadline)
    }

    pub fn needs_resend(&self, now: Instant, retry_interval: Duration) -> bool {
        now.saturating_duration_since(self.last_sent) > retry_interval
    }

    /// Records an ack from `node`. Repeated acks from the same node are no-ops.
    ///
    /// A message expecting zero acks (multicast with no known peers) can only
    /// finish by timing out.
    pub fn record_ack(&mut self, node: NodeId, address: IpAddr, now: Instant) -> AckOutcome {
        if self.state != DeliveryState::Sending
            || self.expected_acks == 0
            || self.has_ack_from(node)
        {
            return AckOutcome::Duplicate;
        }

        let elapsed = now.saturating_duration_since(self.started);
        self.acks.push((node, address, elapsed));

        tracing::trace!(
            "HandleAck: message {} node {} id {} time {:.4} remaining {}",
            self.message_id,
            node,
            self.instance_id,
            elapsed.as_secs_f32(),
            self.remaining_acks()
        );

        if self.remaining_acks() == 0 {
            self.state = DeliveryState::Completed;
            AckOutcome::Completed
        } else {
            AckOutcome::Pending {
                remaining: self.remaining_acks(),
            }
        }
    }

    /// Moves a still-sending message to `TimedOut`.
    pub fn expire(&mut self) {
        if self.state == DeliveryState::Sending {
            self.state = DeliveryState::TimedOut;
        }
    }

    /// Builds the final report and hands back the completion callback, which
    /// can only be taken once.
    pub fn finish(&mut self, now: Instant) -> (DeliveryReport, Option<CompletionFn>) {
        let report = DeliveryReport {
            message_id: self.message_id,
            instance_id: self.instance_id,
            destination: self.destination,
            timed_out: self.state == DeliveryState::TimedOut,
            expected_acks: self.expected_acks,
            acked_by: self.acks.clone(),
            total_time: now.saturating_duration_since(self.started),
        };
        (report, self.completion.take())
    }
}

impl std::fmt::Debug for OutboundMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundMessage")
            .field("message_id", &self.message_id)
            .field("destination", &self.destination)
            .field("instance_id", &self.instance_id)
            .field("timeout", &self.timeout)
            .field("expected_acks", &self.expected_acks)
            .field("acks", &self.acks)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
