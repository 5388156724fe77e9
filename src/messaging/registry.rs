//! In-flight and recently received messages, keyed by instance id.

use anyhow::Result;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::Instant;

use super::types::{Message, OutboundMessage};
use crate::wire::types::InstanceId;

#[derive(Default)]
pub struct MessageRegistry {
    outbound: DashMap<InstanceId, OutboundMessage>,
    inbound: DashMap<InstanceId, Message>,
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_outbound(&self, message: OutboundMessage) -> Result<()> {
        match self.outbound.entry(message.instance_id) {
            Entry::Occupied(_) => Err(anyhow::anyhow!(
                "Instance {} is already in flight",
                message.instance_id
            )),
            Entry::Vacant(slot) => {
                slot.insert(message);
                Ok(())
            }
        }
    }

    /// Runs `f` against an in-flight message. The map shard stays locked while
    /// `f` runs, so `f` must not call back into the registry.
    pub fn with_outbound<R>(
        &self,
        instance_id: &InstanceId,
        f: impl FnOnce(&mut OutboundMessage) -> R,
    ) -> Option<R> {
        self.outbound
            .get_mut(instance_id)
            .map(|mut entry| f(entry.value_mut()))
    }

    pub fn remove_outbound(&self, instance_id: &InstanceId) -> Option<OutboundMessage> {
        self.outbound.remove(instance_id).map(|(_, message)| message)
    }

    /// Snapshot of in-flight instance ids, taken without holding any guard afterwards.
    pub fn outbound_ids(&self) -> Vec<InstanceId> {
        self.outbound.iter().map(|entry| *entry.key()).collect()
    }

    pub fn outbound_count(&self) -> usize {
        self.outbound.len()
    }

    /// Remembers an inbound message. Returns `false` if the instance was
    /// already recorded (a retransmission).
    pub fn record_inbound(&self, message: Message) -> bool {
        match self.inbound.entry(message.instance_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(message);
                true
            }
        }
    }

    pub fn has_inbound(&self, instance_id: &InstanceId) -> bool {
        self.inbound.contains_key(instance_id)
    }

    pub fn inbound_count(&self) -> usize {
        self.inbound.len()
    }

    /// Drops inbound records whose timeout has elapsed. Returns how many were removed.
    pub fn expire_inbound(&self, now: Instant) -> usize {
        let expired: Vec<InstanceId> = self
            .inbound
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| *entry.key())
            .collect();

        for instance_id in &expired {
            if let Some((_, message)) = self.inbound.remove(instance_id) {
                tracing::trace!(
                    "Expiring inbound message {} instance {} after {:.4} seconds",
                    message.message_id,
                    message.instance_id,
                    message.timeout.as_secs_f32()
                );
            }
        }

        expired.len()
    }
}
