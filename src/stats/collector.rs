use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;

use super::types::{MessageStats, PeerStats, smooth};
use crate::wire::types::MessageId;

/// Diagnostics only; nothing here feeds back into protocol decisions.
#[derive(Default)]
pub struct StatsCollector {
    peers: DashMap<IpAddr, PeerStats>,
    messages: DashMap<MessageId, MessageStats>,
    dispatch_delay: Mutex<f32>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_peer_ack(&self, address: IpAddr, rtt: f32, reported_dispatch_delay: f32) {
        self.peers
            .entry(address)
            .or_default()
            .observe(rtt, reported_dispatch_delay);
    }

    pub fn record_message_completed(&self, message_id: MessageId, total_time: f32) {
        self.messages
            .entry(message_id)
            .or_default()
            .observe(total_time);
    }

    /// Folds one receipt-to-dispatch delay of a deferred handler into the
    /// average advertised in outgoing acks.
    pub fn record_dispatch_delay(&self, delay: f32) {
        smooth(&mut self.dispatch_delay.lock(), delay);
    }

    pub fn avg_dispatch_delay(&self) -> f32 {
        *self.dispatch_delay.lock()
    }

    pub fn peer(&self, address: &IpAddr) -> PeerStats {
        self.peers
            .get(address)
            .map(|entry| *entry.value())
            .unwrap_or_default()
    }

    pub fn message(&self, message_id: &MessageId) -> MessageStats {
        self.messages
            .get(message_id)
            .map(|entry| *entry.value())
            .unwrap_or_default()
    }

    pub fn peers(&self) -> HashMap<IpAddr, PeerStats> {
        self.peers
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    pub fn messages(&self) -> HashMap<MessageId, MessageStats> {
        self.messages
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    pub fn log(&self) {
        for (address, stats) in self.peers() {
            tracing::info!(
                "RTT for address {} min {:.4} max {:.4} avg {:.4} dispatch {:.4}",
                address,
                stats.min_rtt,
                stats.max_rtt,
                stats.avg_rtt,
                stats.avg_dispatch_delay
            );
        }
        for (message_id, stats) in self.messages() {
            tracing::info!(
                "RTT for message {} min {:.4} max {:.4} avg {:.4}",
                message_id,
                stats.min_rtt,
                stats.max_rtt,
                stats.avg_rtt
            );
        }
    }
}
