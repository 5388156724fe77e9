use anyhow::Result;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::engine::ClusterEngine;
use super::options::ClusterOptions;
use super::worker::process_loop;
use crate::membership::types::{ClusterEvent, ClusterNode, ClusterState, NodeId};
use crate::messaging::handlers::{Dispatch, HandlerId};
use crate::messaging::types::{DeliveryReport, Message};
use crate::stats::types::{MessageStats, PeerStats};
use crate::transport::receiver::receive_loop;
use crate::transport::socket::{DatagramSink, MulticastTransport};
use crate::wire::types::{InstanceId, MessageId};

/// A running cluster member: socket, both workers, and the protocol state.
///
/// Must be created inside a Tokio runtime. Call [`ClusterManager::shutdown`] to
/// leave the cluster gracefully; dropping the manager only stops the workers.
pub struct ClusterManager {
    engine: Arc<ClusterEngine>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

impl ClusterManager {
    /// Binds the transport, starts the receive and process workers, and
    /// broadcasts the identify probe.
    pub async fn new(options: ClusterOptions) -> Result<Self> {
        options.validate()?;

        let transport = Arc::new(MulticastTransport::bind(
            options.multicast_group,
            options.port,
            options.local_address,
        )?);

        let local_id = NodeId::new();
        let secret = options.secret;
        let sink: Arc<dyn DatagramSink> = transport.clone();
        let engine = Arc::new(ClusterEngine::new(
            options,
            local_id,
            transport.local_address(),
            sink,
        ));

        tracing::info!(
            "Starting cluster node {} at {} expecting {} nodes",
            local_id,
            engine.local_address,
            engine.options.expected_nodes
        );

        let cancel = CancellationToken::new();
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let receiver = tokio::spawn(receive_loop(
            transport,
            local_id,
            secret,
            queue_tx,
            cancel.clone(),
        ));
        let processor = tokio::spawn(process_loop(engine.clone(), queue_rx, cancel.clone()));

        let manager = Self {
            engine,
            cancel,
            workers: Mutex::new(vec![receiver, processor]),
            shutting_down: AtomicBool::new(false),
        };

        manager.engine.start_discovery()?;
        Ok(manager)
    }

    /// Sends with the default timeout and no completion callback.
    pub fn send_message(
        &self,
        target: &ClusterNode,
        message_id: MessageId,
        payload: &[u8],
    ) -> Result<InstanceId> {
        self.engine
            .send_message(target, message_id, payload, None, None)
    }

    /// Sends and calls `on_complete` exactly once, when every expected ack has
    /// arrived or the timeout elapsed (`report.timed_out`).
    pub fn send_message_with<F>(
        &self,
        target: &ClusterNode,
        message_id: MessageId,
        payload: &[u8],
        timeout: Option<Duration>,
        on_complete: F,
    ) -> Result<InstanceId>
    where
        F: FnOnce(&DeliveryReport) + Send + Sync + 'static,
    {
        self.engine.send_message(
            target,
            message_id,
            payload,
            timeout,
            Some(Box::new(on_complete)),
        )
    }

    /// Sends `value` encoded with bincode; receivers read it back with
    /// [`Message::decode_payload`].
    pub fn send_serialized<T: Serialize>(
        &self,
        target: &ClusterNode,
        message_id: MessageId,
        value: &T,
    ) -> Result<InstanceId> {
        let payload = bincode::serialize(value)?;
        self.send_message(target, message_id, &payload)
    }

    pub fn register_handler<F>(
        &self,
        message_id: MessageId,
        dispatch: Dispatch,
        callback: F,
    ) -> HandlerId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.engine.handlers.register(message_id, dispatch, callback)
    }

    pub fn unregister_handler(&self, message_id: MessageId, handler_id: HandlerId) -> bool {
        self.engine.handlers.unregister(message_id, handler_id)
    }

    /// Runs queued deferred handlers on the calling thread. Call once per
    /// application tick. Returns how many ran.
    pub fn dispatch_deferred(&self) -> usize {
        self.engine.deferred.drain()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.engine.subscribe()
    }

    /// Leaves the cluster: multicasts `_EXT`, waits (bounded) for peers to
    /// acknowledge it, then stops both workers. Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        tracing::info!("Node {} leaving the cluster", self.engine.local_id);

        let (done_tx, done_rx) = oneshot::channel();
        let sent = self.engine.send_message(
            &self.engine.multicast_node,
            MessageId::SHUTDOWN,
            &[],
            None,
            Some(Box::new(move |report: &DeliveryReport| {
                let _ = done_tx.send(report.timed_out);
            })),
        );

        match sent {
            Ok(_) => {
                // Completion fires on the sweep after expiry at the latest.
                let wait = self.engine.options.send_timeout()
                    + self.engine.options.poll_interval() * 2;
                match tokio::time::timeout(wait, done_rx).await {
                    Ok(Ok(false)) => tracing::debug!("Leave notice acknowledged by all peers"),
                    Ok(Ok(true)) => tracing::debug!("Leave notice timed out"),
                    Ok(Err(_)) => tracing::warn!("Leave notice was dropped before completing"),
                    Err(_) => tracing::warn!("Gave up waiting for leave notice after {:?}", wait),
                }
            }
            Err(e) => tracing::warn!("Could not send leave notice: {}", e),
        }

        self.engine.publish(self.engine.membership.dispose());
        self.cancel.cancel();

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!("Cluster worker ended abnormally: {}", e);
            }
        }

        tracing::info!("Node {} shut down", self.engine.local_id);
        Ok(())
    }

    pub fn state(&self) -> ClusterState {
        self.engine.membership.state()
    }

    pub fn node_count(&self) -> usize {
        self.engine.membership.node_count()
    }

    /// Snapshot of known peers, ordered by id.
    pub fn nodes(&self) -> Vec<ClusterNode> {
        self.engine.membership.members()
    }

    pub fn node(&self, id: NodeId) -> Option<ClusterNode> {
        self.engine.membership.get_member(&id)
    }

    /// Pseudo-node addressing every known peer.
    pub fn multicast_node(&self) -> ClusterNode {
        self.engine.multicast_node
    }

    pub fn local_address(&self) -> IpAddr {
        self.engine.local_address
    }

    pub fn unique_id(&self) -> NodeId {
        self.engine.local_id
    }

    pub fn options(&self) -> &ClusterOptions {
        &self.engine.options
    }

    /// Time since this manager started.
    pub fn elapsed(&self) -> Duration {
        self.engine.elapsed()
    }

    pub fn peer_stats(&self) -> HashMap<IpAddr, PeerStats> {
        self.engine.stats.peers()
    }

    pub fn message_stats(&self) -> HashMap<MessageId, MessageStats> {
        self.engine.stats.messages()
    }

    pub fn stats_for_peer(&self, address: &IpAddr) -> PeerStats {
        self.engine.stats.peer(address)
    }

    pub fn stats_for_message(&self, message_id: &MessageId) -> MessageStats {
        self.engine.stats.message(message_id)
    }

    pub fn log_stats(&self) {
        self.engine.stats.log();
    }
}

impl Drop for ClusterManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
