//! Receive worker: pulls datagrams off the socket, drops anything not meant
//! for this node, and queues the rest for the process worker.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::socket::MulticastTransport;
use crate::membership::types::NodeId;
use crate::wire::codec::{self, Datagram, MAX_DATAGRAM_SIZE, WireError};

/// Why a datagram was dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Malformed(WireError),
    ForeignSecret,
    OtherRecipient(NodeId),
    SelfOriginated,
}

/// Decodes and validates one datagram: the secret must match, the recipient
/// must be broadcast or us, and the sender encoded in the instance id must not
/// be us.
pub fn accept(
    buf: &[u8],
    source: &SocketAddr,
    local_id: NodeId,
    secret: u64,
) -> Result<Datagram, Rejection> {
    let datagram = codec::decode(buf, source).map_err(Rejection::Malformed)?;
    let header = &datagram.header;

    if !header.recipient.is_broadcast() && header.recipient != local_id {
        return Err(Rejection::OtherRecipient(header.recipient));
    }

    if header.secret != secret {
        return Err(Rejection::ForeignSecret);
    }

    if header.instance_id.sender() == local_id {
        return Err(Rejection::SelfOriginated);
    }

    Ok(datagram)
}

/// Runs until `cancel` fires. Each accepted datagram is pushed exactly once.
pub async fn receive_loop(
    transport: Arc<MulticastTransport>,
    local_id: NodeId,
    secret: u64,
    queue: mpsc::UnboundedSender<Datagram>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = transport.recv_from(&mut buf) => received,
        };

        match received {
            Ok((len, source)) => match accept(&buf[..len], &source, local_id, secret) {
                Ok(datagram) => {
                    tracing::trace!(
                        "Received message {} instance {} from {}",
                        datagram.header.message_id,
                        datagram.header.instance_id,
                        source
                    );
                    if queue.send(datagram).is_err() {
                        // Process worker is gone; we are shutting down.
                        break;
                    }
                }
                Err(rejection) => {
                    tracing::trace!("Dropping datagram from {}: {:?}", source, rejection);
                }
            },
            Err(e) => {
                if cancel.is_cancelled() {
                    break;
                }
                tracing::error!("Failed to receive UDP packet: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }

    tracing::debug!("Receive worker stopped");
}
