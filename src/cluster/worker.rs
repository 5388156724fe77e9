//! Process worker: applies queued datagrams to the engine and sweeps in-flight
//! messages between batches.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::engine::ClusterEngine;
use crate::wire::codec::Datagram;

/// Most datagrams handled before a sweep is forced.
const MAX_BATCH: usize = 256;

/// Runs until `cancel` fires or the receive worker drops its sender.
///
/// Waits up to the poll interval for traffic, handles whatever has queued up
/// (bounded by [`MAX_BATCH`]), then sweeps.
pub async fn process_loop(
    engine: Arc<ClusterEngine>,
    mut queue: mpsc::UnboundedReceiver<Datagram>,
    cancel: CancellationToken,
) {
    let poll_interval = engine.options.poll_interval();

    loop {
        let first = tokio::select! {
            _ = cancel.cancelled() => break,
            received = tokio::time::timeout(poll_interval, queue.recv()) => received,
        };

        match first {
            Ok(Some(datagram)) => {
                engine.handle_datagram(datagram, Instant::now());

                let mut handled = 1;
                while handled < MAX_BATCH {
                    match queue.try_recv() {
                        Ok(datagram) => {
                            engine.handle_datagram(datagram, Instant::now());
                            handled += 1;
                        }
                        Err(_) => break,
                    }
                }
            }
            Ok(None) => {
                tracing::debug!("Receive queue closed");
                break;
            }
            // Nothing arrived within the poll interval.
            Err(_) => {}
        }

        engine.sweep(Instant::now());
    }

    tracing::debug!("Process worker stopped");
}
