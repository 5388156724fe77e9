use anyhow::Context;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use udp_cluster::{ClusterEvent, ClusterManager, ClusterOptions, ClusterState, Dispatch, MessageId};

const TEST_MESSAGE: MessageId = MessageId::from_code(b"TEST");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut options = ClusterOptions::default();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--config", Some(path)) => {
                options = ClusterOptions::from_json_file(path)?;
                i += 2;
            }
            ("--expected", Some(v)) => {
                options.expected_nodes = v.parse().context("--expected takes a node count")?;
                i += 2;
            }
            ("--secret", Some(v)) => {
                options.secret = v.parse().context("--secret takes an integer")?;
                i += 2;
            }
            ("--port", Some(v)) => {
                options.port = v.parse().context("--port takes a UDP port")?;
                i += 2;
            }
            ("--help", _) | ("-h", _) => {
                eprintln!(
                    "Usage: {} [--config <file.json>] [--expected <n>] [--secret <n>] [--port <n>]",
                    args[0]
                );
                eprintln!("Example: {} --expected 3 --secret 1234", args[0]);
                return Ok(());
            }
            (other, _) => {
                eprintln!("Ignoring unknown or incomplete argument {}", other);
                i += 1;
            }
        }
    }

    let options = options.apply_env()?;
    let cluster = ClusterManager::new(options).await?;
    tracing::info!(
        "Node ID: {} address {}",
        cluster.unique_id(),
        cluster.local_address()
    );

    cluster.register_handler(TEST_MESSAGE, Dispatch::Immediate, |message| {
        tracing::info!(
            "Received {} from {} ({} bytes)",
            message.message_id,
            message.sender_id(),
            message.payload.len()
        );
    });

    tokio::spawn(log_events(cluster.subscribe()));

    tracing::info!("Press Ctrl+C to shutdown");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = interval.tick() => {
                cluster.dispatch_deferred();

                if cluster.state() != ClusterState::Ready {
                    tracing::info!("Waiting for cluster: {:?}, {} peers", cluster.state(), cluster.node_count());
                    continue;
                }

                let multicast = cluster.multicast_node();
                let sent = cluster.send_message_with(
                    &multicast,
                    TEST_MESSAGE,
                    b"ping",
                    None,
                    |report| {
                        tracing::info!(
                            "TEST {} finished in {:.4}s, {} of {} acks, timed out {}",
                            report.instance_id,
                            report.total_time.as_secs_f32(),
                            report.acked_by.len(),
                            report.expected_acks,
                            report.timed_out
                        );
                    },
                );
                if let Err(e) = sent {
                    tracing::warn!("Failed to send TEST: {}", e);
                }

                cluster.log_stats();
            }
        }
    }

    cluster.shutdown().await?;
    Ok(())
}

/// Logs cluster events until the manager goes away. Returns how many were logged.
async fn log_events(mut events: broadcast::Receiver<ClusterEvent>) -> usize {
    let mut logged = 0;
    loop {
        match events.recv().await {
            Ok(ClusterEvent::StateChanged { previous, current }) => {
                tracing::info!("Cluster state {:?} -> {:?}", previous, current);
            }
            Ok(ClusterEvent::NodeCountChanged { node, count, .. }) => {
                tracing::info!("Node count is now {} ({})", count, node);
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Event log fell behind, skipped {} events", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        }
        logged += 1;
    }
    logged
}
