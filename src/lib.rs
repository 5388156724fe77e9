//! UDP Multicast Cluster Library
//!
//! Peer discovery and acknowledged messaging for processes sharing one
//! multicast domain. Every datagram goes to the group; a header recipient id
//! and a shared secret decide who accepts it.
//!
//! ## Architecture Modules
//! - **`wire`**: the fixed little-endian header, four-character message ids and
//!   64-bit instance ids.
//! - **`transport`**: the multicast socket and the receive worker that filters
//!   and queues incoming datagrams.
//! - **`membership`**: the node table and the `Discovering -> Ready | TimedOut`
//!   state machine.
//! - **`messaging`**: inbound/outbound message tracking, the retry state
//!   machine, and handler registration (immediate or deferred).
//! - **`stats`**: smoothed round-trip and dispatch-latency diagnostics.
//! - **`cluster`**: options, the process worker, and `ClusterManager`, which ties
//!   everything together.

pub mod cluster;
pub mod membership;
pub mod messaging;
pub mod stats;
pub mod transport;
pub mod wire;

pub use cluster::options::ClusterOptions;
pub use cluster::service::ClusterManager;
pub use membership::types::{ClusterEvent, ClusterNode, ClusterState, NodeId};
pub use messaging::handlers::{Dispatch, HandlerId};
pub use messaging::types::{DeliveryReport, Message};
pub use wire::types::{InstanceId, MessageId};
