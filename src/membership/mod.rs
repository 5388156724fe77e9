//! Membership & Discovery Module
//!
//! Tracks the peers discovered on the multicast group and drives the cluster
//! discovery state machine.
//!
//! ## Core Mechanisms
//! - **Implicit discovery**: any accepted datagram from an unknown node id adds that
//!   node; there is no separate join handshake.
//! - **Identify broadcast**: on startup the manager multicasts `_IDF` until it times
//!   out. Peers answering it (or any other traffic) grow the node table.
//! - **State machine**: `Discovering -> Ready` once `expected_nodes - 1` peers are known,
//!   `Discovering -> TimedOut` if the identify window closes first, and
//!   `* -> Disposed` on shutdown.
//! - **Leave notices**: a peer's `_EXT` broadcast removes it from the table.

pub mod service;
pub mod types;
