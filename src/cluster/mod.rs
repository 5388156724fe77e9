//! Cluster Module
//!
//! The composition root. [`service::ClusterManager`] owns the transport, the two
//! background workers and the protocol state, and is the only type most
//! applications touch.
//!
//! ## Core Mechanisms
//! - **Two workers**: the receive worker (in `transport`) decodes and filters
//!   datagrams; the process worker here applies them to the engine in arrival
//!   order and sweeps in-flight messages between batches.
//! - **Reliable delivery**: every non-ack datagram is acked by its receiver. The
//!   sender resends the identical datagram each ack-retry interval until the
//!   expected number of distinct nodes have acked or the timeout elapses. The
//!   completion callback then runs exactly once.
//! - **Dedup**: retransmissions reuse the instance id; receivers dispatch the
//!   first copy and ack every copy.
//! - **Discovery**: `_IDF` is broadcast on startup; membership grows from any
//!   accepted datagram. `_EXT` is broadcast on shutdown.
//!
//! ## Submodules
//! - `options`: run configuration, JSON and environment loading.
//! - `engine`: the socket-free protocol logic, driven with explicit timestamps.
//! - `worker`: the process worker loop.
//! - `service`: `ClusterManager`.
//!
//! Multicast sends count the nodes known at send time. A peer that leaves
//! before acking makes the send finish by timing out rather than completing.

pub mod engine;
pub mod options;
pub mod service;
pub mod worker;

#[cfg(test)]
mod tests;
