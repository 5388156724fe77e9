//! Reliable Messaging Module
//!
//! At-least-once delivery on top of unordered, lossy datagrams.
//!
//! ## Delivery Model
//! 1. **Send**: an `OutboundMessage` is tracked under its instance id and transmitted
//!    immediately.
//! 2. **Retry**: the process worker resends the identical datagram every ack retry
//!    interval until the message completes.
//! 3. **Ack**: receivers answer every non-ack datagram with `_ACK`, duplicates included.
//!    Each distinct acking node decrements the remaining count once.
//! 4. **Finish**: all expected acks seen (`Completed`) or the deadline passed
//!    (`TimedOut`). Either way the completion callback runs exactly once.
//! 5. **Dedup**: receivers remember instance ids until the message's own timeout, so
//!    retransmissions are acknowledged but handlers run once.
//!
//! ## Submodules
//! - **`types`**: `Message`, `OutboundMessage`, and the delivery report.
//! - **`registry`**: concurrent outbound/inbound maps.
//! - **`handlers`**: per-message-id callbacks and the deferred dispatch queue.

pub mod handlers;
pub mod registry;
pub mod types;
