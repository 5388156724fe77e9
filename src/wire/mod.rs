//! Wire Protocol Module
//!
//! Stateless encoding of cluster datagrams: a fixed-width header followed by raw
//! payload bytes. There are no string fields and no length prefix; a datagram is
//! exactly one message.
//!
//! ## Submodules
//! - **`types`**: `MessageId` four-character codes, `InstanceId`, and the ack body.
//! - **`codec`**: header layout, encode/decode, and `WireError`.

pub mod codec;
pub mod types;
