use serde::{Deserialize, Serialize};
use std::fmt;

use crate::membership::types::NodeId;

/// Message type tag: a four-character code packed little-endian into 32 bits.
///
/// `MessageId::from_code(b"TEST")` stores `'T' | 'E' << 8 | 'S' << 16 | 'T' << 24`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u32);

impl MessageId {
    /// Acknowledgment; payload is an [`AckPayload`].
    pub const ACK: MessageId = MessageId::from_code(b"_ACK");
    /// Discovery probe broadcast on startup.
    pub const IDENTIFY: MessageId = MessageId::from_code(b"_IDF");
    /// Graceful leave notice broadcast on shutdown.
    pub const SHUTDOWN: MessageId = MessageId::from_code(b"_EXT");

    pub const fn from_code(code: &[u8; 4]) -> Self {
        Self(u32::from_le_bytes(*code))
    }

    /// Parses a four-byte ASCII code such as `"TEST"`.
    pub fn parse(code: &str) -> Option<Self> {
        let bytes: [u8; 4] = code.as_bytes().try_into().ok()?;
        bytes
            .iter()
            .all(u8::is_ascii)
            .then_some(Self::from_code(&bytes))
    }

    pub fn is_reserved(self) -> bool {
        self == Self::ACK || self == Self::IDENTIFY || self == Self::SHUTDOWN
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.to_le_bytes() {
            let c = if byte.is_ascii_graphic() { byte as char } else { '.' };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

/// Identifies one message transmission: `(sender << 32) | counter`.
///
/// The sender's node id lives in the high half, so the receiver can tell who
/// originated a datagram (and drop its own echoes) without any other field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

impl InstanceId {
    pub fn new(sender: NodeId, counter: u32) -> Self {
        Self((u64::from(sender.0) << 32) | u64::from(counter))
    }

    pub fn sender(self) -> NodeId {
        NodeId((self.0 >> 32) as u32)
    }

    pub fn counter(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.sender(), self.counter())
    }
}

/// Body of an `_ACK` datagram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AckPayload {
    /// Instance being acknowledged.
    pub instance_id: InstanceId,
    /// Acker's smoothed delay between receipt and deferred dispatch, in seconds.
    pub avg_dispatch_delay: f32,
}

impl AckPayload {
    pub const SIZE: usize = 12;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.instance_id.0.to_le_bytes());
        buf.extend_from_slice(&self.avg_dispatch_delay.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }
        let instance_id = u64::from_le_bytes(buf[0..8].try_into().ok()?);
        let avg_dispatch_delay = f32::from_le_bytes(buf[8..12].try_into().ok()?);
        Some(Self {
            instance_id: InstanceId(instance_id),
            avg_dispatch_delay,
        })
    }
}
