//! Datagram framing.
//!
//! Layout (little-endian, no padding, payload fills the rest of the datagram):
//!
//! | Offset | Size    | Field         |
//! |--------|---------|---------------|
//! | 0      | 4       | recipient id  |
//! | 4      | 4       | message id    |
//! | 8      | 8       | instance id   |
//! | 16     | 8       | secret        |
//! | 24     | 4       | timeout (f32) |
//! | 28     | 4 or 16 | sender IP     |
//! | 32/44  | N       | payload       |

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use super::types::{InstanceId, MessageId};
use crate::membership::types::NodeId;

/// Bytes preceding the sender address.
pub const FIXED_HEADER_SIZE: usize = 28;

/// Largest datagram the receive worker reads.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Longest message timeout accepted on the wire or for a send, in seconds.
pub const MAX_TIMEOUT_SECS: f32 = 86_400.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WireError {
    #[error("insufficient data: need {needed} bytes, have {have}")]
    InsufficientData { needed: usize, have: usize },

    #[error("invalid timeout field: {0}")]
    InvalidTimeout(f32),
}

/// Fixed-width datagram header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    /// `NodeId::BROADCAST` for every node, otherwise the only node that may accept it.
    pub recipient: NodeId,
    pub message_id: MessageId,
    pub instance_id: InstanceId,
    pub secret: u64,
    pub timeout_secs: f32,
    pub sender: IpAddr,
}

impl Header {
    pub fn encoded_len(&self) -> usize {
        FIXED_HEADER_SIZE + address_len(&self.sender)
    }

    /// Writes the header followed by `payload` into one buffer.
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len() + payload.len());
        buf.extend_from_slice(&self.recipient.0.to_le_bytes());
        buf.extend_from_slice(&self.message_id.0.to_le_bytes());
        buf.extend_from_slice(&self.instance_id.0.to_le_bytes());
        buf.extend_from_slice(&self.secret.to_le_bytes());
        buf.extend_from_slice(&self.timeout_secs.to_le_bytes());
        match self.sender {
            IpAddr::V4(v4) => buf.extend_from_slice(&v4.octets()),
            IpAddr::V6(v6) => buf.extend_from_slice(&v6.octets()),
        }
        buf.extend_from_slice(payload);
        buf
    }
}

/// A decoded datagram: header plus owned payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Datagram {
    pub header: Header,
    pub payload: Vec<u8>,
}

/// Decodes a received datagram. The sender address width follows the address
/// family of the socket it arrived from.
pub fn decode(buf: &[u8], source: &SocketAddr) -> Result<Datagram, WireError> {
    let ipv6 = source.is_ipv6();
    let needed = FIXED_HEADER_SIZE + if ipv6 { 16 } else { 4 };

    if buf.len() < needed {
        return Err(WireError::InsufficientData {
            needed,
            have: buf.len(),
        });
    }

    let recipient = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let message_id = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let instance_id = u64::from_le_bytes([
        buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
    ]);
    let secret = u64::from_le_bytes([
        buf[16], buf[17], buf[18], buf[19], buf[20], buf[21], buf[22], buf[23],
    ]);
    let timeout_secs = f32::from_le_bytes([buf[24], buf[25], buf[26], buf[27]]);

    if !(0.0..=MAX_TIMEOUT_SECS).contains(&timeout_secs) {
        return Err(WireError::InvalidTimeout(timeout_secs));
    }

    let sender = if ipv6 {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&buf[28..44]);
        IpAddr::V6(Ipv6Addr::from(octets))
    } else {
        IpAddr::V4(Ipv4Addr::new(buf[28], buf[29], buf[30], buf[31]))
    };

    Ok(Datagram {
        header: Header {
            recipient: NodeId(recipient),
            message_id: MessageId(message_id),
            instance_id: InstanceId(instance_id),
            secret,
            timeout_secs,
            sender,
        },
        payload: buf[needed..].to_vec(),
    })
}

fn address_len(address: &IpAddr) -> usize {
    match address {
        IpAddr::V4(_) => 4,
        IpAddr::V6(_) => 16,
    }
}
