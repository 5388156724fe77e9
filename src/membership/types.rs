use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// 32-bit identity of a cluster process.
///
/// Zero is reserved as the broadcast recipient, so generated ids are never zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Recipient id meaning "every node".
    pub const BROADCAST: NodeId = NodeId(0);

    /// Generates a random non-zero id, mixed with the process id so that
    /// several instances started on one host at the same moment still differ.
    pub fn new() -> Self {
        use rand::Rng;

        loop {
            let candidate = rand::thread_rng().gen_range(1..i32::MAX as u32) ^ std::process::id();
            if candidate != 0 {
                return Self(candidate);
            }
        }
    }

    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// A known peer.
///
/// The multicast pseudo-node uses [`NodeId::BROADCAST`] and the multicast group
/// address; sending to it addresses every node currently in the registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ClusterNode {
    pub id: NodeId,
    pub address: IpAddr,
}

impl ClusterNode {
    pub fn new(address: IpAddr, id: NodeId) -> Self {
        Self { id, address }
    }

    pub fn is_multicast(&self) -> bool {
        self.id.is_broadcast()
    }
}

impl fmt::Display for ClusterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {} at {}", self.id, self.address)
    }
}

/// Lifecycle of the local view of the cluster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ClusterState {
    /// Identify broadcast in flight, fewer peers known than expected.
    Discovering,
    /// The expected number of peers has been observed.
    Ready,
    /// Discovery window elapsed without reaching the expected node count.
    TimedOut,
    /// `shutdown` has run; no further traffic is processed.
    Disposed,
}

impl ClusterState {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            ClusterState::Discovering => 0,
            ClusterState::Ready => 1,
            ClusterState::TimedOut => 2,
            ClusterState::Disposed => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ClusterState::Discovering,
            1 => ClusterState::Ready,
            2 => ClusterState::TimedOut,
            _ => ClusterState::Disposed,
        }
    }
}

/// Notifications published by the cluster manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterEvent {
    StateChanged {
        previous: ClusterState,
        current: ClusterState,
    },

    /// A node joined (`count > previous`) or left (`count < previous`).
    NodeCountChanged {
        node: ClusterNode,
        count: usize,
        previous: usize,
    },
}
