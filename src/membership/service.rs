use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU8, Ordering};

use super::types::{ClusterEvent, ClusterNode, ClusterState, NodeId};

/// Node table plus the discovery state machine.
///
/// Mutations return the events they caused instead of publishing them, so the
/// caller decides when listeners run (always after any map guard is released).
pub struct MembershipService {
    pub local_id: NodeId,
    members: DashMap<NodeId, ClusterNode>,
    state: AtomicU8,
    expected_nodes: usize,
}

impl MembershipService {
    /// `expected_nodes` counts the local node too.
    pub fn new(local_id: NodeId, expected_nodes: usize) -> Self {
        Self {
            local_id,
            members: DashMap::new(),
            state: AtomicU8::new(ClusterState::Discovering.to_u8()),
            expected_nodes,
        }
    }

    pub fn state(&self) -> ClusterState {
        ClusterState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn node_count(&self) -> usize {
        self.members.len()
    }

    /// Number of peers that must be known before the cluster is ready.
    pub fn required_peers(&self) -> usize {
        self.expected_nodes.saturating_sub(1)
    }

    pub fn get_member(&self, id: &NodeId) -> Option<ClusterNode> {
        self.members.get(id).map(|entry| *entry.value())
    }

    pub fn members(&self) -> Vec<ClusterNode> {
        let mut nodes: Vec<ClusterNode> = self
            .members
            .iter()
            .map(|entry| *entry.value())
            .collect();
        nodes.sort_by_key(|node| node.id);
        nodes
    }

    /// Records a peer seen on the wire. Unknown ids are added and may advance
    /// `Discovering -> Ready`; known ids are left untouched.
    pub fn add_node_if_absent(&self, address: IpAddr, id: NodeId) -> Vec<ClusterEvent> {
        let mut events = Vec::new();

        if id == self.local_id {
            tracing::error!("Refusing to add self ({}) as a cluster node", id);
            return events;
        }

        if self.members.contains_key(&id) {
            return events;
        }

        let node = ClusterNode::new(address, id);
        let previous = self.members.len();
        self.members.insert(id, node);
        let count = self.members.len();

        tracing::debug!(
            "Adding new node id {} address {}. Node count is now {}",
            id,
            address,
            count
        );

        events.push(ClusterEvent::NodeCountChanged {
            node,
            count,
            previous,
        });

        events.extend(self.check_ready());
        events
    }

    /// Drops a peer after it announced it is leaving. Cluster state is unchanged.
    pub fn remove_node(&self, id: &NodeId) -> Vec<ClusterEvent> {
        let previous = self.members.len();

        match self.members.remove(id) {
            Some((_, node)) => {
                let count = self.members.len();
                tracing::debug!(
                    "Removing node id {} address {}. Node count is now {}",
                    node.id,
                    node.address,
                    count
                );
                vec![ClusterEvent::NodeCountChanged {
                    node,
                    count,
                    previous,
                }]
            }
            None => Vec::new(),
        }
    }

    /// Promotes `Discovering -> Ready` once enough peers are known.
    pub fn check_ready(&self) -> Option<ClusterEvent> {
        if self.members.len() >= self.required_peers() {
            self.transition(ClusterState::Discovering, ClusterState::Ready)
        } else {
            None
        }
    }

    /// Called when the identify broadcast expires. Only a cluster still
    /// discovering moves to `TimedOut`; a ready cluster stays ready.
    pub fn identify_expired(&self) -> Option<ClusterEvent> {
        if self.members.len() >= self.required_peers() {
            return self.check_ready();
        }
        let event = self.transition(ClusterState::Discovering, ClusterState::TimedOut);
        if event.is_some() {
            tracing::info!(
                "Cluster discovery timed out with {} of {} peers",
                self.members.len(),
                self.required_peers()
            );
        }
        event
    }

    pub fn dispose(&self) -> Option<ClusterEvent> {
        let previous = ClusterState::from_u8(
            self.state
                .swap(ClusterState::Disposed.to_u8(), Ordering::AcqRel),
        );
        (previous != ClusterState::Disposed).then_some(ClusterEvent::StateChanged {
            previous,
            current: ClusterState::Disposed,
        })
    }

    fn transition(&self, from: ClusterState, to: ClusterState) -> Option<ClusterEvent> {
        self.state
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| {
                tracing::info!("Cluster state {:?} -> {:?}", from, to);
                ClusterEvent::StateChanged {
                    previous: from,
                    current: to,
                }
            })
    }
}
