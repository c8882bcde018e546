//! Simulated nodes and their router-facing views
//!
//! A [`SimNode`] owns everything the host contract makes the host
//! responsible for: energy, location, the message buffer and the per-node
//! router instance. [`NodeView`] is the read-only window another node's
//! selector gets during a tick; it is built by the world with the
//! topology facts (connections, transfer state) a node does not know
//! about itself.

use std::collections::HashSet;

use porter_routing::{
    MessageId, PeerView, Point, RouterConfig, SimId, SimTime, UtilityRouter,
};

use crate::message::SimMessage;

/// Default per-node energy when a scenario does not set one.
pub const DEFAULT_ENERGY: f64 = 100.0;
/// Default buffer capacity in bytes.
pub const DEFAULT_BUFFER: u64 = 1000;

/// A simulated device carrying messages
pub struct SimNode {
    /// Node identity
    pub id: SimId,
    /// Remaining energy (static here; depletion is the host's business
    /// and out of scope for these scenarios)
    pub energy: f64,
    /// Current position in the plane
    pub location: Point,
    /// Total buffer capacity in bytes
    pub buffer_capacity: u64,
    /// Buffered messages
    pub buffer: Vec<SimMessage>,
    /// Message ids this node refuses outright
    pub blacklist: HashSet<MessageId>,
    /// The node's forwarding policy
    pub router: UtilityRouter<SimId>,
}

impl SimNode {
    /// Create a node at a location with the given router configuration
    pub fn new(id: SimId, location: Point, config: RouterConfig) -> Self {
        Self {
            id,
            energy: DEFAULT_ENERGY,
            location,
            buffer_capacity: DEFAULT_BUFFER,
            buffer: Vec::new(),
            blacklist: HashSet::new(),
            router: UtilityRouter::new(id, config),
        }
    }

    /// Bytes currently occupied in the buffer
    pub fn buffer_used(&self) -> u64 {
        self.buffer.iter().map(|m| m.size).sum()
    }

    /// Bytes still free in the buffer
    pub fn buffer_free(&self) -> u64 {
        self.buffer_capacity.saturating_sub(self.buffer_used())
    }

    /// Whether the node carries a message with this id
    pub fn has_message(&self, id: &MessageId) -> bool {
        self.buffer.iter().any(|m| &m.id == id)
    }

    /// Borrow a carried message by id
    pub fn message(&self, id: &MessageId) -> Option<&SimMessage> {
        self.buffer.iter().find(|m| &m.id == id)
    }

    /// Mutably borrow a carried message by id
    pub fn message_mut(&mut self, id: &MessageId) -> Option<&mut SimMessage> {
        self.buffer.iter_mut().find(|m| &m.id == id)
    }

    /// Remove and return a carried message by id
    pub fn remove_message(&mut self, id: &MessageId) -> Option<SimMessage> {
        let index = self.buffer.iter().position(|m| &m.id == id)?;
        Some(self.buffer.remove(index))
    }
}

/// Read-only window onto a node for another node's selector
///
/// Carries the topology facts the world knows but the node itself does
/// not: its current connections and whether it is occupied by a transfer.
pub struct NodeView<'a> {
    pub(crate) node: &'a SimNode,
    pub(crate) now: SimTime,
    pub(crate) connections: Vec<SimId>,
    pub(crate) transferring: bool,
}

impl PeerView<SimId> for NodeView<'_> {
    fn identity(&self) -> &SimId {
        &self.node.id
    }

    fn energy(&self) -> f64 {
        self.node.energy
    }

    fn has_energy(&self) -> bool {
        self.node.energy > 0.0
    }

    fn connected_neighbors(&self) -> Vec<SimId> {
        self.connections.clone()
    }

    fn buffer_capacity(&self) -> u64 {
        self.node.buffer_capacity
    }

    fn is_transferring(&self) -> bool {
        self.transferring
    }

    fn delivery_predictability(&self, destination: &SimId) -> f64 {
        self.node.router.delivery_predictability(destination, self.now)
    }

    fn predictability_snapshot(&self) -> Vec<(SimId, f64)> {
        self.node.router.predictability_snapshot(self.now)
    }

    fn is_blacklisted(&self, message: &MessageId) -> bool {
        self.node.blacklist.contains(message)
    }

    fn has_message(&self, message: &MessageId) -> bool {
        self.node.has_message(message)
    }
}
