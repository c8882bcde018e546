//! The simulated network
//!
//! [`SimWorld`] owns the clock, the nodes and the active links, and drives
//! the routing policy: link establishment feeds `on_connection_up` on both
//! endpoints, and each step ticks every node's forwarding selector in id
//! order. Transfers are instantaneous; a node that took part in one is
//! treated as occupied for the rest of the step, so later ticks in the
//! same step see it as busy.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use porter_routing::{
    Clock, EvictionHost, MessageId, MessageMeta, PeerView, Point, RouterConfig, RouterResult,
    SimId, SimTime, TickHost, TickOutcome, TransferVerdict,
};

use crate::message::SimMessage;
use crate::node::{NodeView, SimNode};

/// A successful end-to-end delivery
#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    pub message: MessageId,
    pub origin: SimId,
    pub destination: SimId,
    /// Simulated time of delivery
    pub at: SimTime,
}

/// Counters accumulated over a run
#[derive(Debug, Default, Clone)]
pub struct WorldStats {
    /// Messages created by scenario code
    pub created: usize,
    /// Relay transfers that completed
    pub relayed: usize,
    /// Messages evicted under buffer pressure
    pub dropped: usize,
    /// Incoming transfers the receiver could not make room for
    pub aborted: usize,
    /// Messages removed because their lifetime ran out
    pub expired: usize,
    /// End-to-end deliveries, in order of occurrence
    pub delivered: Vec<DeliveryRecord>,
}

impl WorldStats {
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }
}

/// A transfer the selector started during a tick, applied after it
struct TransferOp {
    message: MessageId,
    from: SimId,
    to: SimId,
}

/// The simulated network: clock, nodes, links and run statistics
pub struct SimWorld {
    now: SimTime,
    nodes: HashMap<SimId, SimNode>,
    links: Vec<(SimId, SimId)>,
    stats: WorldStats,
}

impl Clock for SimWorld {
    fn now(&self) -> SimTime {
        self.now
    }
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    pub fn new() -> Self {
        Self {
            now: 0.0,
            nodes: HashMap::new(),
            links: Vec::new(),
            stats: WorldStats::default(),
        }
    }

    /// Add a node at a location, running the given router configuration
    pub fn add_node(&mut self, id: SimId, location: Point, config: RouterConfig) -> &mut SimNode {
        self.nodes
            .entry(id)
            .or_insert_with(|| SimNode::new(id, location, config))
    }

    pub fn node(&self, id: &SimId) -> Option<&SimNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &SimId) -> Option<&mut SimNode> {
        self.nodes.get_mut(id)
    }

    pub fn stats(&self) -> &WorldStats {
        &self.stats
    }

    /// Advance the simulated clock
    pub fn advance(&mut self, dt: f64) {
        self.now += dt;
    }

    /// Create a message at its origin node and hand it to the policy
    pub fn create_message(
        &mut self,
        id: impl Into<MessageId>,
        origin: SimId,
        destination: SimId,
        size: u64,
        ttl: f64,
    ) -> Result<()> {
        let now = self.now;
        let node = self
            .nodes
            .get_mut(&origin)
            .with_context(|| format!("unknown origin node {origin}"))?;
        let mut message = SimMessage::new(id, origin, destination, size, now, ttl);
        node.router.on_create_message(&mut message);
        if message.size > node.buffer_free() {
            bail!("origin {origin} has no room for {}", message.id);
        }
        node.buffer.push(message);
        self.stats.created += 1;
        Ok(())
    }

    fn linked(&self, a: &SimId, b: &SimId) -> bool {
        self.links
            .iter()
            .any(|(x, y)| (x == a && y == b) || (x == b && y == a))
    }

    /// Identities at the far end of a node's active links, in link order
    pub fn connections_of(&self, id: &SimId) -> Vec<SimId> {
        self.links
            .iter()
            .filter_map(|(x, y)| {
                if x == id {
                    Some(*y)
                } else if y == id {
                    Some(*x)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Bring a link up and run the encounter protocol on both endpoints
    ///
    /// The second endpoint sees the first one's already-updated table, as
    /// it would in a real handshake.
    pub fn connect(&mut self, a: SimId, b: SimId) {
        if a == b || self.linked(&a, &b) {
            return;
        }
        if !self.nodes.contains_key(&a) || !self.nodes.contains_key(&b) {
            warn!(%a, %b, "connect ignored: unknown endpoint");
            return;
        }
        self.links.push((a, b));
        debug!(%a, %b, now = self.now, "link up");

        let now = self.now;
        let node_a = &self.nodes[&a];
        let node_b = &self.nodes[&b];
        let view_b = NodeView {
            node: node_b,
            now,
            connections: self.connections_of(&b),
            transferring: false,
        };
        node_a.router.on_connection_up(&view_b, now);
        let view_a = NodeView {
            node: node_a,
            now,
            connections: self.connections_of(&a),
            transferring: false,
        };
        node_b.router.on_connection_up(&view_a, now);
    }

    /// Tear a link down
    pub fn disconnect(&mut self, a: SimId, b: SimId) {
        self.links
            .retain(|(x, y)| !((x == &a && y == &b) || (x == &b && y == &a)));
        debug!(%a, %b, now = self.now, "link down");
    }

    /// Tick every node's selector once, in id order, applying transfers
    /// as they complete
    pub fn step(&mut self) -> Result<Vec<(SimId, TickOutcome<SimId>)>> {
        self.expire_messages();

        let mut ids: Vec<SimId> = self.nodes.keys().copied().collect();
        ids.sort();

        let mut busy: HashSet<SimId> = HashSet::new();
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            let (outcome, ops) = self
                .tick_node(&id, &busy)
                .with_context(|| format!("tick failed on node {id}"))?;
            for op in &ops {
                busy.insert(op.from);
                busy.insert(op.to);
            }
            for op in ops {
                self.apply_transfer(op)?;
            }
            outcomes.push((id, outcome));
        }
        Ok(outcomes)
    }

    /// Advance the clock and step, `steps` times
    pub fn run(&mut self, steps: usize, dt: f64) -> Result<()> {
        for _ in 0..steps {
            self.advance(dt);
            self.step()?;
        }
        Ok(())
    }

    fn expire_messages(&mut self) {
        let now = self.now;
        for node in self.nodes.values_mut() {
            let before = node.buffer.len();
            node.buffer.retain(|m| !m.is_expired(now));
            self.stats.expired += before - node.buffer.len();
        }
    }

    fn tick_node(
        &self,
        id: &SimId,
        busy: &HashSet<SimId>,
    ) -> RouterResult<(TickOutcome<SimId>, Vec<TransferOp>)> {
        let node = &self.nodes[id];
        let connections = self.connections_of(id);
        let mut peers: HashMap<SimId, NodeView<'_>> = HashMap::new();
        for peer_id in &connections {
            if let Some(peer) = self.nodes.get(peer_id) {
                peers.insert(
                    *peer_id,
                    NodeView {
                        node: peer,
                        now: self.now,
                        connections: self.connections_of(peer_id),
                        transferring: busy.contains(peer_id),
                    },
                );
            }
        }
        let mut host = WorldTickHost {
            now: self.now,
            node,
            connections,
            peers,
            transferring: busy.contains(id),
            ops: Vec::new(),
        };
        let outcome = node.router.tick(&mut host)?;
        Ok((outcome, host.ops))
    }

    /// Complete a transfer the selector started
    ///
    /// Delivery to the final recipient consumes the message at the sender.
    /// A relay clones it: the receiver stores its half of the copies and
    /// the sender keeps the other half.
    fn apply_transfer(&mut self, op: TransferOp) -> Result<()> {
        let Some(sender) = self.nodes.get(&op.from) else {
            return Ok(());
        };
        let Some(message) = sender.message(&op.message) else {
            return Ok(());
        };

        if message.destination == op.to {
            let sender = self.nodes.get_mut(&op.from).expect("sender exists");
            let message = sender.remove_message(&op.message).expect("message exists");
            info!(
                message = %message.id,
                from = %op.from,
                to = %op.to,
                at = self.now,
                "message delivered"
            );
            self.stats.delivered.push(DeliveryRecord {
                message: message.id,
                origin: message.origin,
                destination: op.to,
                at: self.now,
            });
            return Ok(());
        }

        let mut copy = message.clone();

        // Receiver side: split the replica count, then make room.
        let locations: HashMap<SimId, Point> =
            self.nodes.iter().map(|(id, n)| (*id, n.location)).collect();
        let now = self.now;
        let receiver = self.nodes.get_mut(&op.to).expect("receiver exists");
        receiver.router.on_message_received(&mut copy)?;

        let mut admitted = true;
        while receiver.buffer_free() < copy.size {
            let metas: Vec<MessageMeta<SimId>> =
                receiver.buffer.iter().map(|m| m.meta(now)).collect();
            let view = LocationView {
                location: receiver.location,
                capacity: receiver.buffer_capacity,
                locations: &locations,
            };
            match receiver.router.select_victim(&metas, true, &view) {
                Some(victim) => {
                    receiver.remove_message(&victim);
                    self.stats.dropped += 1;
                    debug!(message = %victim, node = %op.to, "evicted under buffer pressure");
                }
                None => {
                    admitted = false;
                    break;
                }
            }
        }
        if admitted {
            receiver.buffer.push(copy);
            self.stats.relayed += 1;
        } else {
            self.stats.aborted += 1;
            warn!(message = %op.message, node = %op.to, "incoming transfer aborted: no room");
        }

        // Sender side: the transfer completed either way.
        let sender = self.nodes.get_mut(&op.from).expect("sender exists");
        if let Some(index) = sender.buffer.iter().position(|m| m.id == op.message) {
            sender
                .router
                .on_transfer_done(Some(&mut sender.buffer[index]))?;
        }
        Ok(())
    }
}

/// One node's host view for a single selector tick
///
/// Transfers are not applied here; `start_transfer` validates the
/// receiving side and records the op for the world to apply after the
/// tick returns.
struct WorldTickHost<'a> {
    now: SimTime,
    node: &'a SimNode,
    connections: Vec<SimId>,
    peers: HashMap<SimId, NodeView<'a>>,
    transferring: bool,
    ops: Vec<TransferOp>,
}

impl TickHost<SimId> for WorldTickHost<'_> {
    fn now(&self) -> SimTime {
        self.now
    }

    fn self_energy(&self) -> f64 {
        self.node.energy
    }

    fn connections(&self) -> Vec<SimId> {
        self.connections.clone()
    }

    fn peer(&self, id: &SimId) -> Option<&dyn PeerView<SimId>> {
        self.peers.get(id).map(|v| v as &dyn PeerView<SimId>)
    }

    fn is_transferring(&self) -> bool {
        self.transferring
    }

    fn can_start_transfer(&self) -> bool {
        self.node.energy > 0.0
    }

    fn carried_messages(&self) -> Vec<MessageMeta<SimId>> {
        self.node.buffer.iter().map(|m| m.meta(self.now)).collect()
    }

    fn replica_count(&self, message: &MessageId) -> Option<u32> {
        self.node
            .message(message)
            .and_then(|m| m.property(porter_routing::REPLICA_PROPERTY))
    }

    /// FIFO: the message that has been in the network longest goes first
    fn queue_order(&self, a: &MessageMeta<SimId>, b: &MessageMeta<SimId>) -> Ordering {
        let age_a = a.initial_ttl - a.remaining_ttl;
        let age_b = b.initial_ttl - b.remaining_ttl;
        age_b
            .partial_cmp(&age_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    }

    fn start_transfer(&mut self, message: &MessageId, peer: &SimId) -> TransferVerdict {
        let Some(view) = self.peers.get(peer) else {
            return TransferVerdict::Rejected;
        };
        if view.transferring || self.ops.iter().any(|op| &op.to == peer) {
            return TransferVerdict::Busy;
        }
        let Some(msg) = self.node.message(message) else {
            return TransferVerdict::Rejected;
        };
        if view.node.blacklist.contains(message)
            || view.node.has_message(message)
            || msg.size > view.node.buffer_capacity
        {
            return TransferVerdict::Rejected;
        }
        self.ops.push(TransferOp {
            message: message.clone(),
            from: self.node.id,
            to: *peer,
        });
        TransferVerdict::Started
    }
}

/// Location and buffer facts for victim selection at one node
struct LocationView<'a> {
    location: Point,
    capacity: u64,
    locations: &'a HashMap<SimId, Point>,
}

impl EvictionHost<SimId> for LocationView<'_> {
    fn self_location(&self) -> Point {
        self.location
    }

    fn location_of(&self, node: &SimId) -> Point {
        self.locations.get(node).copied().unwrap_or_default()
    }

    fn buffer_capacity(&self) -> u64 {
        self.capacity
    }

    // Applied transfers never leave a message mid-send.
    fn is_sending(&self, _message: &MessageId) -> bool {
        false
    }
}
