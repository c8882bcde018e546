//! Collaborator contract between the routing policy and the simulation host
//!
//! The policy owns nothing but its own per-node routing state. Everything
//! else (the clock, energy, locations, active links, message buffers and
//! the transfer machinery) belongs to the host and is reached through the
//! traits in this module.
//!
//! [`PeerView`] deserves a note: the protocol only works between nodes
//! running the same policy, and it needs read access to a peer's
//! predictability table, connections and energy during scoring. Instead of
//! a downcast-and-assert, the host guarantees every router exposes this
//! capability; a peer it cannot resolve is a fatal protocol mismatch.

use std::cmp::Ordering;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::identity::NodeId;

/// Simulated time in seconds.
pub type SimTime = f64;

/// Source of simulated time, owned by the host.
pub trait Clock {
    /// Current simulated time
    fn now(&self) -> SimTime;
}

/// 2D coordinate in the simulation plane
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Create a new point
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Identifier of a host-owned message
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Per-message facts the host exposes to the policy
///
/// A snapshot, not a handle: the policy reads these within one tick and
/// never holds them across ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "I: NodeId")]
pub struct MessageMeta<I: NodeId> {
    /// Message identifier
    pub id: MessageId,
    /// Node that created the message
    pub origin: I,
    /// Final recipient
    pub destination: I,
    /// Payload size in bytes
    pub size: u64,
    /// Remaining time-to-live in simulated seconds
    pub remaining_ttl: f64,
    /// Time-to-live the message started with
    pub initial_ttl: f64,
}

/// Outcome of asking the host to start a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferVerdict {
    /// The connection accepted the message; a transfer is now active
    Started,
    /// The receiving side declined (no room, duplicate, policy)
    Rejected,
    /// The connection is occupied by another transfer
    Busy,
}

/// Capability-restricted, read-only view of a same-protocol peer's router
///
/// A peer may be scored and queried through this view but never mutated.
/// All reads model a snapshot at the instant of the call; the host
/// guarantees no concurrent mutation within a tick.
pub trait PeerView<I: NodeId> {
    /// The peer's identity
    fn identity(&self) -> &I;

    /// The peer's current energy level
    fn energy(&self) -> f64;

    /// Whether the peer has any energy left
    fn has_energy(&self) -> bool;

    /// Identities at the far end of the peer's active links, in link order
    fn connected_neighbors(&self) -> Vec<I>;

    /// The peer's total buffer capacity in bytes
    fn buffer_capacity(&self) -> u64;

    /// Whether the peer is currently mid-transfer
    fn is_transferring(&self) -> bool;

    /// The peer's current (aged) delivery predictability toward a destination
    fn delivery_predictability(&self, destination: &I) -> f64;

    /// The peer's full predictability table, aged as of now
    fn predictability_snapshot(&self) -> Vec<(I, f64)>;

    /// Whether the peer refuses this message outright
    fn is_blacklisted(&self, message: &MessageId) -> bool;

    /// Whether the peer already carries this message
    fn has_message(&self, message: &MessageId) -> bool;
}

/// What one tick of the forwarding selector needs from the host
pub trait TickHost<I: NodeId> {
    /// Current simulated time
    fn now(&self) -> SimTime;

    /// This node's current energy level
    fn self_energy(&self) -> f64;

    /// Identities at the far end of this node's active links, in link order
    fn connections(&self) -> Vec<I>;

    /// Resolve a connected identity to its router view
    ///
    /// `None` means the peer is not running this protocol, which the
    /// selector treats as a fatal [`ProtocolMismatch`](crate::RouterError).
    fn peer(&self, id: &I) -> Option<&dyn PeerView<I>>;

    /// Whether this node is currently mid-transfer
    fn is_transferring(&self) -> bool;

    /// Whether this node is eligible to start a transfer at all
    fn can_start_transfer(&self) -> bool;

    /// Metadata for every message currently in the buffer
    fn carried_messages(&self) -> Vec<MessageMeta<I>>;

    /// Replica count stored on a carried message, if the property exists
    fn replica_count(&self, message: &MessageId) -> Option<u32>;

    /// The host's configured queue-mode order (FIFO, size-based, ...)
    fn queue_order(&self, a: &MessageMeta<I>, b: &MessageMeta<I>) -> Ordering;

    /// Ask the host to start transferring a message over a connection
    fn start_transfer(&mut self, message: &MessageId, peer: &I) -> TransferVerdict;
}

/// What victim selection needs from the host
pub trait EvictionHost<I: NodeId> {
    /// This node's current location
    fn self_location(&self) -> Point;

    /// Current location of any node in the simulation
    fn location_of(&self, node: &I) -> Point;

    /// This node's total buffer capacity in bytes
    fn buffer_capacity(&self) -> u64;

    /// Whether this node is currently sending the given message
    fn is_sending(&self, message: &MessageId) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_eq!(a.distance_to(&b), 5.0);
        assert_eq!(b.distance_to(&a), 5.0);
        assert_eq!(a.distance_to(&a), 0.0);
    }

    #[test]
    fn test_message_id_display() {
        let id = MessageId::new("M7");
        assert_eq!(id.to_string(), "M7");
        assert_eq!(id.as_str(), "M7");
    }
}
