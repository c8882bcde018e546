//! Simulated messages with generic property storage
//!
//! The host's message object is deliberately dumb: routing-specific state
//! like the replica count lives in a string-keyed property map, which is
//! what lets the policy persist its bookkeeping on messages it does not
//! own. TTL is derived from creation time against the simulated clock.

use std::collections::HashMap;

use porter_routing::{MessageId, MessageMeta, ReplicaMessage, SimId, SimTime};

/// A message carried through the simulated network
#[derive(Debug, Clone)]
pub struct SimMessage {
    /// Message identifier
    pub id: MessageId,
    /// Node that created the message
    pub origin: SimId,
    /// Final recipient
    pub destination: SimId,
    /// Payload size in bytes
    pub size: u64,
    /// Simulated creation time
    pub created_at: SimTime,
    /// Lifetime in simulated seconds
    pub initial_ttl: f64,
    /// Generic per-message property storage
    properties: HashMap<String, u32>,
}

impl SimMessage {
    /// Create a new message at the given simulated time
    pub fn new(
        id: impl Into<MessageId>,
        origin: SimId,
        destination: SimId,
        size: u64,
        created_at: SimTime,
        initial_ttl: f64,
    ) -> Self {
        Self {
            id: id.into(),
            origin,
            destination,
            size,
            created_at,
            initial_ttl,
            properties: HashMap::new(),
        }
    }

    /// Remaining time-to-live at the given simulated time
    pub fn remaining_ttl(&self, now: SimTime) -> f64 {
        (self.created_at + self.initial_ttl - now).max(0.0)
    }

    /// Whether the message's lifetime has run out
    pub fn is_expired(&self, now: SimTime) -> bool {
        self.remaining_ttl(now) == 0.0
    }

    /// Read a stored property
    pub fn property(&self, key: &str) -> Option<u32> {
        self.properties.get(key).copied()
    }

    /// Store or overwrite a property
    pub fn set_property(&mut self, key: &str, value: u32) {
        self.properties.insert(key.to_owned(), value);
    }

    /// The metadata snapshot the policy consumes
    pub fn meta(&self, now: SimTime) -> MessageMeta<SimId> {
        MessageMeta {
            id: self.id.clone(),
            origin: self.origin,
            destination: self.destination,
            size: self.size,
            remaining_ttl: self.remaining_ttl(now),
            initial_ttl: self.initial_ttl,
        }
    }
}

impl ReplicaMessage for SimMessage {
    fn id(&self) -> &MessageId {
        &self.id
    }

    fn replica_count(&self) -> Option<u32> {
        self.property(porter_routing::REPLICA_PROPERTY)
    }

    fn set_replica_count(&mut self, count: u32) {
        self.set_property(porter_routing::REPLICA_PROPERTY, count);
    }
}
