//! Binary spray-and-wait replica accounting
//!
//! Each message carries its remaining replica count in the host's generic
//! per-message property storage. On a completed transfer the receiving
//! side keeps `floor(n/2)` copies and the sender `ceil(n/2)`, so the total
//! never grows across a hop while both sides can keep spraying. A message
//! down to one copy is carried for direct delivery only.
//!
//! A carried message without the property did not go through this policy's
//! creation path; that is an invariant violation and is reported rather
//! than papered over with a default.

use crate::error::{RouterError, RouterResult};
use crate::host::MessageId;

/// Property key under which the replica count is stored on host messages.
pub const REPLICA_PROPERTY: &str = "porter.copies";

/// Host-message access the replica controller needs
///
/// Implemented by the host's message type over its property storage.
pub trait ReplicaMessage {
    /// The message's identifier
    fn id(&self) -> &MessageId;

    /// Stored replica count, if the property exists
    fn replica_count(&self) -> Option<u32>;

    /// Overwrite the stored replica count
    fn set_replica_count(&mut self, count: u32);
}

/// Tracks and halves replica counts across transfers
#[derive(Debug, Clone)]
pub struct ReplicaController {
    initial_copies: u32,
}

impl ReplicaController {
    /// Create a controller with the configured initial copy count
    pub fn new(initial_copies: u32) -> Self {
        Self { initial_copies }
    }

    /// The replica count assigned to newly created messages
    pub fn initial_copies(&self) -> u32 {
        self.initial_copies
    }

    /// Stamp a freshly created message with its initial replica count
    pub fn on_create<M: ReplicaMessage + ?Sized>(&self, message: &mut M) {
        message.set_replica_count(self.initial_copies);
    }

    /// Halve the count on the receiving side of a completed transfer
    ///
    /// The receiver keeps `floor(n/2)` copies. Returns the new count.
    pub fn on_receive<M: ReplicaMessage + ?Sized>(&self, message: &mut M) -> RouterResult<u32> {
        let copies = self.copies_of(message)?;
        let kept = copies / 2;
        message.set_replica_count(kept);
        Ok(kept)
    }

    /// Reduce the count on the sending side of a completed transfer
    ///
    /// The sender keeps `ceil(n/2)` copies. Returns the new count.
    pub fn on_send_completed<M: ReplicaMessage + ?Sized>(
        &self,
        message: &mut M,
    ) -> RouterResult<u32> {
        let copies = self.copies_of(message)?;
        let kept = copies.div_ceil(2);
        message.set_replica_count(kept);
        Ok(kept)
    }

    /// Whether the message may still be replicated (count > 1)
    pub fn has_copies_left<M: ReplicaMessage + ?Sized>(&self, message: &M) -> RouterResult<bool> {
        Ok(self.copies_of(message)? > 1)
    }

    fn copies_of<M: ReplicaMessage + ?Sized>(&self, message: &M) -> RouterResult<u32> {
        message
            .replica_count()
            .ok_or_else(|| RouterError::MissingReplicaCount {
                id: message.id().clone(),
            })
    }
}
