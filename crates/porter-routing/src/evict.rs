//! Buffer-eviction prioritization
//!
//! When the buffer must free space, each carried message gets a discard
//! priority in [0, 1], higher meaning "drop sooner", from three penalties:
//!
//! - **TTL**: fraction of the time budget already spent.
//! - **Position**: fraction of the geometric journey not yet covered,
//!   capped at 1 when the carrier has drifted farther from the destination
//!   than the origin was.
//! - **Size**: fraction of the buffer the message occupies.
//!
//! Taking the *minimum* of the TTL and position penalties means a message
//! is only judged doomed when both its time budget and its spatial
//! progress are poor; a small-TTL message that is already near its
//! destination is spared.
//!
//! This policy is independent of the forwarding path and shares no state
//! with it.

use tracing::debug;

use crate::host::{EvictionHost, MessageId, MessageMeta};
use crate::identity::NodeId;

/// Discard priority above which a message is dropped without further scanning.
pub const MAX_DROP: f64 = 0.7;

/// Weight of the min(TTL, position) term.
const SCHEDULE_WEIGHT: f64 = 0.65;
/// Weight of the size term.
const SIZE_WEIGHT: f64 = 0.35;

/// Ranks buffered messages for eviction under buffer pressure
#[derive(Debug, Clone, Default)]
pub struct EvictionPolicy;

impl EvictionPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Discard priority for one message, higher meaning "drop sooner"
    pub fn discard_priority<I: NodeId>(
        &self,
        message: &MessageMeta<I>,
        host: &dyn EvictionHost<I>,
    ) -> f64 {
        let ttl_penalty = 1.0 - message.remaining_ttl / message.initial_ttl;

        let dest = host.location_of(&message.destination);
        let to_go = host.self_location().distance_to(&dest);
        let journey = host.location_of(&message.origin).distance_to(&dest);
        let position_penalty = if to_go == 0.0 {
            0.0
        } else if journey == 0.0 {
            1.0
        } else {
            (to_go / journey).min(1.0)
        };

        let size_penalty = message.size as f64 / host.buffer_capacity() as f64;

        ttl_penalty.min(position_penalty) * SCHEDULE_WEIGHT + size_penalty * SIZE_WEIGHT
    }

    /// Pick the message to evict first, or `None` if nothing qualifies
    ///
    /// Scans the candidates tracking the worst one seen; any candidate
    /// whose priority exceeds [`MAX_DROP`] is returned immediately without
    /// finishing the scan. With `exclude_in_flight`, messages the node is
    /// currently sending are skipped. An empty or fully excluded set
    /// yields `None`, which the caller must handle (e.g. by rejecting an
    /// incoming message); it is not an error.
    pub fn select_victim<I: NodeId>(
        &self,
        candidates: &[MessageMeta<I>],
        exclude_in_flight: bool,
        host: &dyn EvictionHost<I>,
    ) -> Option<MessageId> {
        let mut worst: Option<&MessageMeta<I>> = None;
        let mut worst_priority = 0.0;

        for message in candidates {
            if exclude_in_flight && host.is_sending(&message.id) {
                continue;
            }

            let priority = self.discard_priority(message, host);
            if priority > MAX_DROP {
                debug!(message = %message.id, priority, "eviction threshold exceeded");
                return Some(message.id.clone());
            }
            if worst.is_none() || priority > worst_priority {
                worst = Some(message);
                worst_priority = priority;
            }
        }

        worst.map(|m| {
            debug!(message = %m.id, priority = worst_priority, "eviction victim selected");
            m.id.clone()
        })
    }
}
