//! Routing-policy error types

use thiserror::Error;

use crate::host::MessageId;

/// Errors that can occur in the forwarding policy
///
/// Both variants are invariant violations, not recoverable conditions:
/// the protocol assumes a homogeneous deployment and that every carried
/// message went through this policy's creation path. Hosts should treat
/// them as fatal.
#[derive(Debug, Error)]
pub enum RouterError {
    /// A connected peer is not running this forwarding protocol
    #[error("peer {peer} is not running the utility forwarding protocol")]
    ProtocolMismatch { peer: String },

    /// A carried message has no replica-count property
    ///
    /// Silently assuming a count here would corrupt spray-and-wait
    /// accounting, so the missing property is surfaced instead.
    #[error("message {id} has no replica-count property")]
    MissingReplicaCount { id: MessageId },
}

/// Result type for routing operations
pub type RouterResult<T> = Result<T, RouterError>;
