//! # Porter Routing
//!
//! Forwarding-decision policy for a store-carry-forward DTN simulation.
//!
//! Nodes meet opportunistically; on every contact and every simulated tick
//! this policy decides which carried messages to offer to which newly-met
//! neighbor, how many replicas of each message remain, and which message
//! to evict first under buffer pressure. It blends probabilistic-routing
//! delivery prediction with binary spray-and-wait replica control,
//! weighted by energy, connection overlap and queue pressure.
//!
//! Event scheduling, mobility, energy depletion, connection management and
//! buffer storage all belong to the host simulation; the policy reaches
//! them through the collaborator traits in [`host`].
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use porter_routing::{RouterConfig, UtilityRouter};
//!
//! let config = RouterConfig::new(30.0, 8); // secondsInTimeUnit, copies
//! let router = UtilityRouter::new(node_id, config);
//!
//! // host wiring:
//! router.on_connection_up(&peer_view, clock.now());   // per contact
//! let outcome = router.tick(&mut tick_host)?;         // per tick
//! ```
//!
//! ## Architecture
//!
//! - [`predictability`]: per-neighbor delivery predictability with
//!   encounter updates, transitivity and lazy aging
//! - [`utility`]: the energy / overlap / mobility neighbor score
//! - [`replica`]: binary spray-and-wait copy accounting
//! - [`router`]: the per-tick forwarding selector
//! - [`evict`]: buffer-eviction prioritization, independent of the rest
//! - [`host`]: the collaborator contract the simulation host implements
//! - [`identity`], [`error`]: node handles and policy errors

pub mod error;
pub mod evict;
pub mod host;
pub mod identity;
pub mod predictability;
pub mod replica;
pub mod router;
pub mod utility;

// Re-export main types
pub use error::{RouterError, RouterResult};
pub use evict::{EvictionPolicy, MAX_DROP};
pub use host::{
    Clock, EvictionHost, MessageId, MessageMeta, PeerView, Point, SimTime, TickHost,
    TransferVerdict,
};
pub use identity::{NodeId, SimId};
pub use predictability::{I_TYP, P_ENC_MAX, PredictabilityStore};
pub use replica::{REPLICA_PROPERTY, ReplicaController, ReplicaMessage};
pub use router::{FILTER_THRESHOLD, OVERLAP_CUTOFF, TickOutcome, UtilityRouter};

use serde::{Deserialize, Serialize};

/// Configuration for the utility router
///
/// `seconds_in_time_unit` and `initial_copies` have no sensible universal
/// defaults and must be tuned per scenario; beta and gamma carry the
/// standard probabilistic-routing defaults. The protocol's fixed
/// thresholds (P_MAX, I_TYP, filter threshold, overlap cutoff, MAX_DROP)
/// are not exposed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// How many seconds one time unit is when aging delivery predictions
    pub seconds_in_time_unit: f64,
    /// Number of replicas a message starts with
    pub initial_copies: u32,
    /// Transitivity scaling constant
    pub beta: f64,
    /// Predictability aging constant
    pub gamma: f64,
}

/// Default transitivity scaling constant.
pub const DEFAULT_BETA: f64 = 0.25;
/// Default predictability aging constant.
pub const DEFAULT_GAMMA: f64 = 0.98;

impl RouterConfig {
    /// Create a config from the two required settings
    pub fn new(seconds_in_time_unit: f64, initial_copies: u32) -> Self {
        Self {
            seconds_in_time_unit,
            initial_copies,
            beta: DEFAULT_BETA,
            gamma: DEFAULT_GAMMA,
        }
    }

    /// Override the transitivity constant
    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    /// Override the aging constant
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Validate configuration invariants
    ///
    /// Returns a list of warnings; an empty list means the configuration
    /// is valid.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.seconds_in_time_unit <= 0.0 {
            warnings.push(ConfigWarning::NonPositiveTimeUnit);
        }
        if self.initial_copies == 0 {
            warnings.push(ConfigWarning::ZeroInitialCopies);
        }
        if !(0.0..=1.0).contains(&self.beta) {
            warnings.push(ConfigWarning::BetaOutOfRange);
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            warnings.push(ConfigWarning::GammaOutOfRange);
        }

        warnings
    }

    /// Check if the configuration is valid (no warnings)
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

/// Configuration warnings and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Time unit must be a positive number of seconds
    NonPositiveTimeUnit,
    /// A message with zero copies can never be carried
    ZeroInitialCopies,
    /// Transitivity constant outside [0, 1]
    BetaOutOfRange,
    /// Aging constant outside [0, 1]
    GammaOutOfRange,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::NonPositiveTimeUnit => {
                write!(f, "seconds_in_time_unit must be positive")
            }
            ConfigWarning::ZeroInitialCopies => {
                write!(f, "initial_copies must be at least 1")
            }
            ConfigWarning::BetaOutOfRange => write!(f, "beta must be within [0, 1]"),
            ConfigWarning::GammaOutOfRange => write!(f, "gamma must be within [0, 1]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RouterConfig::new(30.0, 8);
        assert_eq!(config.beta, 0.25);
        assert_eq!(config.gamma, 0.98);
        assert!(config.is_valid());
    }

    #[test]
    fn test_config_overrides() {
        let config = RouterConfig::new(30.0, 8).with_beta(0.5).with_gamma(0.9);
        assert_eq!(config.beta, 0.5);
        assert_eq!(config.gamma, 0.9);
        assert!(config.is_valid());
    }

    #[test]
    fn test_invalid_config_detected() {
        let config = RouterConfig::new(0.0, 0).with_beta(1.5).with_gamma(-0.1);
        let warnings = config.validate();
        assert!(warnings.contains(&ConfigWarning::NonPositiveTimeUnit));
        assert!(warnings.contains(&ConfigWarning::ZeroInitialCopies));
        assert!(warnings.contains(&ConfigWarning::BetaOutOfRange));
        assert!(warnings.contains(&ConfigWarning::GammaOutOfRange));
        assert!(!config.is_valid());
    }
}
