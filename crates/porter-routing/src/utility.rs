//! Neighbor utility scoring
//!
//! Combines three credits into a single per-neighbor-per-message utility
//! in [0, 1]:
//!
//! - **Energy**: a better-resourced peer is more trustworthy as a carrier,
//!   but meeting one is not required, so a weaker peer still gets half
//!   credit.
//! - **Overlap**: two carriers whose contact sets overlap heavily will
//!   likely reach the same destinations, so replicating to the other adds
//!   little; low overlap earns full credit. This is the soft counterpart
//!   of the hard overlap cutoff applied by the forwarding selector.
//! - **Mobility**: the peer's delivery predictability toward the message's
//!   destination.
//!
//! Location/overlap dominates the weighting, mobility prediction comes
//! second, energy is a minor tiebreak. Scores are cached per neighbor in
//! a map that lives only for the tick that produced it; buffer and energy
//! changes between ticks invalidate them.

use std::hash::Hash;

/// Weight of the energy credit in the combined utility.
pub const ENERGY_WEIGHT: f64 = 0.20;
/// Weight of the overlap credit in the combined utility.
pub const OVERLAP_WEIGHT: f64 = 0.55;
/// Weight of the mobility credit in the combined utility.
pub const MOBILITY_WEIGHT: f64 = 0.25;

/// Energy credit for a candidate carrier
///
/// Full credit when the other node has at least as much energy as this
/// one, half credit otherwise (equal energies favor the other node).
pub fn energy_credit(self_energy: f64, other_energy: f64) -> f64 {
    if other_energy >= self_energy { 1.0 } else { 0.5 }
}

/// Fraction of this node's current connections also held by the other node
///
/// A node with no current connections has nothing to overlap with, so the
/// fraction is defined as 0 rather than dividing by zero.
pub fn overlap_fraction<I: Eq + Hash>(own_connections: &[I], other_connections: &[I]) -> f64 {
    if own_connections.is_empty() {
        return 0.0;
    }

    let shared = own_connections
        .iter()
        .filter(|c| other_connections.contains(c))
        .count();
    shared as f64 / own_connections.len() as f64
}

/// Combine the three credits with the fixed weights
pub fn combined_utility(energy_credit: f64, overlap_fraction: f64, mobility_credit: f64) -> f64 {
    ENERGY_WEIGHT * energy_credit
        + OVERLAP_WEIGHT * (1.0 - overlap_fraction)
        + MOBILITY_WEIGHT * mobility_credit
}

/// Score a neighbor as a carrier for a message
///
/// `mobility_credit` is the neighbor's current delivery predictability
/// toward the message's destination.
pub fn score_neighbor<I: Eq + Hash>(
    self_energy: f64,
    own_connections: &[I],
    other_energy: f64,
    other_connections: &[I],
    mobility_credit: f64,
) -> f64 {
    combined_utility(
        energy_credit(self_energy, other_energy),
        overlap_fraction(own_connections, other_connections),
        mobility_credit,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SimId;

    fn ids(chars: &str) -> Vec<SimId> {
        chars.chars().filter_map(SimId::new).collect()
    }

    #[test]
    fn test_energy_credit_boundary() {
        assert_eq!(energy_credit(100.0, 50.0), 0.5);
        assert_eq!(energy_credit(50.0, 100.0), 1.0);
        // Equal energies: the other node gets full credit.
        assert_eq!(energy_credit(75.0, 75.0), 1.0);
    }

    #[test]
    fn test_energy_credit_flips_when_swapped() {
        let (a, b) = (60.0, 40.0);
        assert_eq!(energy_credit(a, b), 0.5);
        assert_eq!(energy_credit(b, a), 1.0);
    }

    #[test]
    fn test_overlap_fraction() {
        assert_eq!(overlap_fraction(&ids("BCD"), &ids("CDE")), 2.0 / 3.0);
        assert_eq!(overlap_fraction(&ids("BC"), &ids("DE")), 0.0);
        assert_eq!(overlap_fraction(&ids("BC"), &ids("BC")), 1.0);
    }

    #[test]
    fn test_overlap_with_no_own_connections_is_zero() {
        assert_eq!(overlap_fraction(&ids(""), &ids("BC")), 0.0);
    }

    #[test]
    fn test_combined_utility_range_and_weights() {
        // Best case: full energy, no overlap, perfect mobility.
        assert!((combined_utility(1.0, 0.0, 1.0) - 1.0).abs() < 1e-9);
        // Worst case: half energy, full overlap, no mobility.
        assert!((combined_utility(0.5, 1.0, 0.0) - 0.10).abs() < 1e-9);
        // Mixed case checks the 0.20/0.55/0.25 split.
        let u = combined_utility(1.0, 0.5, 0.4);
        assert!((u - (0.20 + 0.275 + 0.10)).abs() < 1e-9);
    }

    #[test]
    fn test_score_neighbor() {
        let own = ids("BC");
        let other = ids("CD");
        let u = score_neighbor(100.0, &own, 100.0, &other, 0.8);
        // energy 1.0, overlap 0.5, mobility 0.8
        assert!((u - (0.20 + 0.55 * 0.5 + 0.25 * 0.8)).abs() < 1e-9);
    }
}
