//! Node identity abstractions
//!
//! The routing policy never owns or constructs node identities; the host
//! simulation supplies them and the policy uses them as opaque map keys.
//! [`NodeId`] abstracts over whatever handle the host uses, and [`SimId`]
//! is the simple char-based implementation used by the simulation and
//! the test suites.

use std::fmt::{Debug, Display};
use std::hash::Hash;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Trait for the opaque node handle supplied by the simulation host.
///
/// The same routing logic works with simulation identities (simple chars)
/// or anything richer the host cares to use, as long as it is cheap to
/// clone and usable as a map key.
pub trait NodeId:
    Clone + Eq + Hash + Send + Sync + Debug + Display + Serialize + DeserializeOwned + 'static
{
    /// Short display form for logging.
    fn short_id(&self) -> String {
        format!("{}", self)
    }
}

/// Simple character-based identity for simulation
///
/// Used by the simulation host and for testing. Maps to 'A'..'Z'.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimId(pub char);

impl SimId {
    /// Create a new simulation identity from a capital letter
    pub fn new(c: char) -> Option<Self> {
        if c.is_ascii_uppercase() { Some(Self(c)) } else { None }
    }

    /// Generate all identities from 'A' to the given letter (inclusive)
    pub fn range_to(end: char) -> Vec<Self> {
        ('A'..=end).filter_map(Self::new).collect()
    }

    /// Get the underlying character
    pub fn as_char(&self) -> char {
        self.0
    }
}

impl Display for SimId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl NodeId for SimId {
    fn short_id(&self) -> String {
        self.0.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_id_creation() {
        assert!(SimId::new('A').is_some());
        assert!(SimId::new('Z').is_some());
        assert!(SimId::new('a').is_none());
        assert!(SimId::new('1').is_none());
    }

    #[test]
    fn test_sim_id_range() {
        let ids = SimId::range_to('C');
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0].0, 'A');
        assert_eq!(ids[2].0, 'C');
    }

    #[test]
    fn test_short_id() {
        assert_eq!(SimId::new('M').unwrap().short_id(), "M");
    }
}
