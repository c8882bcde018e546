//! Delivery-predictability store
//!
//! Per-neighbor delivery predictability derived from encounter history,
//! with the three classic update mechanisms:
//!
//! - **Encounter updates**: meeting a node raises the predictability for
//!   it, scaled down when the meetings come unusually close together.
//! - **Transitivity**: a peer's own predictabilities propagate, damped by
//!   beta and bounded so they never displace a higher direct observation.
//! - **Aging**: values decay by `gamma^k` between updates, applied lazily
//!   before every read so the decay can never be skipped.
//!
//! The maps live behind `RwLock` so a peer's snapshot read during
//! transitive propagation or scoring works through `&self`; within a tick
//! the host guarantees no concurrent mutation.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::RouterConfig;
use crate::host::SimTime;
use crate::identity::NodeId;

/// Max delivery predictability initialization constant.
pub const P_ENC_MAX: f64 = 0.75;
/// Typical interconnection time in simulated seconds.
pub const I_TYP: f64 = 1800.0;

/// Delivery-predictability state for one node
///
/// Owned exclusively by that node's router instance; other nodes reach it
/// only through read-only snapshot accessors.
pub struct PredictabilityStore<I: NodeId> {
    /// This node's identity (never tracked as a destination)
    local: I,
    /// Delivery predictability per known destination
    preds: RwLock<HashMap<I, f64>>,
    /// Simulated timestamp of the last connection-up per neighbor
    last_encounter: RwLock<HashMap<I, SimTime>>,
    /// Last time aging was applied
    last_age_update: RwLock<SimTime>,
    /// Seconds per aging time unit
    seconds_in_time_unit: f64,
    /// Transitivity scaling constant
    beta: f64,
    /// Aging constant
    gamma: f64,
}

impl<I: NodeId> PredictabilityStore<I> {
    /// Create an empty store for a node
    pub fn new(local: I, config: &RouterConfig) -> Self {
        Self {
            local,
            preds: RwLock::new(HashMap::new()),
            last_encounter: RwLock::new(HashMap::new()),
            last_age_update: RwLock::new(0.0),
            seconds_in_time_unit: config.seconds_in_time_unit,
            beta: config.beta,
            gamma: config.gamma,
        }
    }

    /// Record a connection-up event with a neighbor
    ///
    /// Applies `P = P_old + (1 - P_old) * pinit`, where `pinit` is
    /// `P_ENC_MAX` for a first or well-spaced encounter and scales down
    /// linearly for encounters closer together than [`I_TYP`]. The
    /// encounter timestamp is recorded afterwards.
    pub fn on_encounter(&self, neighbor: &I, now: SimTime) {
        if neighbor == &self.local {
            return;
        }

        let pinit = match self.last_encounter_with(neighbor) {
            Some(last) if now - last < I_TYP => P_ENC_MAX * ((now - last) / I_TYP),
            _ => P_ENC_MAX,
        };

        let old = self.get(neighbor, now);
        let new = old + (1.0 - old) * pinit;
        self.preds.write().unwrap().insert(neighbor.clone(), new);
        self.last_encounter
            .write()
            .unwrap()
            .insert(neighbor.clone(), now);

        tracing::trace!(
            neighbor = %neighbor.short_id(),
            pinit,
            predictability = new,
            "encounter recorded"
        );
    }

    /// Apply transitive (A->B->C) predictability updates
    ///
    /// For every destination `c` the neighbor knows, takes
    /// `max(P(a,c), P(a,b) * P(b,c) * beta)`. Never decreases an existing
    /// value and never tracks this node itself.
    pub fn propagate_transitive(
        &self,
        neighbor: &I,
        neighbor_preds: &[(I, f64)],
        now: SimTime,
    ) {
        let p_for_neighbor = self.get(neighbor, now);

        let mut preds = self.preds.write().unwrap();
        for (dest, p_via) in neighbor_preds {
            if dest == &self.local {
                continue;
            }

            let p_old = preds.get(dest).copied().unwrap_or(0.0);
            let p_new = p_for_neighbor * p_via * self.beta;
            if p_new > p_old {
                preds.insert(dest.clone(), p_new);
            }
        }
    }

    /// Current predictability for a destination, 0 if unknown
    ///
    /// Ages the whole table first so reads always see decayed values.
    pub fn get(&self, destination: &I, now: SimTime) -> f64 {
        self.age(now);
        self.preds
            .read()
            .unwrap()
            .get(destination)
            .copied()
            .unwrap_or(0.0)
    }

    /// All known destinations with their (aged) predictabilities
    pub fn snapshot(&self, now: SimTime) -> Vec<(I, f64)> {
        self.age(now);
        self.preds
            .read()
            .unwrap()
            .iter()
            .map(|(id, p)| (id.clone(), *p))
            .collect()
    }

    /// Timestamp of the most recent encounter with a neighbor
    pub fn last_encounter_with(&self, neighbor: &I) -> Option<SimTime> {
        self.last_encounter.read().unwrap().get(neighbor).copied()
    }

    /// Number of destinations with a stored predictability
    pub fn known_destinations(&self) -> usize {
        self.preds.read().unwrap().len()
    }

    /// Age every entry by `gamma^k`
    ///
    /// `k` is the (fractional) number of time units elapsed since the
    /// last aging pass; zero elapsed time is a no-op.
    fn age(&self, now: SimTime) {
        let mut last = self.last_age_update.write().unwrap();
        let k = (now - *last) / self.seconds_in_time_unit;
        if k == 0.0 {
            return;
        }

        let mult = self.gamma.powf(k);
        for value in self.preds.write().unwrap().values_mut() {
            *value *= mult;
        }
        *last = now;
    }
}
