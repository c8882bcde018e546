//! The utility router: encounter handling, replica callbacks, and the
//! per-tick forwarding selector
//!
//! One `UtilityRouter` instance exists per simulated node. Each tick moves
//! through Idle -> Deliver-direct -> Spray -> Done:
//!
//! 1. Nothing happens while a transfer is active or the node may not
//!    start one.
//! 2. Messages whose final recipient is a current connection are offered
//!    first; the tick ends on the first acceptance.
//! 3. Remaining messages with copies left are paired with every current
//!    connection, filtered, scored, ranked by the receiving side's
//!    utility (GRTRMax), and attempted in ranked order with at most one
//!    accepted transfer per connection. Whatever is left over is simply
//!    reconsidered next tick.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::RouterConfig;
use crate::error::{RouterError, RouterResult};
use crate::evict::EvictionPolicy;
use crate::host::{
    EvictionHost, MessageId, MessageMeta, PeerView, SimTime, TickHost, TransferVerdict,
};
use crate::identity::NodeId;
use crate::predictability::PredictabilityStore;
use crate::replica::{ReplicaController, ReplicaMessage};
use crate::utility;

/// Minimum combined utility for a (message, neighbor) pair to become a
/// transfer candidate.
pub const FILTER_THRESHOLD: f64 = 0.67;

/// Connection-overlap fraction above which a neighbor is skipped outright
/// as a redundant carrier. Hard cutoff, distinct from the soft overlap
/// credit inside the utility score.
pub const OVERLAP_CUTOFF: f64 = 0.7;

/// What a tick of the forwarding selector did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome<I: NodeId> {
    /// Mid-transfer or not eligible to start one
    Idle,
    /// A message was accepted by its final recipient
    DirectDelivery { destination: I },
    /// Spray candidates were attempted; `started` transfers began
    Sprayed { started: usize },
    /// Nothing eligible or nothing passed the filters this tick
    NoCandidates,
}

/// A (message, connection) pairing that passed the filters this tick
struct Candidate<I> {
    /// Index into the eligible-message list
    message: usize,
    /// The connection's far endpoint
    peer: I,
}

/// Forwarding-decision policy for one simulated node
///
/// Owns the node's predictability state and replica accounting; everything
/// else is reached through the host traits per call.
pub struct UtilityRouter<I: NodeId> {
    local: I,
    config: RouterConfig,
    preds: PredictabilityStore<I>,
    replicas: ReplicaController,
    eviction: EvictionPolicy,
}

impl<I: NodeId> UtilityRouter<I> {
    /// Create a router for a node
    pub fn new(local: I, config: RouterConfig) -> Self {
        let preds = PredictabilityStore::new(local.clone(), &config);
        let replicas = ReplicaController::new(config.initial_copies);
        Self {
            local,
            config,
            preds,
            replicas,
            eviction: EvictionPolicy::new(),
        }
    }

    /// This node's identity
    pub fn local_id(&self) -> &I {
        &self.local
    }

    /// The configuration the router was built with
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Handle a connection transitioning to "up"
    ///
    /// Updates the delivery predictability for the peer and folds in the
    /// peer's own predictabilities transitively.
    pub fn on_connection_up(&self, peer: &dyn PeerView<I>, now: SimTime) {
        self.preds.on_encounter(peer.identity(), now);
        let peer_preds = peer.predictability_snapshot();
        self.preds
            .propagate_transitive(peer.identity(), &peer_preds, now);
    }

    /// This node's current delivery predictability toward a destination
    ///
    /// Hosts expose this through their [`PeerView`] implementation.
    pub fn delivery_predictability(&self, destination: &I, now: SimTime) -> f64 {
        self.preds.get(destination, now)
    }

    /// This node's full predictability table, aged as of `now`
    pub fn predictability_snapshot(&self, now: SimTime) -> Vec<(I, f64)> {
        self.preds.snapshot(now)
    }

    /// Stamp a newly created message with the initial replica count
    pub fn on_create_message<M: ReplicaMessage + ?Sized>(&self, message: &mut M) {
        self.replicas.on_create(message);
    }

    /// Replica bookkeeping on the receiving side of a completed transfer
    pub fn on_message_received<M: ReplicaMessage + ?Sized>(
        &self,
        message: &mut M,
    ) -> RouterResult<u32> {
        self.replicas.on_receive(message)
    }

    /// Replica bookkeeping on the sending side of a completed transfer
    ///
    /// `None` means the message was evicted from the buffer after the
    /// transfer started; bookkeeping is silently skipped.
    pub fn on_transfer_done<M: ReplicaMessage + ?Sized>(
        &self,
        message: Option<&mut M>,
    ) -> RouterResult<Option<u32>> {
        match message {
            Some(m) => self.replicas.on_send_completed(m).map(Some),
            None => Ok(None),
        }
    }

    /// Whether a carried message may still be replicated
    pub fn has_copies_left<M: ReplicaMessage + ?Sized>(&self, message: &M) -> RouterResult<bool> {
        self.replicas.has_copies_left(message)
    }

    /// Discard priority of a buffered message (see [`EvictionPolicy`])
    pub fn discard_priority(
        &self,
        message: &MessageMeta<I>,
        host: &dyn EvictionHost<I>,
    ) -> f64 {
        self.eviction.discard_priority(message, host)
    }

    /// Pick the buffered message to evict first under buffer pressure
    pub fn select_victim(
        &self,
        candidates: &[MessageMeta<I>],
        exclude_in_flight: bool,
        host: &dyn EvictionHost<I>,
    ) -> Option<MessageId> {
        self.eviction.select_victim(candidates, exclude_in_flight, host)
    }

    /// Run one tick of the forwarding selector
    pub fn tick(&self, host: &mut dyn TickHost<I>) -> RouterResult<TickOutcome<I>> {
        if host.is_transferring() || !host.can_start_transfer() {
            return Ok(TickOutcome::Idle);
        }

        let connections = host.connections();
        if connections.is_empty() {
            return Ok(TickOutcome::NoCandidates);
        }

        let mut messages = host.carried_messages();
        messages.sort_by(|a, b| host.queue_order(a, b));

        // Deliver-direct: final recipients among current connections win
        // outright; the first acceptance ends the tick.
        for conn in &connections {
            for message in messages.iter().filter(|m| &m.destination == conn) {
                if host.start_transfer(&message.id, conn) == TransferVerdict::Started {
                    debug!(message = %message.id, to = %conn.short_id(), "direct delivery started");
                    return Ok(TickOutcome::DirectDelivery {
                        destination: conn.clone(),
                    });
                }
            }
        }

        // Spray phase: only messages with copies left to distribute.
        let mut eligible = Vec::new();
        for message in messages {
            let copies =
                host.replica_count(&message.id)
                    .ok_or_else(|| RouterError::MissingReplicaCount {
                        id: message.id.clone(),
                    })?;
            if copies > 1 {
                eligible.push(message);
            }
        }
        if eligible.is_empty() {
            return Ok(TickOutcome::NoCandidates);
        }

        let self_energy = host.self_energy();

        // Utility snapshot for this tick only; rebuilt from scratch every
        // tick since buffer and energy changes invalidate it.
        let mut snapshot: HashMap<I, f64> = HashMap::new();
        let mut candidates: Vec<Candidate<I>> = Vec::new();

        for conn in &connections {
            let Some(peer) = host.peer(conn) else {
                return Err(RouterError::ProtocolMismatch {
                    peer: conn.short_id(),
                });
            };

            if peer.is_transferring() || !peer.has_energy() {
                continue;
            }
            let peer_connections = peer.connected_neighbors();
            if utility::overlap_fraction(&connections, &peer_connections) > OVERLAP_CUTOFF {
                trace!(peer = %conn.short_id(), "skipped: redundant carrier");
                continue;
            }

            for (index, message) in eligible.iter().enumerate() {
                if peer.is_blacklisted(&message.id)
                    || peer.has_message(&message.id)
                    || message.size > peer.buffer_capacity()
                {
                    continue;
                }

                let score = utility::score_neighbor(
                    self_energy,
                    &connections,
                    peer.energy(),
                    &peer_connections,
                    peer.delivery_predictability(&message.destination),
                );
                snapshot.insert(conn.clone(), score);

                if score >= FILTER_THRESHOLD {
                    candidates.push(Candidate {
                        message: index,
                        peer: conn.clone(),
                    });
                }
            }
        }

        if candidates.is_empty() {
            return Ok(TickOutcome::NoCandidates);
        }

        // GRTRMax: the pair whose receiving side is the more promising
        // carrier goes first. Each candidate is ranked by its own
        // connection's cached utility; ties fall back to queue order.
        candidates.sort_by(|a, b| {
            let ua = snapshot.get(&a.peer).copied().unwrap_or(0.0);
            let ub = snapshot.get(&b.peer).copied().unwrap_or(0.0);
            ub.partial_cmp(&ua)
                .unwrap_or(Ordering::Equal)
                .then_with(|| host.queue_order(&eligible[a.message], &eligible[b.message]))
        });

        let mut engaged: HashSet<I> = HashSet::new();
        let mut started = 0;
        for candidate in &candidates {
            if engaged.contains(&candidate.peer) {
                continue;
            }
            match host.start_transfer(&eligible[candidate.message].id, &candidate.peer) {
                TransferVerdict::Started => {
                    trace!(
                        message = %eligible[candidate.message].id,
                        to = %candidate.peer.short_id(),
                        "spray transfer started"
                    );
                    engaged.insert(candidate.peer.clone());
                    started += 1;
                }
                TransferVerdict::Busy => {
                    engaged.insert(candidate.peer.clone());
                }
                TransferVerdict::Rejected => {}
            }
        }

        debug!(candidates = candidates.len(), started, "spray tick complete");
        Ok(TickOutcome::Sprayed { started })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SimId;

    fn make_id(c: char) -> SimId {
        SimId::new(c).unwrap()
    }

    fn mid(s: &str) -> MessageId {
        MessageId::new(s)
    }

    struct StubPeer {
        id: SimId,
        energy: f64,
        neighbors: Vec<SimId>,
        capacity: u64,
        transferring: bool,
        preds: HashMap<SimId, f64>,
        blacklist: HashSet<MessageId>,
        held: HashSet<MessageId>,
    }

    impl StubPeer {
        fn new(c: char) -> Self {
            Self {
                id: make_id(c),
                energy: 100.0,
                neighbors: Vec::new(),
                capacity: 1000,
                transferring: false,
                preds: HashMap::new(),
                blacklist: HashSet::new(),
                held: HashSet::new(),
            }
        }
    }

    impl PeerView<SimId> for StubPeer {
        fn identity(&self) -> &SimId {
            &self.id
        }

        fn energy(&self) -> f64 {
            self.energy
        }

        fn has_energy(&self) -> bool {
            self.energy > 0.0
        }

        fn connected_neighbors(&self) -> Vec<SimId> {
            self.neighbors.clone()
        }

        fn buffer_capacity(&self) -> u64 {
            self.capacity
        }

        fn is_transferring(&self) -> bool {
            self.transferring
        }

        fn delivery_predictability(&self, destination: &SimId) -> f64 {
            self.preds.get(destination).copied().unwrap_or(0.0)
        }

        fn predictability_snapshot(&self) -> Vec<(SimId, f64)> {
            self.preds.iter().map(|(k, v)| (*k, *v)).collect()
        }

        fn is_blacklisted(&self, message: &MessageId) -> bool {
            self.blacklist.contains(message)
        }

        fn has_message(&self, message: &MessageId) -> bool {
            self.held.contains(message)
        }
    }

    struct TestHost {
        now: f64,
        energy: f64,
        connections: Vec<SimId>,
        peers: HashMap<SimId, StubPeer>,
        messages: Vec<MessageMeta<SimId>>,
        copies: HashMap<MessageId, u32>,
        transferring: bool,
        can_start: bool,
        accepting: HashSet<SimId>,
        started: Vec<(MessageId, SimId)>,
    }

    impl TestHost {
        fn new() -> Self {
            Self {
                now: 0.0,
                energy: 100.0,
                connections: Vec::new(),
                peers: HashMap::new(),
                messages: Vec::new(),
                copies: HashMap::new(),
                transferring: false,
                can_start: true,
                accepting: HashSet::new(),
                started: Vec::new(),
            }
        }

        fn connect(&mut self, peer: StubPeer) {
            self.connections.push(peer.id);
            self.accepting.insert(peer.id);
            self.peers.insert(peer.id, peer);
        }

        fn carry(&mut self, id: &str, destination: char, copies: u32) {
            self.messages.push(MessageMeta {
                id: mid(id),
                origin: make_id('A'),
                destination: make_id(destination),
                size: 10,
                remaining_ttl: 100.0,
                initial_ttl: 100.0,
            });
            self.copies.insert(mid(id), copies);
        }
    }

    impl TickHost<SimId> for TestHost {
        fn now(&self) -> SimTime {
            self.now
        }

        fn self_energy(&self) -> f64 {
            self.energy
        }

        fn connections(&self) -> Vec<SimId> {
            self.connections.clone()
        }

        fn peer(&self, id: &SimId) -> Option<&dyn PeerView<SimId>> {
            self.peers.get(id).map(|p| p as &dyn PeerView<SimId>)
        }

        fn is_transferring(&self) -> bool {
            self.transferring
        }

        fn can_start_transfer(&self) -> bool {
            self.can_start
        }

        fn carried_messages(&self) -> Vec<MessageMeta<SimId>> {
            self.messages.clone()
        }

        fn replica_count(&self, message: &MessageId) -> Option<u32> {
            self.copies.get(message).copied()
        }

        fn queue_order(&self, a: &MessageMeta<SimId>, b: &MessageMeta<SimId>) -> Ordering {
            a.id.cmp(&b.id)
        }

        fn start_transfer(&mut self, message: &MessageId, peer: &SimId) -> TransferVerdict {
            if self.accepting.contains(peer) {
                self.started.push((message.clone(), *peer));
                TransferVerdict::Started
            } else {
                TransferVerdict::Rejected
            }
        }
    }

    fn router() -> UtilityRouter<SimId> {
        UtilityRouter::new(make_id('A'), RouterConfig::new(1.0, 8))
    }

    /// A peer attractive enough to clear the 0.67 filter: full energy
    /// credit, no overlap, high predictability toward `dest`.
    fn promising_peer(c: char, dest: char, pred: f64) -> StubPeer {
        let mut p = StubPeer::new(c);
        p.preds.insert(make_id(dest), pred);
        p
    }

    #[test]
    fn test_tick_idle_while_transferring() {
        let mut host = TestHost::new();
        host.transferring = true;
        host.connect(promising_peer('B', 'Z', 0.9));
        host.carry("M1", 'Z', 8);

        assert_eq!(router().tick(&mut host).unwrap(), TickOutcome::Idle);
        assert!(host.started.is_empty());
    }

    #[test]
    fn test_tick_idle_when_cannot_start() {
        let mut host = TestHost::new();
        host.can_start = false;
        assert_eq!(router().tick(&mut host).unwrap(), TickOutcome::Idle);
    }

    #[test]
    fn test_no_connections_is_silent_noop() {
        let mut host = TestHost::new();
        host.carry("M1", 'Z', 8);
        assert_eq!(router().tick(&mut host).unwrap(), TickOutcome::NoCandidates);
    }

    #[test]
    fn test_direct_delivery_wins_and_ends_tick() {
        let mut host = TestHost::new();
        host.connect(promising_peer('Z', 'Z', 0.9));
        host.carry("M1", 'Z', 8);
        host.carry("M2", 'Y', 8);

        let outcome = router().tick(&mut host).unwrap();
        assert_eq!(
            outcome,
            TickOutcome::DirectDelivery {
                destination: make_id('Z')
            }
        );
        assert_eq!(host.started, vec![(mid("M1"), make_id('Z'))]);
    }

    #[test]
    fn test_spray_requires_copies_left() {
        let mut host = TestHost::new();
        host.connect(promising_peer('B', 'Z', 0.9));
        host.carry("M1", 'Z', 1); // wait phase

        assert_eq!(router().tick(&mut host).unwrap(), TickOutcome::NoCandidates);
    }

    #[test]
    fn test_spray_to_promising_peer() {
        let mut host = TestHost::new();
        host.connect(promising_peer('B', 'Z', 0.9));
        host.carry("M1", 'Z', 8);

        // energy 1.0, overlap 0 (B is not its own neighbor), mobility 0.9:
        // 0.20 + 0.55 + 0.225 = 0.975 >= 0.67
        assert_eq!(
            router().tick(&mut host).unwrap(),
            TickOutcome::Sprayed { started: 1 }
        );
        assert_eq!(host.started, vec![(mid("M1"), make_id('B'))]);
    }

    #[test]
    fn test_filter_threshold_rejects_unpromising_peer() {
        let mut host = TestHost::new();
        // Low predictability and less energy: 0.5*0.20 + 0.55 + 0 = 0.65
        let mut peer = promising_peer('B', 'Z', 0.0);
        peer.energy = 10.0;
        host.energy = 50.0;
        host.connect(peer);
        host.carry("M1", 'Z', 8);

        assert_eq!(router().tick(&mut host).unwrap(), TickOutcome::NoCandidates);
    }

    #[test]
    fn test_hard_overlap_cutoff_skips_peer() {
        let mut host = TestHost::new();
        let mut peer = promising_peer('B', 'Z', 0.9);
        // Every one of self's connections is also B's neighbor.
        peer.neighbors = vec![make_id('B'), make_id('C')];
        host.connect(peer);
        let mut other = StubPeer::new('C');
        other.energy = 10.0;
        host.connections.push(make_id('C'));
        host.peers.insert(make_id('C'), other);
        host.carry("M1", 'Z', 8);

        // Overlap fraction 1.0 > 0.7: B is skipped; C is weaker and has
        // zero predictability, so it fails the soft filter (0.65 < 0.67).
        assert_eq!(router().tick(&mut host).unwrap(), TickOutcome::NoCandidates);
    }

    #[test]
    fn test_exhausted_or_busy_peers_skipped() {
        let mut host = TestHost::new();
        let mut drained = promising_peer('B', 'Z', 0.9);
        drained.energy = 0.0;
        let mut busy = promising_peer('C', 'Z', 0.9);
        busy.transferring = true;
        host.connect(drained);
        host.connect(busy);
        host.carry("M1", 'Z', 8);

        assert_eq!(router().tick(&mut host).unwrap(), TickOutcome::NoCandidates);
    }

    #[test]
    fn test_peer_possession_and_blacklist_filters() {
        let mut host = TestHost::new();
        let mut peer = promising_peer('B', 'Z', 0.9);
        peer.held.insert(mid("M1"));
        peer.blacklist.insert(mid("M2"));
        host.connect(peer);
        host.carry("M1", 'Z', 8);
        host.carry("M2", 'Z', 8);
        host.carry("M3", 'Z', 8);

        assert_eq!(
            router().tick(&mut host).unwrap(),
            TickOutcome::Sprayed { started: 1 }
        );
        assert_eq!(host.started, vec![(mid("M3"), make_id('B'))]);
    }

    #[test]
    fn test_oversized_message_filtered() {
        let mut host = TestHost::new();
        let mut peer = promising_peer('B', 'Z', 0.9);
        peer.capacity = 5;
        host.connect(peer);
        host.carry("M1", 'Z', 8); // size 10 > capacity 5

        assert_eq!(router().tick(&mut host).unwrap(), TickOutcome::NoCandidates);
    }

    #[test]
    fn test_ranking_prefers_higher_utility_peer() {
        let mut host = TestHost::new();
        host.connect(promising_peer('B', 'Z', 0.7));
        host.connect(promising_peer('C', 'Z', 0.95));
        host.carry("M1", 'Z', 8);

        let outcome = router().tick(&mut host).unwrap();
        assert_eq!(outcome, TickOutcome::Sprayed { started: 2 });
        // C's utility is higher, so it is attempted first.
        assert_eq!(host.started[0].1, make_id('C'));
        assert_eq!(host.started[1].1, make_id('B'));
    }

    #[test]
    fn test_tie_broken_by_queue_order() {
        let mut host = TestHost::new();
        host.connect(promising_peer('B', 'Z', 0.9));
        host.carry("M2", 'Z', 8);
        host.carry("M1", 'Z', 8);

        router().tick(&mut host).unwrap();
        // Same peer utility for both messages; queue order (by id) decides
        // which is offered first, and one acceptance engages the peer.
        assert_eq!(host.started, vec![(mid("M1"), make_id('B'))]);
    }

    #[test]
    fn test_one_transfer_per_connection() {
        let mut host = TestHost::new();
        host.connect(promising_peer('B', 'Z', 0.9));
        host.carry("M1", 'Z', 8);
        host.carry("M2", 'Z', 8);

        assert_eq!(
            router().tick(&mut host).unwrap(),
            TickOutcome::Sprayed { started: 1 }
        );
    }

    #[test]
    fn test_rejected_transfer_tries_next_candidate() {
        let mut host = TestHost::new();
        let blocked = promising_peer('B', 'Z', 0.95);
        host.connect(blocked);
        host.accepting.remove(&make_id('B'));
        host.connect(promising_peer('C', 'Z', 0.8));
        host.carry("M1", 'Z', 8);

        assert_eq!(
            router().tick(&mut host).unwrap(),
            TickOutcome::Sprayed { started: 1 }
        );
        assert_eq!(host.started, vec![(mid("M1"), make_id('C'))]);
    }

    #[test]
    fn test_unresolvable_peer_is_protocol_mismatch() {
        let mut host = TestHost::new();
        host.connections.push(make_id('B')); // no PeerView registered
        host.carry("M1", 'Z', 8);

        assert!(matches!(
            router().tick(&mut host),
            Err(RouterError::ProtocolMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_replica_property_is_fatal() {
        let mut host = TestHost::new();
        host.connect(promising_peer('B', 'Z', 0.9));
        host.messages.push(MessageMeta {
            id: mid("M1"),
            origin: make_id('A'),
            destination: make_id('Z'),
            size: 10,
            remaining_ttl: 100.0,
            initial_ttl: 100.0,
        });
        // No replica count registered for M1.

        assert!(matches!(
            router().tick(&mut host),
            Err(RouterError::MissingReplicaCount { .. })
        ));
    }

    #[test]
    fn test_on_connection_up_updates_predictability() {
        let r = router();
        let mut peer = StubPeer::new('B');
        peer.preds.insert(make_id('C'), 0.8);

        r.on_connection_up(&peer, 0.0);

        assert!((r.delivery_predictability(&make_id('B'), 0.0) - 0.75).abs() < 1e-9);
        // Transitive: 0.75 * 0.8 * 0.25 = 0.15
        assert!((r.delivery_predictability(&make_id('C'), 0.0) - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_transfer_done_after_eviction_is_silent() {
        struct Gone;
        impl ReplicaMessage for Gone {
            fn id(&self) -> &MessageId {
                unreachable!()
            }
            fn replica_count(&self) -> Option<u32> {
                None
            }
            fn set_replica_count(&mut self, _count: u32) {}
        }

        let r = router();
        let result = r.on_transfer_done(None::<&mut Gone>);
        assert_eq!(result.unwrap(), None);
    }
}
