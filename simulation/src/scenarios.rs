//! Canned network scenarios
//!
//! Each scenario builds a small world, drives contacts over simulated
//! time and returns the final run statistics. They double as living
//! documentation of what the policy does under the three situations that
//! matter most: a direct meeting, a multi-hop relay and buffer pressure
//! at a popular mule.

use anyhow::Result;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::info;

use porter_routing::{Point, RouterConfig, SimId};

use crate::world::{SimWorld, WorldStats};

fn id(c: char) -> SimId {
    SimId::new(c).expect("scenario ids are capital letters")
}

fn default_config() -> RouterConfig {
    RouterConfig::new(1.0, 8)
}

/// Two nodes meet and the message goes straight to its recipient.
pub fn first_contact() -> Result<WorldStats> {
    let mut world = SimWorld::new();
    world.add_node(id('A'), Point::new(0.0, 0.0), default_config());
    world.add_node(id('B'), Point::new(50.0, 0.0), default_config());

    world.create_message("M1", id('A'), id('B'), 100, 3600.0)?;

    // Nothing happens while the nodes are apart.
    world.run(5, 10.0)?;
    world.connect(id('A'), id('B'));
    world.run(2, 10.0)?;

    let stats = world.stats().clone();
    info!(delivered = stats.delivered_count(), "first contact finished");
    Ok(stats)
}

/// A message crosses a line of nodes that only ever meet pairwise.
///
/// D has met the destination before the run starts, so each hop's
/// selector can see a rising predictability toward Z down the chain.
pub fn relay_chain() -> Result<WorldStats> {
    let mut world = SimWorld::new();
    for (c, x) in [('A', 0.0), ('B', 100.0), ('C', 200.0), ('D', 300.0), ('Z', 400.0)] {
        world.add_node(id(c), Point::new(x, 0.0), default_config());
    }

    // Prime the chain: Z's predictability spreads backwards through
    // pairwise meetings before the message exists.
    world.connect(id('D'), id('Z'));
    world.disconnect(id('D'), id('Z'));
    world.advance(30.0);
    world.connect(id('C'), id('D'));
    world.disconnect(id('C'), id('D'));
    world.advance(30.0);
    world.connect(id('B'), id('C'));
    world.disconnect(id('B'), id('C'));
    world.advance(30.0);

    world.create_message("M1", id('A'), id('Z'), 100, 7200.0)?;

    // Now walk the message down the chain, one contact at a time.
    for (from, to) in [('A', 'B'), ('B', 'C'), ('C', 'D'), ('D', 'Z')] {
        world.connect(id(from), id(to));
        world.run(3, 10.0)?;
        world.disconnect(id(from), id(to));
        world.advance(30.0);
    }

    let stats = world.stats().clone();
    info!(
        delivered = stats.delivered_count(),
        relayed = stats.relayed,
        "relay chain finished"
    );
    Ok(stats)
}

/// Many sources flood one small-buffered mule that shuttles toward Z.
///
/// The mule cannot hold everything, so the eviction policy decides what
/// survives the trip. Message sizes are drawn from a seeded generator so
/// a given seed always produces the same run.
pub fn buffer_pressure(seed: u64) -> Result<WorldStats> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut world = SimWorld::new();

    let sources = ['A', 'B', 'C', 'D'];
    for (i, c) in sources.iter().enumerate() {
        world.add_node(id(*c), Point::new(0.0, i as f64 * 10.0), default_config());
    }
    let mule = world.add_node(id('M'), Point::new(50.0, 0.0), default_config());
    mule.buffer_capacity = 600;
    world.add_node(id('Z'), Point::new(500.0, 0.0), default_config());

    // The mule commutes to Z, so it looks promising to every source.
    world.connect(id('M'), id('Z'));
    world.disconnect(id('M'), id('Z'));
    world.advance(60.0);

    for (i, c) in sources.iter().enumerate() {
        let size = rng.random_range(200..400);
        world.create_message(format!("M{i}"), id(*c), id('Z'), size, 7200.0)?;
    }

    // Each source gets a short contact window with the mule.
    for c in sources {
        world.connect(id(c), id('M'));
        world.run(2, 10.0)?;
        world.disconnect(id(c), id('M'));
    }

    // The mule completes its commute.
    world.connect(id('M'), id('Z'));
    world.run(4, 10.0)?;

    let stats = world.stats().clone();
    info!(
        delivered = stats.delivered_count(),
        dropped = stats.dropped,
        aborted = stats.aborted,
        "buffer pressure finished"
    );
    Ok(stats)
}
