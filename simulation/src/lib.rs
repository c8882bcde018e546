//! Discrete-step host simulation for the `porter-routing` policy
//!
//! The routing crate owns decisions; this crate owns everything the
//! decisions are about: nodes with energy, locations and buffers, the
//! links between them, the simulated clock and the transfer machinery.
//!
//! - [`message`]: the host message object with property storage
//! - [`node`]: a simulated device and the views other selectors get of it
//! - [`world`]: the network itself, its step loop and run statistics
//! - [`scenarios`]: canned runs used by the binary and the test suite

pub mod message;
pub mod node;
pub mod scenarios;
pub mod world;

pub use message::SimMessage;
pub use node::{NodeView, SimNode};
pub use world::{DeliveryRecord, SimWorld, WorldStats};
