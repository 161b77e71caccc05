//! The gossip protocol itself: what each agent knows, how it learns more, and how it decides a
//! peer has died.
//!
//! ### Gossip
//! Every agent keeps a [`StatusDictionary`] holding a logical clock and a liveness flag for each
//! peer. Once per heartbeat, an agent increments its own clock and sends its whole dictionary to a
//! few neighbors chosen at random, and to the coordinator. Receivers fold it into their own
//! dictionary with [`StatusDictionary::merge`]: a record with a higher clock always wins, and a
//! record with a different liveness flag wins on an equal clock. No agent can be told anything
//! about itself; it alone advances its clock.
//!
//! ### Failure Detection
//! Each agent runs one timer per peer in its [`FaultDetector`]. Whenever a merge shows that a
//! peer is still running (its clock moved, or it came back alive), that peer's timer starts over.
//! A timer that runs out marks its peer dead in the local dictionary only. Other agents learn of it
//! through the next round of gossip, which carries the flipped flag at the same clock.
//!
//! A peer that was declared dead by mistake simply keeps gossiping. Its next clock increment beats
//! every stale record and marks it alive everywhere.

mod agent;
mod fault_detector;
mod status;
mod utils;

#[rustfmt::skip]
pub use {
  agent::AgentError,
  agent::GossipAgent,
  fault_detector::lock_table,
  fault_detector::FaultDetector,
  fault_detector::PeerTable,
  status::StatusChange,
  status::StatusDictionary,
  utils::ClusterArgs,
  utils::GossipConfig,
};
