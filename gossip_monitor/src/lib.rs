//! A cluster membership monitor built on gossip. A fixed set of agents keep each other informed
//! of who is alive by exchanging logical heartbeat clocks over UDP, and each agent declares a peer
//! a fault on its own once it has heard nothing new about that peer for a while. A coordinator
//! process starts and kills the agents, listens in on their gossip, and answers an operator's
//! queries.
//!
//! - [`core`] holds the identities, records and wire format everything else is built from.
//! - [`cluster`] is the protocol: the status dictionary, the fault detector and the agent.
//! - [`coordinator`] is the main node and its control commands.
//! - [`testkit`] has lossy links, logging setup and an in-process launcher for tests.

pub mod cluster;
pub mod coordinator;
pub mod core;
pub mod testkit;
