//! The main node: it launches the agents, eavesdrops on their gossip and answers the operator.
//!
//! The [`Coordinator`] never runs fault timers of its own. Its [`AggregatedView`] is whatever the
//! agents have gossiped to it, so a killed agent only shows up as dead once some other agent's
//! timer for it has fired and the news has reached the coordinator port.
//!
//! Agents are started through an [`AgentLauncher`]. The binaries use [`ProcessLauncher`], which
//! runs one `gossip-node` process per agent. Tests run agents on the current runtime instead, with
//! [`LocalLauncher`](crate::testkit::LocalLauncher).

mod aggregator;
mod control;
mod coordinator;
mod launcher;
mod registry;

#[rustfmt::skip]
pub use {
  aggregator::lock_view,
  aggregator::AggregatedView,
  aggregator::Aggregator,
  control::Command,
  control::ControlError,
  control::Reply,
  control::StatusReport,
  coordinator::Coordinator,
  launcher::AgentHandle,
  launcher::AgentLauncher,
  launcher::LaunchError,
  launcher::ProcessLauncher,
  launcher::NODE_BINARY,
  registry::Lifecycle,
  registry::Registry,
};
