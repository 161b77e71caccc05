//! Tools for running and observing a cluster in tests: lossy links, logging setup, and a launcher
//! that runs agents inside the current process instead of spawning new ones.

mod failure_config;
mod local_launcher;
mod logging;
mod unreliable_remoting;

#[rustfmt::skip]
pub use {
  failure_config::FailureConfig,
  failure_config::FailureConfigMap,
  local_launcher::LocalAgent,
  local_launcher::LocalLauncher,
  logging::init_logging,
  logging::LogLevel,
  unreliable_remoting::udp_send_unreliable,
};
