use crate::cluster::StatusDictionary;
use crate::coordinator::{LaunchError, Registry};
use crate::core::{PeerId, StatusMap, TransportError};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use Command::*;

/// The operator's commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
  /// Print the aggregated view and the registry.
  Status,
  /// Ask one agent directly for its own dictionary.
  Check(PeerId),
  /// Start an agent that is not running.
  Start(PeerId),
  /// Terminate a running agent without telling anyone.
  Kill(PeerId),
  /// Terminate every agent, one at a time, then stop.
  Shutdown,
}
impl Command {
  pub const MENU: &'static str = "Enter command:\n\
    1. 'status' to print current status\n\
    2. 'check n' to check node n status\n\
    3. 'start n' to start node n\n\
    4. 'kill n' to kill node n\n\
    5. 'shutdown' to shutdown all nodes";
}
impl FromStr for Command {
  type Err = ControlError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let words = s.split_whitespace().collect::<Vec<_>>();
    let id = |word: &str| {
      word.parse::<PeerId>().map_err(|_| ControlError::Unrecognized(s.trim().to_string()))
    };
    match words.as_slice() {
      ["status"] => Ok(Status),
      ["shutdown"] => Ok(Shutdown),
      ["check", n] => Ok(Check(id(*n)?)),
      ["start", n] => Ok(Start(id(*n)?)),
      ["kill", n] => Ok(Kill(id(*n)?)),
      _ => Err(ControlError::Unrecognized(s.trim().to_string())),
    }
  }
}

#[derive(Debug, Error)]
pub enum ControlError {
  #[error("Invalid command: {0:?}")]
  Unrecognized(String),
  #[error("Node {0} does not exist")]
  UnknownAgent(PeerId),
  #[error("Node {0} is not running")]
  NotRunning(PeerId),
  #[error("Node {0} is already running")]
  AlreadyRunning(PeerId),
  #[error("Failed to check node {peer} status: {source}")]
  Query {
    peer: PeerId,
    #[source]
    source: TransportError,
  },
  #[error("Failed to control node {peer}: {source}")]
  Launch {
    peer: PeerId,
    #[source]
    source: LaunchError,
  },
  #[error("The coordinator is shutting down")]
  ShuttingDown,
}
impl ControlError {
  /// Whether the coordinator can no longer trust its own bookkeeping and must shut everything
  /// down. Operator mistakes and unreachable agents are not fatal.
  pub fn is_fatal(&self) -> bool {
    matches!(self, ControlError::Launch { .. })
  }
}

/// Both dictionaries the `status` command prints.
pub struct StatusReport {
  pub view: StatusDictionary,
  pub registry: String,
}
impl fmt::Display for StatusReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Status Dictionary:\n{}\nNode Dictionary:\n{}", self.view, self.registry)
  }
}
impl StatusReport {
  pub fn new(view: &StatusDictionary, registry: &Registry) -> StatusReport {
    StatusReport {
      view: view.clone(),
      registry: registry.to_string(),
    }
  }
}

/// What a successful command produced.
pub enum Reply {
  Status(StatusReport),
  Checked(PeerId, StatusMap),
  Started(PeerId),
  Killed(PeerId),
  ShutDown,
}
impl fmt::Display for Reply {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Reply::Status(report) => write!(f, "{}", report),
      Reply::Checked(id, status) => {
        write!(f, "Status Dictionary for {}:\n{}", id, StatusDictionary::from(status.clone()))
      }
      Reply::Started(id) => write!(f, "Node {} started.", id.0),
      Reply::Killed(id) => write!(f, "Node {} killed.", id.0),
      Reply::ShutDown => write!(f, "All nodes have been stopped."),
    }
  }
}
