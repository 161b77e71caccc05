use crate::cluster::{AgentError, GossipConfig};
use crate::core::PeerId;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::debug;

/// Name of the agent binary the [`ProcessLauncher`] runs by default.
pub const NODE_BINARY: &str = "gossip-node";

#[derive(Debug, Error)]
pub enum LaunchError {
  #[error("could not spawn agent process: {0}")]
  Spawn(#[source] io::Error),
  #[error("could not terminate agent: {0}")]
  Terminate(#[source] io::Error),
  #[error(transparent)]
  Agent(#[from] AgentError),
}

/// Whatever the coordinator holds on to for a running agent.
#[async_trait]
pub trait AgentHandle: Send {
  /// A short description for the registry dump, such as a process id.
  fn describe(&self) -> String;

  /// Stops the agent abruptly. Its peers are not told.
  async fn terminate(&mut self) -> Result<(), LaunchError>;
}

/// Starts agents on behalf of the coordinator.
#[async_trait]
pub trait AgentLauncher: Send + Sync {
  async fn launch(
    &self,
    id: PeerId,
    config: &GossipConfig,
  ) -> Result<Box<dyn AgentHandle>, LaunchError>;
}

/// Runs every agent as its own OS process.
#[derive(Clone, Debug)]
pub struct ProcessLauncher {
  program: PathBuf,
  log_dir: Option<PathBuf>,
}
impl ProcessLauncher {
  pub fn new<P: Into<PathBuf>>(program: P) -> ProcessLauncher {
    ProcessLauncher {
      program: program.into(),
      log_dir: None,
    }
  }

  /// Uses the agent binary installed next to the running executable.
  pub fn beside_current_exe() -> io::Result<ProcessLauncher> {
    let exe = std::env::current_exe()?;
    let dir = exe.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok(ProcessLauncher::new(dir.join(NODE_BINARY)))
  }

  /// Makes every launched agent write its log to `<dir>/node<id>.txt`.
  pub fn with_log_dir<P: Into<PathBuf>>(mut self, dir: P) -> ProcessLauncher {
    self.log_dir = Some(dir.into());
    self
  }

  pub fn program(&self) -> &Path {
    &self.program
  }

  fn command(&self, id: PeerId, config: &GossipConfig) -> Command {
    let mut cmd = Command::new(&self.program);
    cmd.args(config.node_args(id));
    if let Some(dir) = &self.log_dir {
      cmd.arg("--log-dir").arg(dir);
    }
    cmd.stdin(Stdio::null()).stdout(Stdio::null()).kill_on_drop(true);
    cmd
  }
}
#[async_trait]
impl AgentLauncher for ProcessLauncher {
  async fn launch(
    &self,
    id: PeerId,
    config: &GossipConfig,
  ) -> Result<Box<dyn AgentHandle>, LaunchError> {
    let child = self.command(id, config).spawn().map_err(LaunchError::Spawn)?;
    debug!(%id, pid = ?child.id(), program = %self.program.display(), "agent process spawned");
    Ok(Box::new(AgentProcess { child: child }))
  }
}

struct AgentProcess {
  child: Child,
}
#[async_trait]
impl AgentHandle for AgentProcess {
  fn describe(&self) -> String {
    match self.child.id() {
      Some(pid) => format!("pid {}", pid),
      None => "exited".to_string(),
    }
  }

  async fn terminate(&mut self) -> Result<(), LaunchError> {
    self.child.kill().await.map_err(LaunchError::Terminate)
  }
}

#[test]
fn test_process_command_line() {
  let launcher = ProcessLauncher::new("/opt/bin/gossip-node").with_log_dir("logs");
  let cmd = launcher.command(PeerId(2), &GossipConfig::default());
  let std = cmd.as_std();
  assert_eq!(std.get_program(), "/opt/bin/gossip-node");
  let args = std.get_args().map(|a| a.to_string_lossy().into_owned()).collect::<Vec<_>>();
  assert_eq!(&args[..2], &["--id".to_string(), "2".to_string()]);
  assert_eq!(&args[args.len() - 2..], &["--log-dir".to_string(), "logs".to_string()]);
}
