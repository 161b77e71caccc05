use crate::cluster::{GossipAgent, GossipConfig};
use crate::coordinator::{AgentHandle, AgentLauncher, LaunchError};
use crate::core::{HeartbeatRecord, PeerId, StatusMap};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Runs agents as tasks on the current tokio runtime, so a whole cluster fits in one test.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalLauncher;
#[async_trait]
impl AgentLauncher for LocalLauncher {
  async fn launch(
    &self,
    id: PeerId,
    config: &GossipConfig,
  ) -> Result<Box<dyn AgentHandle>, LaunchError> {
    let agent = LocalAgent::start(id, config.clone()).await?;
    Ok(Box::new(agent))
  }
}

/// A handle to an in-process agent. Clones share the agent, so a test can keep one to look
/// inside the agent while the coordinator holds another.
#[derive(Clone)]
pub struct LocalAgent {
  id: PeerId,
  agent: Arc<Mutex<Option<GossipAgent>>>,
}
impl LocalAgent {
  pub async fn start(id: PeerId, config: GossipConfig) -> Result<LocalAgent, LaunchError> {
    let agent = GossipAgent::start(id, config).await?;
    Ok(LocalAgent {
      id: id,
      agent: Arc::new(Mutex::new(Some(agent))),
    })
  }

  pub fn id(&self) -> PeerId {
    self.id
  }

  pub async fn is_running(&self) -> bool {
    self.agent.lock().await.is_some()
  }

  /// The agent's current dictionary, or `None` once it has been stopped.
  pub async fn snapshot(&self) -> Option<StatusMap> {
    self.agent.lock().await.as_ref().map(GossipAgent::snapshot)
  }

  pub async fn get(&self, peer: PeerId) -> Option<HeartbeatRecord> {
    self.agent.lock().await.as_ref().map(|a| a.get(peer))
  }

  /// Stops the agent abruptly, like a crash. Later calls do nothing.
  pub async fn kill(&self) {
    if let Some(agent) = self.agent.lock().await.take() {
      agent.kill();
    }
  }

  /// Stops the agent cleanly. Later calls do nothing.
  pub async fn shutdown(&self) {
    let agent = self.agent.lock().await.take();
    if let Some(agent) = agent {
      agent.shutdown().await;
    }
  }
}
#[async_trait]
impl AgentHandle for LocalAgent {
  fn describe(&self) -> String {
    "in-process".to_string()
  }

  async fn terminate(&mut self) -> Result<(), LaunchError> {
    self.kill().await;
    Ok(())
  }
}
