use crate::cluster::GossipConfig;
use crate::coordinator::{
  lock_view, AgentLauncher, AggregatedView, Aggregator, Command, ControlError, Lifecycle,
  Registry, Reply, StatusReport,
};
use crate::core::{query_status, PeerId, StatusMap, TransportError};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

/// The main node. It starts and stops agents, and listens in on their gossip.
///
/// Commands may be executed concurrently. The registry is held for the whole of a `start` or
/// `kill`, so two commands can never race on one agent.
pub struct Coordinator<L: AgentLauncher> {
  config: GossipConfig,
  launcher: L,
  view: Arc<Mutex<AggregatedView>>,
  registry: AsyncMutex<Registry>,
  aggregator: AsyncMutex<Option<Aggregator>>,
}
impl<L: AgentLauncher> Coordinator<L> {
  /// Starts listening for gossip on the coordinator port. No agent is started yet.
  pub async fn bind(config: GossipConfig, launcher: L) -> Result<Coordinator<L>, TransportError> {
    let view = Arc::new(Mutex::new(AggregatedView::new(config.peers())));
    let aggregator = Aggregator::spawn(config.coordinator_socket(), view.clone()).await?;
    Ok(Coordinator {
      registry: AsyncMutex::new(Registry::new(config.peers())),
      aggregator: AsyncMutex::new(Some(aggregator)),
      config: config,
      launcher: launcher,
      view: view,
    })
  }

  pub fn view(&self) -> &Arc<Mutex<AggregatedView>> {
    &self.view
  }

  pub async fn lifecycle(&self, id: PeerId) -> Option<Lifecycle> {
    let mut registry = self.registry.lock().await;
    registry.observe(&lock_view(&self.view).merged);
    registry.lifecycle(id)
  }

  /// The last status map the registry holds for `id`.
  pub async fn last_snapshot(&self, id: PeerId) -> Option<StatusMap> {
    self.registry.lock().await.snapshot(id).cloned()
  }

  /// Starts every configured agent, in id order.
  pub async fn start_all(&self) -> Result<(), ControlError> {
    for id in self.config.peers() {
      self.start(id).await?;
    }
    info!(count = self.config.node_count, "all agents started");
    Ok(())
  }

  pub async fn execute(&self, cmd: Command) -> Result<Reply, ControlError> {
    debug!(?cmd, "executing");
    if cmd != Command::Shutdown && self.is_shut_down().await {
      return Err(ControlError::ShuttingDown);
    }
    match cmd {
      Command::Status => Ok(Reply::Status(self.status().await)),
      Command::Check(id) => self.check(id).await.map(|status| Reply::Checked(id, status)),
      Command::Start(id) => self.start(id).await.map(|_| Reply::Started(id)),
      Command::Kill(id) => self.kill(id).await.map(|_| Reply::Killed(id)),
      Command::Shutdown => self.shutdown().await.map(|_| Reply::ShutDown),
    }
  }

  pub async fn is_shut_down(&self) -> bool {
    self.aggregator.lock().await.is_none()
  }

  /// The aggregated view together with the registry, after bringing each agent's lifecycle and
  /// last-known snapshot up to date.
  pub async fn status(&self) -> StatusReport {
    let mut registry = self.registry.lock().await;
    let view = lock_view(&self.view);
    registry.observe(&view.merged);
    for (sender, status) in view.reports.iter() {
      registry.record_snapshot(*sender, status.clone());
    }
    StatusReport::new(&view.merged, &registry)
  }

  /// Asks one agent for its own dictionary over TCP.
  pub async fn check(&self, id: PeerId) -> Result<StatusMap, ControlError> {
    self.guard_active(&*self.registry.lock().await, id)?;
    let socket = self.config.socket_of(id);
    let status = query_status(&socket, self.config.query_timeout)
      .await
      .map_err(|source| ControlError::Query {
        peer: id,
        source: source,
      })?;
    self.registry.lock().await.record_snapshot(id, status.clone());
    Ok(status)
  }

  pub async fn start(&self, id: PeerId) -> Result<(), ControlError> {
    let mut registry = self.registry.lock().await;
    if !self.config.is_configured(id) {
      return Err(ControlError::UnknownAgent(id));
    }
    if registry.is_active(id) {
      return Err(ControlError::AlreadyRunning(id));
    }
    let handle = self.launcher.launch(id, &self.config).await.map_err(|source| {
      ControlError::Launch {
        peer: id,
        source: source,
      }
    })?;
    info!(%id, handle = %handle.describe(), "agent started");
    registry.register(id, handle);
    Ok(())
  }

  /// Terminates one agent. Nobody is told: the other agents only find out when their fault timers
  /// for it run out, and the aggregated view only changes once they gossip about it.
  pub async fn kill(&self, id: PeerId) -> Result<(), ControlError> {
    let mut registry = self.registry.lock().await;
    self.guard_active(&registry, id)?;
    let mut handle = registry.remove(id).ok_or(ControlError::NotRunning(id))?;
    handle.terminate().await.map_err(|source| ControlError::Launch {
      peer: id,
      source: source,
    })?;
    info!(%id, "agent killed");
    Ok(())
  }

  /// Terminates every active agent, highest id first, waiting `kill_pacing` between two
  /// terminations, then stops the aggregator. Calling it again does nothing.
  pub async fn shutdown(&self) -> Result<(), ControlError> {
    let mut aggregator = self.aggregator.lock().await;
    let aggregator = match aggregator.take() {
      Some(aggregator) => aggregator,
      None => return Ok(()),
    };
    info!("shutting down all agents");
    let mut paced = false;
    loop {
      let next = self.registry.lock().await.active().last().copied();
      let id = match next {
        Some(id) => id,
        None => break,
      };
      if paced {
        tokio::time::sleep(self.config.kill_pacing).await;
      }
      paced = true;
      if let Err(error) = self.kill(id).await {
        match error {
          ControlError::NotRunning(_) => debug!(%id, "already gone"),
          error => error!(%id, %error, "could not terminate agent during shutdown"),
        }
      }
    }
    aggregator.stop().await;
    info!("all agents stopped");
    Ok(())
  }

  fn guard_active(&self, registry: &Registry, id: PeerId) -> Result<(), ControlError> {
    match registry.lifecycle(id) {
      None => Err(ControlError::UnknownAgent(id)),
      Some(l) if l.is_active() => Ok(()),
      Some(l) => {
        warn!(%id, lifecycle = ?l, "agent is not running");
        Err(ControlError::NotRunning(id))
      }
    }
  }
}
