use async_trait::async_trait;
use gossip_monitor::cluster::GossipConfig;
use gossip_monitor::coordinator::{
  lock_view, AgentHandle, AgentLauncher, Command, ControlError, Coordinator, LaunchError,
  Lifecycle, Reply,
};
use gossip_monitor::core::PeerId;
use gossip_monitor::testkit::{LocalAgent, LocalLauncher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

fn config(port: u16) -> GossipConfig {
  GossipConfig {
    node_count: 3,
    heartbeat: Duration::from_millis(300),
    fault_duration: Duration::from_millis(1000),
    kill_pacing: Duration::from_millis(200),
    query_timeout: Duration::from_millis(500),
    starting_port: port,
    ..GossipConfig::default()
  }
}

async fn run<L: AgentLauncher>(
  coordinator: &Coordinator<L>,
  cmd: &str,
) -> Result<Reply, ControlError> {
  coordinator.execute(cmd.parse::<Command>()?).await
}

#[tokio::test(flavor = "multi_thread")]
async fn control_commands() {
  let coordinator = Coordinator::bind(config(23001), LocalLauncher).await.unwrap();
  coordinator.start_all().await.unwrap();
  for id in 1..=3 {
    assert_eq!(coordinator.lifecycle(PeerId(id)).await, Some(Lifecycle::Running));
  }

  match run(&coordinator, "start 1").await {
    Err(ControlError::AlreadyRunning(PeerId(1))) => {}
    other => panic!("{:?}", other.map(|r| r.to_string())),
  }
  match run(&coordinator, "kill 9").await {
    Err(ControlError::UnknownAgent(PeerId(9))) => {}
    other => panic!("{:?}", other.map(|r| r.to_string())),
  }
  match run(&coordinator, "start 0").await {
    Err(ControlError::UnknownAgent(PeerId(0))) => {}
    other => panic!("{:?}", other.map(|r| r.to_string())),
  }

  sleep(Duration::from_millis(800)).await;
  let checked = match run(&coordinator, "check 1").await.unwrap() {
    Reply::Checked(PeerId(1), status) => status,
    other => panic!("unexpected reply {}", other),
  };
  let own = checked.get(&PeerId(1)).copied().unwrap();
  assert!(own.alive && own.clock >= 1);
  assert_eq!(coordinator.last_snapshot(PeerId(1)).await, Some(checked));
  assert_eq!(coordinator.last_snapshot(PeerId(3)).await, None);
  match run(&coordinator, "status").await.unwrap() {
    Reply::Status(report) => {
      let line = report.registry.lines().find(|l| l.contains("'node-1'")).unwrap().to_string();
      assert!(line.contains("Running (in-process), last status {\"node-1\":["), "{}", line);
    }
    other => panic!("unexpected reply {}", other),
  }
  // Gossip reached the coordinator port.
  assert!(lock_view(coordinator.view()).merged.get(PeerId(2)).clock >= 1);

  assert!(matches!(run(&coordinator, "kill 2").await, Ok(Reply::Killed(PeerId(2)))));
  assert!(matches!(run(&coordinator, "kill 2").await, Err(ControlError::NotRunning(PeerId(2)))));
  assert!(matches!(run(&coordinator, "check 2").await, Err(ControlError::NotRunning(PeerId(2)))));
  assert_eq!(coordinator.lifecycle(PeerId(2)).await, Some(Lifecycle::Killed));

  sleep(Duration::from_millis(2000)).await;
  assert!(!lock_view(coordinator.view()).merged.get(PeerId(2)).alive);
  // An explicit kill stays a kill, even though the view now reports a fault.
  assert_eq!(coordinator.lifecycle(PeerId(2)).await, Some(Lifecycle::Killed));
  match run(&coordinator, "status").await.unwrap() {
    Reply::Status(report) => {
      assert!(!report.view.get(PeerId(2)).alive);
      assert!(report.to_string().contains("'node-2': Killed"));
    }
    other => panic!("unexpected reply {}", other),
  }

  assert!(matches!(run(&coordinator, "start 2").await, Ok(Reply::Started(PeerId(2)))));
  // The restarted agent counts from zero and has to outrun its stale records first.
  sleep(Duration::from_millis(3000)).await;
  assert!(lock_view(coordinator.view()).merged.get(PeerId(2)).alive);
  assert_eq!(coordinator.lifecycle(PeerId(2)).await, Some(Lifecycle::Running));

  let started = Instant::now();
  assert!(matches!(run(&coordinator, "shutdown").await, Ok(Reply::ShutDown)));
  // Three agents, two pauses between them.
  assert!(started.elapsed() >= Duration::from_millis(400));
  for id in 1..=3 {
    assert_eq!(coordinator.lifecycle(PeerId(id)).await, Some(Lifecycle::Killed));
  }
  assert!(matches!(run(&coordinator, "shutdown").await, Ok(Reply::ShutDown)));
  assert!(matches!(run(&coordinator, "status").await, Err(ControlError::ShuttingDown)));
}

/// Starts agents in-process and keeps a copy of every handle, so a test can crash an agent
/// without going through the coordinator.
#[derive(Clone, Default)]
struct SpyLauncher {
  agents: Arc<Mutex<Vec<LocalAgent>>>,
}
#[async_trait]
impl AgentLauncher for SpyLauncher {
  async fn launch(
    &self,
    id: PeerId,
    config: &GossipConfig,
  ) -> Result<Box<dyn AgentHandle>, LaunchError> {
    let agent = LocalAgent::start(id, config.clone()).await?;
    self.agents.lock().await.push(agent.clone());
    Ok(Box::new(agent))
  }
}

#[tokio::test(flavor = "multi_thread")]
async fn crashed_agent_turns_faulted() {
  let launcher = SpyLauncher::default();
  let coordinator = Coordinator::bind(config(23011), launcher.clone()).await.unwrap();
  coordinator.start_all().await.unwrap();
  sleep(Duration::from_millis(600)).await;
  assert!(lock_view(coordinator.view()).merged.get(PeerId(3)).alive);

  let crashed = launcher.agents.lock().await.iter().find(|a| a.id() == PeerId(3)).cloned();
  crashed.unwrap().kill().await;
  sleep(Duration::from_millis(2000)).await;

  assert_eq!(coordinator.lifecycle(PeerId(3)).await, Some(Lifecycle::Faulted));
  assert_eq!(coordinator.lifecycle(PeerId(1)).await, Some(Lifecycle::Running));
  match run(&coordinator, "check 3").await {
    Err(err @ ControlError::Query { .. }) => assert!(!err.is_fatal()),
    other => panic!("{:?}", other.map(|r| r.to_string())),
  }
  // A faulted agent is still ours to kill.
  assert!(matches!(run(&coordinator, "kill 3").await, Ok(Reply::Killed(PeerId(3)))));
  assert_eq!(coordinator.lifecycle(PeerId(3)).await, Some(Lifecycle::Killed));

  coordinator.shutdown().await.unwrap();
  assert!(coordinator.is_shut_down().await);
}
