use gossip_monitor::cluster::GossipConfig;
use gossip_monitor::coordinator::{lock_view, AggregatedView, Aggregator};
use gossip_monitor::core::{HeartbeatRecord, PeerId};
use gossip_monitor::testkit::{init_logging, FailureConfigMap, LocalAgent, LogLevel};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

fn config(port: u16, nodes: u32) -> GossipConfig {
  GossipConfig {
    node_count: nodes,
    heartbeat: Duration::from_secs(1),
    fault_duration: Duration::from_secs(2),
    starting_port: port,
    ..GossipConfig::default()
  }
}

async fn start_all(config: &GossipConfig) -> Vec<LocalAgent> {
  let mut agents = Vec::new();
  for id in config.peers() {
    agents.push(LocalAgent::start(id, config.clone()).await.unwrap());
  }
  agents
}

#[tokio::test(flavor = "multi_thread")]
async fn killed_agent_is_declared_dead_by_everyone() {
  init_logging(LogLevel::Warn, None).unwrap();
  let config = config(21001, 3);
  let view = Arc::new(Mutex::new(AggregatedView::new(config.peers())));
  let aggregator = Aggregator::spawn(config.coordinator_socket(), view.clone()).await.unwrap();
  let agents = start_all(&config).await;

  sleep(Duration::from_millis(500)).await;
  let last_sent = agents[1].get(PeerId(2)).await.unwrap().clock;
  agents[1].kill().await;
  assert!(!agents[1].is_running().await);

  sleep(Duration::from_millis(3000)).await;
  let dead = HeartbeatRecord::new(last_sent, false);
  for survivor in [&agents[0], &agents[2]].iter() {
    assert_eq!(survivor.get(PeerId(2)).await, Some(dead), "seen by {}", survivor.id());
    let own = survivor.get(survivor.id()).await.unwrap();
    assert!(own.alive && own.clock >= 3);
  }
  // The survivors keep hearing from each other.
  assert!(agents[0].get(PeerId(3)).await.unwrap().alive);
  assert!(agents[2].get(PeerId(1)).await.unwrap().alive);
  // And the coordinator hears the same verdict from them.
  assert_eq!(lock_view(&view).merged.get(PeerId(2)), dead);

  for agent in agents.iter() {
    agent.shutdown().await;
  }
  aggregator.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn declared_dead_agent_recovers_once_it_gossips() {
  let config = GossipConfig {
    heartbeat: Duration::from_millis(300),
    fault_duration: Duration::from_millis(900),
    ..config(21011, 2)
  };
  let second = LocalAgent::start(PeerId(2), config.clone()).await.unwrap();
  sleep(Duration::from_millis(1500)).await;
  assert_eq!(second.get(PeerId(1)).await, Some(HeartbeatRecord::new(0, false)));

  let first = LocalAgent::start(PeerId(1), config.clone()).await.unwrap();
  sleep(Duration::from_millis(1500)).await;
  let rec = second.get(PeerId(1)).await.unwrap();
  assert!(rec.alive && rec.clock >= 1, "node-1 not recovered: {}", rec);
  assert!(first.get(PeerId(2)).await.unwrap().alive);

  first.shutdown().await;
  assert_eq!(first.snapshot().await, None);
  assert_eq!(second.snapshot().await.map(|s| s.len()), Some(2));
  second.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn news_travels_around_a_lossy_link() {
  let base = GossipConfig {
    heartbeat: Duration::from_millis(250),
    fault_duration: Duration::from_millis(1000),
    ..config(21021, 3)
  };
  // Everything node-1 sends to node-3 is lost. Node-3 can only learn of it through node-2.
  let lossy = GossipConfig {
    failure: FailureConfigMap::partition(base.socket_of(PeerId(3))),
    ..base.clone()
  };
  let agents = vec![
    LocalAgent::start(PeerId(1), lossy).await.unwrap(),
    LocalAgent::start(PeerId(2), base.clone()).await.unwrap(),
    LocalAgent::start(PeerId(3), base.clone()).await.unwrap(),
  ];

  sleep(Duration::from_millis(2500)).await;
  let rec = agents[2].get(PeerId(1)).await.unwrap();
  assert!(rec.alive && rec.clock >= 2, "node-3 lost track of node-1: {}", rec);

  for agent in agents.iter() {
    agent.shutdown().await;
  }
}
