use crate::core::{Host, PeerId, Socket};
use crate::testkit::{FailureConfig, FailureConfigMap};
use clap::error::ErrorKind;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configures every agent of a cluster and the coordinator supervising them. All processes of one
/// cluster must be started with the same values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GossipConfig {
  /// The number of agents. Agents are numbered `1..=node_count`.
  ///
  /// default: `4`
  pub node_count: u32,
  /// The number of neighbors each agent picks at random to gossip to every heartbeat. The
  /// coordinator is always sent to in addition to these.
  ///
  /// default: `2`
  pub fanout: usize,
  /// The interval at which agents advance their own clock and gossip.
  ///
  /// default: `2 seconds`
  pub heartbeat: Duration,
  /// How long an agent waits for fresh news about a peer before declaring it a fault.
  ///
  /// default: `4 seconds`
  pub fault_duration: Duration,
  /// The port of agent 1. Agent `n` listens on `starting_port + n - 1` and the coordinator on
  /// `starting_port - 1`.
  ///
  /// default: `10000`
  pub starting_port: u16,
  /// The delay between two agent terminations during a coordinator shutdown.
  ///
  /// default: `6 seconds`
  pub kill_pacing: Duration,
  /// How long a status query waits for a reply, and how long an agent waits for a status request
  /// to arrive on an accepted connection.
  ///
  /// default: `2 seconds`
  pub query_timeout: Duration,
  /// The host every process of the cluster runs on.
  ///
  /// default: `127.0.0.1`
  pub host: Host,
  /// Artificial loss and delay applied to outgoing gossip. Only useful for testing.
  ///
  /// default: no loss, no delay
  pub failure: FailureConfigMap,
}
impl Default for GossipConfig {
  #[inline]
  fn default() -> Self {
    GossipConfig {
      node_count: 4,
      fanout: 2,
      heartbeat: Duration::from_secs(2),
      fault_duration: Duration::from_secs(4),
      starting_port: 10000,
      kill_pacing: Duration::from_secs(6),
      query_timeout: Duration::from_secs(2),
      host: Host::default(),
      failure: FailureConfigMap::default(),
    }
  }
}
impl GossipConfig {
  /// Every configured agent, in order.
  pub fn peers(&self) -> impl Iterator<Item = PeerId> {
    (1..=self.node_count).map(PeerId)
  }

  pub fn is_configured(&self, peer: PeerId) -> bool {
    peer.0 >= 1 && peer.0 <= self.node_count
  }

  pub fn port_of(&self, peer: PeerId) -> u16 {
    (self.starting_port as u32 + peer.0 - 1) as u16
  }

  pub fn socket_of(&self, peer: PeerId) -> Socket {
    Socket::on_port(self.host.clone(), self.port_of(peer))
  }

  pub fn coordinator_port(&self) -> u16 {
    self.starting_port.saturating_sub(1)
  }

  /// Checks that the coordinator port and every agent port fall within `1..=65535`. Port numbers
  /// are only meaningful for a configuration that passes.
  pub fn check_ports(&self) -> Result<(), String> {
    if self.node_count == 0 {
      return Err("the cluster needs at least one agent".to_string());
    }
    if self.starting_port < 2 {
      return Err(format!(
        "starting port {} leaves no port below it for the coordinator",
        self.starting_port
      ));
    }
    let last = self.starting_port as u64 + self.node_count as u64 - 1;
    if last > u16::MAX as u64 {
      return Err(format!(
        "{} agents from port {} would need port {}, above {}",
        self.node_count,
        self.starting_port,
        last,
        u16::MAX
      ));
    }
    Ok(())
  }

  pub fn coordinator_socket(&self) -> Socket {
    Socket::on_port(self.host.clone(), self.coordinator_port())
  }

  /// The command line arguments that start agent `id` of this cluster with the `gossip-node`
  /// binary.
  pub fn node_args(&self, id: PeerId) -> Vec<String> {
    let mut args = vec![
      "--id".to_string(),
      id.0.to_string(),
      "-n".to_string(),
      self.node_count.to_string(),
      "-m".to_string(),
      self.fanout.to_string(),
      "-b".to_string(),
      self.heartbeat.as_secs_f64().to_string(),
      "-f".to_string(),
      self.fault_duration.as_secs_f64().to_string(),
      "-p".to_string(),
      self.starting_port.to_string(),
      "-d".to_string(),
      self.kill_pacing.as_secs_f64().to_string(),
      "--host".to_string(),
      self.host.to_string(),
    ];
    let drop_prob = self.failure.cluster_wide.drop_prob;
    if drop_prob > 0.0 {
      args.push("--drop-prob".to_string());
      args.push(drop_prob.to_string());
    }
    args
  }
}

// The cluster flags both binaries accept. `GossipConfig::node_args` renders the same flags.
#[derive(Args, Clone, Debug)]
pub struct ClusterArgs {
  /// Number of agents
  #[arg(short = 'n', long, default_value_t = 4)]
  pub node_count: u32,
  /// Neighbors gossiped to per heartbeat
  #[arg(short = 'm', long, default_value_t = 2)]
  pub fanout: usize,
  /// Heartbeat period in seconds
  #[arg(short = 'b', long, default_value = "2", value_parser = parse_secs)]
  pub heartbeat: Duration,
  /// Fault timeout in seconds
  #[arg(short = 'f', long, default_value = "4", value_parser = parse_secs)]
  pub fault_duration: Duration,
  /// Port of agent 1; the coordinator uses the port below it
  #[arg(short = 'p', long, default_value_t = 10000)]
  pub starting_port: u16,
  /// Delay between terminations when shutting down, in seconds
  #[arg(short = 'd', long, default_value = "6", value_parser = parse_secs)]
  pub kill_pacing: Duration,
  /// Host every process runs on
  #[arg(long, default_value = "127.0.0.1")]
  pub host: String,
  /// Probability of dropping each outgoing gossip datagram
  #[arg(long, default_value_t = 0.0)]
  pub drop_prob: f64,
}
impl ClusterArgs {
  /// Builds the configuration, rejecting ports out of range and drop probabilities outside
  /// `[0, 1]`.
  pub fn to_config(&self) -> Result<GossipConfig, clap::Error> {
    let invalid = |msg: String| clap::Error::raw(ErrorKind::ValueValidation, format!("{}\n", msg));
    if !(0.0..=1.0).contains(&self.drop_prob) {
      return Err(invalid(format!("drop probability {} is not within [0, 1]", self.drop_prob)));
    }
    let mut failure = FailureConfigMap::default();
    failure.cluster_wide = FailureConfig {
      drop_prob: self.drop_prob,
      delay: None,
    };
    let config = GossipConfig {
      node_count: self.node_count,
      fanout: self.fanout,
      heartbeat: self.heartbeat,
      fault_duration: self.fault_duration,
      starting_port: self.starting_port,
      kill_pacing: self.kill_pacing,
      host: Host::from(self.host.clone()),
      failure: failure,
      ..GossipConfig::default()
    };
    config.check_ports().map_err(invalid)?;
    Ok(config)
  }
}

fn parse_secs(s: &str) -> Result<Duration, String> {
  let secs = s.parse::<f64>().map_err(|e| e.to_string())?;
  Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

#[test]
fn test_ports() {
  let config = GossipConfig {
    starting_port: 4000,
    ..GossipConfig::default()
  };
  assert_eq!(config.port_of(PeerId(1)), 4000);
  assert_eq!(config.port_of(PeerId(4)), 4003);
  assert_eq!(config.coordinator_port(), 3999);
  assert_eq!(config.peers().collect::<Vec<_>>(), vec![PeerId(1), PeerId(2), PeerId(3), PeerId(4)]);
  assert!(config.is_configured(PeerId(4)));
  assert!(!config.is_configured(PeerId(0)));
  assert!(!config.is_configured(PeerId(5)));
}

#[test]
fn test_node_args() {
  let config = GossipConfig {
    heartbeat: Duration::from_millis(1500),
    ..GossipConfig::default()
  };
  let args = config.node_args(PeerId(3));
  assert_eq!(&args[..2], &["--id".to_string(), "3".to_string()]);
  assert!(args.windows(2).any(|w| w[0] == "-b" && w[1] == "1.5"));
  assert!(!args.contains(&"--drop-prob".to_string()));
}

#[test]
fn test_node_args_parse_back() {
  use clap::Parser;
  #[derive(Parser)]
  struct Node {
    #[arg(long)]
    id: u32,
    #[command(flatten)]
    cluster: ClusterArgs,
  }
  let config = GossipConfig {
    node_count: 3,
    heartbeat: Duration::from_millis(250),
    starting_port: 5000,
    ..GossipConfig::default()
  };
  let args = std::iter::once("gossip-node".to_string()).chain(config.node_args(PeerId(2)));
  let parsed = Node::parse_from(args);
  assert_eq!(parsed.id, 2);
  let back = parsed.cluster.to_config().unwrap();
  assert_eq!(back.node_count, 3);
  assert_eq!(back.heartbeat, Duration::from_millis(250));
  assert_eq!(back.fault_duration, config.fault_duration);
  assert_eq!(back.starting_port, 5000);
  assert_eq!(back.host, config.host);
  assert!(back.failure.cluster_wide.is_reliable());
}

#[test]
fn test_port_range_is_checked() {
  use clap::Parser;
  #[derive(Parser)]
  struct Cli {
    #[command(flatten)]
    cluster: ClusterArgs,
  }
  let parse = |args: &[&str]| {
    Cli::parse_from(std::iter::once("gossip-coordinator").chain(args.iter().copied()))
      .cluster
      .to_config()
  };
  let bad: [&[&str]; 4] = [&["-p", "0"], &["-p", "1"], &["-p", "65535", "-n", "2"], &["-n", "0"]];
  for bad in bad.iter() {
    let err = parse(*bad).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::ValueValidation, "{:?}", bad);
  }
  let err = parse(&["--drop-prob", "1.5"]).err().unwrap();
  assert_eq!(err.kind(), ErrorKind::ValueValidation);

  let edge = parse(&["-p", "65532", "-n", "4"]).unwrap();
  assert_eq!(edge.port_of(PeerId(4)), u16::MAX);
  assert_eq!(edge.coordinator_port(), 65531);
  assert_eq!(parse(&["-p", "2", "-n", "1"]).unwrap().coordinator_port(), 1);

  let wrapped = GossipConfig {
    starting_port: 0,
    ..GossipConfig::default()
  };
  assert!(wrapped.check_ports().is_err());
  assert_eq!(wrapped.coordinator_port(), 0);
}
