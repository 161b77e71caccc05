use gossip_monitor::cluster::{GossipAgent, GossipConfig};
use gossip_monitor::core::{udp_send, GossipMessage, HeartbeatRecord, PeerId};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::sleep;
use tokio_test::block_on;

#[test]
fn malformed_datagrams_are_dropped() {
  block_on(async {
    let config = GossipConfig {
      node_count: 3,
      heartbeat: Duration::from_secs(5),
      fault_duration: Duration::from_secs(10),
      starting_port: 24001,
      ..GossipConfig::default()
    };
    let agent = GossipAgent::start(PeerId(1), config.clone()).await.unwrap();
    let to = config.socket_of(PeerId(1));
    let probe = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let garbage: [&[u8]; 5] =
      [b"no separator", b"x#{}", b"2#not json", b"2#{\"node-2\":[1]}", b"\xff#"];
    for payload in garbage.iter() {
      udp_send(&probe, &to, payload).await.unwrap();
    }
    let valid = GossipMessage::new(
      PeerId(2),
      im::ordmap! {
        PeerId(1) => HeartbeatRecord::new(40, false),
        PeerId(2) => HeartbeatRecord::new(5, true),
        PeerId(3) => HeartbeatRecord::new(0, false)
      },
    );
    udp_send(&probe, &to, &valid.serialize()).await.unwrap();
    sleep(Duration::from_millis(300)).await;

    assert_eq!(agent.get(PeerId(2)), HeartbeatRecord::new(5, true));
    assert_eq!(agent.get(PeerId(3)), HeartbeatRecord::new(0, false));
    // Nobody else gets a say about the agent itself.
    assert_eq!(agent.get(PeerId(1)), HeartbeatRecord::new(0, true));
    agent.shutdown().await;
  });
}
