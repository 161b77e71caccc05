use crate::core::Socket;
use im::HashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How unreliable the link to a destination should be made to look.
#[derive(Default, Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct FailureConfig {
  /// Probability in `[0, 1]` that a datagram is silently dropped.
  pub drop_prob: f64,
  /// If set, every datagram that survives is held back for a random time in this range.
  pub delay: Option<(Duration, Duration)>,
}
impl FailureConfig {
  pub fn is_reliable(&self) -> bool {
    self.drop_prob <= 0.0 && self.delay.is_none()
  }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FailureConfigMap {
  pub cluster_wide: FailureConfig,
  pub node_wide: HashMap<Socket, FailureConfig>,
}
impl FailureConfigMap {
  pub fn get(&self, socket: &Socket) -> &FailureConfig {
    self.node_wide.get(socket).unwrap_or(&self.cluster_wide)
  }

  /// A map that loses every datagram sent to `socket` and nothing else.
  pub fn partition(socket: Socket) -> FailureConfigMap {
    let mut map = FailureConfigMap::default();
    map.node_wide.insert(
      socket,
      FailureConfig {
        drop_prob: 1.0,
        delay: None,
      },
    );
    map
  }
}

#[test]
fn test_failure_config_lookup() {
  use crate::core::Host;
  let lossy = Socket::on_port(Host::default(), 4001);
  let map = FailureConfigMap::partition(lossy.clone());
  assert_eq!(map.get(&lossy).drop_prob, 1.0);
  assert!(map.get(&Socket::on_port(Host::default(), 4002)).is_reliable());
}
