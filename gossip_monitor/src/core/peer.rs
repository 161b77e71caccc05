use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifies a participant in the gossip protocol. Each id maps to exactly one local port.
#[derive(
  Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize,
)]
pub struct PeerId(pub u32);
impl PeerId {
  pub const KEY_PREFIX: &'static str = "node-";

  /// The key this peer is stored under on the wire, e.g. `node-3`.
  pub fn key(&self) -> String {
    format!("{}{}", Self::KEY_PREFIX, self.0)
  }

  /// Parses a wire key of the form `node-<id>`.
  pub fn from_key(key: &str) -> Result<PeerId, PeerIdError> {
    key
      .strip_prefix(Self::KEY_PREFIX)
      .ok_or_else(|| PeerIdError(key.to_string()))
      .and_then(|id| id.parse::<u32>().map(PeerId).map_err(|_| PeerIdError(key.to_string())))
  }
}
impl fmt::Display for PeerId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{}", Self::KEY_PREFIX, self.0)
  }
}
impl FromStr for PeerId {
  type Err = PeerIdError;

  /// Accepts both the bare numeric id and the `node-<id>` form.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    match s.parse::<u32>() {
      Ok(id) => Ok(PeerId(id)),
      Err(_) => PeerId::from_key(s),
    }
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid peer id: {0:?}")]
pub struct PeerIdError(pub String);

/// What one process believes about one peer.
///
/// The clock for a peer is only ever advanced by that peer itself. Everybody else just copies the
/// newest value they have heard of, so within any single view the clock never goes backwards.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct HeartbeatRecord {
  pub clock: u64,
  pub alive: bool,
}
impl HeartbeatRecord {
  pub const fn new(clock: u64, alive: bool) -> HeartbeatRecord {
    HeartbeatRecord {
      clock: clock,
      alive: alive,
    }
  }

  /// The seed value every configured peer starts with.
  pub const fn seed() -> HeartbeatRecord {
    HeartbeatRecord::new(0, true)
  }

  /// Whether `incoming` should replace `self`. A strictly newer clock always wins; a flipped
  /// liveness flag also wins on an equal clock, so a locally detected fault can spread without a
  /// clock bump.
  pub fn superseded_by(&self, incoming: &HeartbeatRecord) -> bool {
    incoming.clock > self.clock || (incoming.alive != self.alive && incoming.clock >= self.clock)
  }
}
impl Default for HeartbeatRecord {
  /// The record reported for a peer nobody has heard of.
  fn default() -> Self {
    HeartbeatRecord::new(0, false)
  }
}
impl fmt::Display for HeartbeatRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}, {}]", self.clock, self.alive)
  }
}

#[test]
fn test_peer_id_parsing() {
  assert_eq!("3".parse::<PeerId>(), Ok(PeerId(3)));
  assert_eq!("node-12".parse::<PeerId>(), Ok(PeerId(12)));
  assert_eq!(PeerId(7).key(), "node-7");
  assert!(PeerId::from_key("7").is_err());
  assert!(PeerId::from_key("node-").is_err());
  assert!("node-x".parse::<PeerId>().is_err());
  assert!("-1".parse::<PeerId>().is_err());
}

#[test]
fn test_superseded_by() {
  let local = HeartbeatRecord::new(5, true);
  assert!(local.superseded_by(&HeartbeatRecord::new(6, true)));
  assert!(local.superseded_by(&HeartbeatRecord::new(6, false)));
  assert!(local.superseded_by(&HeartbeatRecord::new(5, false)));
  assert!(!local.superseded_by(&HeartbeatRecord::new(5, true)));
  assert!(!local.superseded_by(&HeartbeatRecord::new(4, false)));
  assert!(!local.superseded_by(&HeartbeatRecord::new(4, true)));
}
