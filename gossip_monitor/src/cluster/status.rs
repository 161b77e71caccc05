use crate::core::{HeartbeatRecord, PeerId, StatusMap};
use itertools::Itertools;
use std::fmt;

/// A record that [`StatusDictionary::merge`] actually replaced (or added).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusChange {
  pub peer: PeerId,
  pub before: HeartbeatRecord,
  pub after: HeartbeatRecord,
}
impl StatusChange {
  /// Whether this change is fresh evidence the peer is running, which restarts its fault timer.
  /// A change that only lowers the liveness flag on an equal clock is not.
  pub fn rearms(&self) -> bool {
    self.after.clock > self.before.clock || self.after.alive
  }
}

/// One process's view of every peer it knows about.
///
/// Agents own exactly one entry, their own, which incoming gossip can never touch. The
/// coordinator's dictionary has no owner, so every entry is open to merging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusDictionary {
  owner: Option<PeerId>,
  records: StatusMap,
}
impl StatusDictionary {
  /// A dictionary owned by the agent `owner`, seeded with every configured peer as alive at
  /// clock zero.
  pub fn owned<I: IntoIterator<Item = PeerId>>(owner: PeerId, peers: I) -> StatusDictionary {
    let mut dict = StatusDictionary::aggregate(peers);
    dict.records.insert(owner, HeartbeatRecord::seed());
    dict.owner = Some(owner);
    dict
  }

  /// An ownerless dictionary, as kept by the coordinator.
  pub fn aggregate<I: IntoIterator<Item = PeerId>>(peers: I) -> StatusDictionary {
    StatusDictionary {
      owner: None,
      records: peers.into_iter().map(|p| (p, HeartbeatRecord::seed())).collect(),
    }
  }

  pub fn owner(&self) -> Option<PeerId> {
    self.owner
  }

  /// The stored record, or a dead record at clock zero for a peer never heard of.
  pub fn get(&self, peer: PeerId) -> HeartbeatRecord {
    self.records.get(&peer).copied().unwrap_or_default()
  }

  pub fn contains(&self, peer: PeerId) -> bool {
    self.records.contains_key(&peer)
  }

  pub fn peers(&self) -> impl Iterator<Item = PeerId> + '_ {
    self.records.keys().copied()
  }

  pub fn snapshot(&self) -> StatusMap {
    self.records.clone()
  }

  /// Folds a received view into this one and reports every record that changed, in peer order.
  ///
  /// A record is replaced when the incoming clock is newer, or when the liveness flag differs and
  /// the incoming clock is at least as new. Peers never seen before are added as received. The
  /// owner's own record is skipped.
  pub fn merge(&mut self, incoming: &StatusMap) -> Vec<StatusChange> {
    let mut changes = Vec::new();
    for (peer, theirs) in incoming.iter() {
      if Some(*peer) == self.owner {
        continue;
      }
      let change = match self.records.get(peer) {
        Some(ours) if ours.superseded_by(theirs) => Some(StatusChange {
          peer: *peer,
          before: *ours,
          after: *theirs,
        }),
        Some(_) => None,
        None => Some(StatusChange {
          peer: *peer,
          before: HeartbeatRecord::default(),
          after: *theirs,
        }),
      };
      if let Some(change) = change {
        self.records.insert(change.peer, change.after);
        changes.push(change);
      }
    }
    changes
  }

  /// Advances the owner's clock and marks it alive. Returns the new record, or `None` for an
  /// ownerless dictionary.
  pub fn tick(&mut self) -> Option<HeartbeatRecord> {
    let owner = self.owner?;
    let next = HeartbeatRecord::new(self.get(owner).clock + 1, true);
    self.records.insert(owner, next);
    Some(next)
  }

  /// Marks `peer` dead without touching its clock. Returns whether anything changed. The owner
  /// cannot be marked dead.
  pub fn mark_dead(&mut self, peer: PeerId) -> bool {
    if Some(peer) == self.owner {
      return false;
    }
    match self.records.get_mut(&peer) {
      Some(rec) if rec.alive => {
        rec.alive = false;
        true
      }
      _ => false,
    }
  }
}
impl From<StatusMap> for StatusDictionary {
  /// An ownerless dictionary holding exactly `records`.
  fn from(records: StatusMap) -> Self {
    StatusDictionary {
      owner: None,
      records: records,
    }
  }
}
impl fmt::Display for StatusDictionary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let body = self.records.iter().map(|(peer, rec)| format!(" '{}': {}", peer, rec)).join(",\n");
    write!(f, "{{\n{}\n}}", body)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use maplit::btreeset;
  use std::collections::BTreeSet;

  fn rec(clock: u64, alive: bool) -> HeartbeatRecord {
    HeartbeatRecord::new(clock, alive)
  }

  fn ids(range: std::ops::RangeInclusive<u32>) -> Vec<PeerId> {
    range.map(PeerId).collect()
  }

  #[test]
  fn test_seeding() {
    let dict = StatusDictionary::owned(PeerId(2), ids(1..=3));
    assert_eq!(dict.peers().count(), 3);
    assert!(dict.peers().all(|p| dict.get(p) == rec(0, true)));
    assert_eq!(dict.get(PeerId(9)), rec(0, false));
    assert!(!dict.contains(PeerId(9)));
  }

  #[test]
  fn test_merge() {
    let mut local = StatusDictionary::owned(PeerId(1), ids(1..=6));
    local.records.insert(PeerId(2), rec(5, true));
    local.records.insert(PeerId(3), rec(5, true));
    local.records.insert(PeerId(4), rec(5, false));
    local.records.insert(PeerId(5), rec(5, true));
    local.records.insert(PeerId(6), rec(5, true));

    let recvd = im::ordmap! {
      PeerId(1) => rec(99, false),
      PeerId(2) => rec(6, true),
      PeerId(3) => rec(5, false),
      PeerId(4) => rec(4, true),
      PeerId(5) => rec(5, true),
      PeerId(6) => rec(4, false),
      PeerId(7) => rec(2, true)
    };
    let changes = local.merge(&recvd);

    assert_eq!(local.get(PeerId(1)), rec(0, true));
    assert_eq!(local.get(PeerId(2)), rec(6, true));
    assert_eq!(local.get(PeerId(3)), rec(5, false));
    assert_eq!(local.get(PeerId(4)), rec(5, false));
    assert_eq!(local.get(PeerId(5)), rec(5, true));
    assert_eq!(local.get(PeerId(6)), rec(5, true));
    assert_eq!(local.get(PeerId(7)), rec(2, true));

    let changed = changes.iter().map(|c| c.peer).collect::<BTreeSet<_>>();
    assert_eq!(changed, btreeset! {PeerId(2), PeerId(3), PeerId(7)});
    let rearmed = changes.iter().filter(|c| c.rearms()).map(|c| c.peer).collect::<BTreeSet<_>>();
    assert_eq!(rearmed, btreeset! {PeerId(2), PeerId(7)});
  }

  #[test]
  fn test_alive_flip_on_equal_clock_rearms() {
    let mut local = StatusDictionary::owned(PeerId(1), ids(1..=2));
    local.records.insert(PeerId(2), rec(3, false));
    let changes = local.merge(&im::ordmap! {PeerId(2) => rec(3, true)});
    assert_eq!(changes.len(), 1);
    assert!(changes[0].rearms());
    assert_eq!(local.get(PeerId(2)), rec(3, true));
  }

  #[test]
  fn test_merge_is_idempotent() {
    let mut local = StatusDictionary::owned(PeerId(1), ids(1..=3));
    let recvd = im::ordmap! {PeerId(2) => rec(4, true), PeerId(3) => rec(2, false)};
    assert_eq!(local.merge(&recvd).len(), 2);
    let before = local.clone();
    assert!(local.merge(&recvd).is_empty());
    assert_eq!(local, before);
  }

  #[test]
  fn test_clock_is_monotonic() {
    let mut local = StatusDictionary::aggregate(ids(1..=1));
    let sequence = [
      rec(3, true),
      rec(1, true),
      rec(3, false),
      rec(2, true),
      rec(3, true),
      rec(7, false),
      rec(5, true),
      rec(7, true),
      rec(0, false),
    ];
    let mut max_accepted = 0;
    let mut last = 0;
    for incoming in sequence.iter() {
      let changes = local.merge(&im::ordmap! {PeerId(1) => *incoming});
      if !changes.is_empty() {
        max_accepted = max_accepted.max(incoming.clock);
      }
      let clock = local.get(PeerId(1)).clock;
      assert!(clock >= last);
      assert_eq!(clock, max_accepted);
      last = clock;
    }
    assert_eq!(local.get(PeerId(1)), rec(7, true));
  }

  #[test]
  fn test_ownerless_dictionary_merges_everything() {
    let mut view = StatusDictionary::aggregate(ids(1..=2));
    let changes = view.merge(&im::ordmap! {PeerId(1) => rec(1, true), PeerId(2) => rec(0, false)});
    assert_eq!(changes.len(), 2);
    assert_eq!(view.tick(), None);
    assert_eq!(view.get(PeerId(2)), rec(0, false));
  }

  #[test]
  fn test_tick_and_mark_dead() {
    let mut dict = StatusDictionary::owned(PeerId(1), ids(1..=2));
    assert_eq!(dict.tick(), Some(rec(1, true)));
    assert_eq!(dict.tick(), Some(rec(2, true)));
    assert!(!dict.mark_dead(PeerId(1)));
    assert!(dict.mark_dead(PeerId(2)));
    assert!(!dict.mark_dead(PeerId(2)));
    assert!(!dict.mark_dead(PeerId(5)));
    assert_eq!(dict.get(PeerId(2)), rec(0, false));
  }
}
