use crate::cluster::StatusDictionary;
use crate::coordinator::AgentHandle;
use crate::core::{serialize_status, PeerId, StatusMap};
use std::collections::BTreeMap;
use std::fmt;

/// Where an agent is in its life, as far as the coordinator can tell.
///
/// `Killed` only ever follows an explicit kill. `Faulted` is read off the aggregated view and
/// turns back into `Running` as soon as the view shows the agent alive again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lifecycle {
  NotStarted,
  Running,
  Faulted,
  Killed,
}
impl Lifecycle {
  /// Whether the coordinator holds a handle to a live agent.
  pub fn is_active(&self) -> bool {
    matches!(self, Lifecycle::Running | Lifecycle::Faulted)
  }
}

struct RegistryEntry {
  handle: Option<Box<dyn AgentHandle>>,
  snapshot: Option<StatusMap>,
  lifecycle: Lifecycle,
}
impl Default for RegistryEntry {
  fn default() -> Self {
    RegistryEntry {
      handle: None,
      snapshot: None,
      lifecycle: Lifecycle::NotStarted,
    }
  }
}

/// Every configured agent and what the coordinator holds for it.
#[derive(Default)]
pub struct Registry {
  entries: BTreeMap<PeerId, RegistryEntry>,
}
impl Registry {
  pub fn new<I: IntoIterator<Item = PeerId>>(peers: I) -> Registry {
    Registry {
      entries: peers.into_iter().map(|p| (p, RegistryEntry::default())).collect(),
    }
  }

  pub fn lifecycle(&self, id: PeerId) -> Option<Lifecycle> {
    self.entries.get(&id).map(|e| e.lifecycle)
  }

  pub fn is_active(&self, id: PeerId) -> bool {
    self.lifecycle(id).map_or(false, |l| l.is_active())
  }

  /// Every agent with a live handle, in id order.
  pub fn active(&self) -> Vec<PeerId> {
    self.entries.iter().filter(|(_, e)| e.lifecycle.is_active()).map(|(id, _)| *id).collect()
  }

  pub fn register(&mut self, id: PeerId, handle: Box<dyn AgentHandle>) {
    let entry = self.entries.entry(id).or_default();
    entry.handle = Some(handle);
    entry.lifecycle = Lifecycle::Running;
  }

  /// Takes the handle of an active agent out of the registry and marks it killed.
  pub fn remove(&mut self, id: PeerId) -> Option<Box<dyn AgentHandle>> {
    let entry = self.entries.get_mut(&id).filter(|e| e.lifecycle.is_active())?;
    entry.lifecycle = Lifecycle::Killed;
    entry.handle.take()
  }

  /// The last status map heard from or about this agent, by gossip or by a direct query.
  pub fn snapshot(&self, id: PeerId) -> Option<&StatusMap> {
    self.entries.get(&id).and_then(|e| e.snapshot.as_ref())
  }

  pub fn record_snapshot(&mut self, id: PeerId, snapshot: StatusMap) {
    if let Some(entry) = self.entries.get_mut(&id) {
      entry.snapshot = Some(snapshot);
    }
  }

  /// Moves active agents between `Running` and `Faulted` to match the aggregated view.
  pub fn observe(&mut self, view: &StatusDictionary) {
    for (id, entry) in self.entries.iter_mut() {
      if !view.contains(*id) {
        continue;
      }
      entry.lifecycle = match (entry.lifecycle, view.get(*id).alive) {
        (Lifecycle::Running, false) => Lifecycle::Faulted,
        (Lifecycle::Faulted, true) => Lifecycle::Running,
        (other, _) => other,
      };
    }
  }
}
impl fmt::Display for Registry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{{")?;
    for (id, entry) in self.entries.iter() {
      write!(f, " '{}': {:?}", id, entry.lifecycle)?;
      if let Some(handle) = &entry.handle {
        write!(f, " ({})", handle.describe())?;
      }
      if let Some(snapshot) = &entry.snapshot {
        write!(f, ", last status {}", serialize_status(snapshot))?;
      }
      writeln!(f, ",")?;
    }
    write!(f, "}}")
  }
}
