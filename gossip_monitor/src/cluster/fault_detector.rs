use crate::cluster::{StatusChange, StatusDictionary};
use crate::core::{PeerId, StatusMap};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

/// Everything one agent knows, behind the one lock its loops and timers share.
///
/// Every read-modify-write on the dictionary or the timer table happens while holding this lock,
/// so a merge and the rearms it causes are atomic with respect to a firing timer.
pub struct PeerTable {
  pub dict: StatusDictionary,
  pub detector: FaultDetector,
}
impl PeerTable {
  /// Wraps `dict` together with a detector whose timers fire into the returned table.
  pub fn shared(dict: StatusDictionary, fault_duration: Duration) -> Arc<Mutex<PeerTable>> {
    Arc::new_cyclic(|table| {
      Mutex::new(PeerTable {
        dict: dict,
        detector: FaultDetector::new(fault_duration, table.clone()),
      })
    })
  }

  /// Arms a timer for every peer except the owner. Needs a tokio runtime.
  pub fn arm_all(&mut self) {
    let owner = self.dict.owner();
    for peer in self.dict.peers().filter(|p| Some(*p) != owner).collect::<Vec<_>>() {
      self.detector.arm(peer);
    }
  }

  /// Merges received gossip, then restarts the timer of every peer the merge showed to be alive.
  pub fn apply(&mut self, incoming: &StatusMap) -> Vec<StatusChange> {
    let changes = self.dict.merge(incoming);
    for change in changes.iter().filter(|c| c.rearms()) {
      self.detector.rearm(change.peer);
    }
    changes
  }

  fn fire(&mut self, peer: PeerId, generation: u64) {
    if !self.detector.disarm_fired(peer, generation) {
      debug!(%peer, generation, "stale fault timer ignored");
      return;
    }
    if self.dict.mark_dead(peer) {
      info!(%peer, record = %self.dict.get(peer), "peer became a fault");
    }
  }
}

/// Locks the table, recovering it if a previous holder panicked. Every mutation leaves the table
/// consistent before anything that could panic, so the data is still good.
pub fn lock_table(table: &Mutex<PeerTable>) -> MutexGuard<'_, PeerTable> {
  table.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Armed {
  generation: u64,
  handle: JoinHandle<()>,
}

/// One fault timer per peer. A timer that runs out marks its peer dead, once.
///
/// Every arming gets a fresh generation number. A timer only acts if its generation is still the
/// one in the table, so a timer that was cancelled after it woke up, but before it got the lock,
/// does nothing.
pub struct FaultDetector {
  duration: Duration,
  timers: HashMap<PeerId, Armed>,
  next_generation: u64,
  fired: u64,
  table: Weak<Mutex<PeerTable>>,
}
impl FaultDetector {
  fn new(duration: Duration, table: Weak<Mutex<PeerTable>>) -> FaultDetector {
    FaultDetector {
      duration: duration,
      timers: HashMap::new(),
      next_generation: 0,
      fired: 0,
      table: table,
    }
  }

  pub fn is_armed(&self, peer: PeerId) -> bool {
    self.timers.contains_key(&peer)
  }

  pub fn armed(&self) -> usize {
    self.timers.len()
  }

  /// How many timers have run out over this detector's lifetime.
  pub fn fired(&self) -> u64 {
    self.fired
  }

  /// Starts a timer for `peer` unless one is already running.
  pub fn arm(&mut self, peer: PeerId) {
    if self.timers.contains_key(&peer) {
      return;
    }
    let generation = self.next_generation;
    self.next_generation += 1;
    let table = self.table.clone();
    let duration = self.duration;
    let handle = tokio::spawn(async move {
      sleep(duration).await;
      if let Some(table) = table.upgrade() {
        lock_table(&table).fire(peer, generation);
      }
    });
    self.timers.insert(
      peer,
      Armed {
        generation: generation,
        handle: handle,
      },
    );
  }

  /// Cancels any running timer for `peer` and starts a new one.
  pub fn rearm(&mut self, peer: PeerId) {
    self.cancel(peer);
    self.arm(peer);
  }

  pub fn cancel(&mut self, peer: PeerId) {
    if let Some(armed) = self.timers.remove(&peer) {
      armed.handle.abort();
    }
  }

  pub fn cancel_all(&mut self) {
    for (_, armed) in self.timers.drain() {
      armed.handle.abort();
    }
  }

  fn disarm_fired(&mut self, peer: PeerId, generation: u64) -> bool {
    match self.timers.get(&peer) {
      Some(armed) if armed.generation == generation => {
        self.timers.remove(&peer);
        self.fired += 1;
        true
      }
      _ => false,
    }
  }
}
impl Drop for FaultDetector {
  fn drop(&mut self) {
    self.cancel_all();
  }
}
