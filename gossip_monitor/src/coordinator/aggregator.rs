use crate::cluster::{StatusChange, StatusDictionary};
use crate::core::{
  udp_recv_gossip, GossipMessage, PeerId, Socket, StatusMap, TransportError, MAX_DATAGRAM,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, trace, warn, Instrument};

/// Everything the coordinator has heard from the agents.
pub struct AggregatedView {
  /// All received gossip merged together. Nobody owns this dictionary and it runs no fault timers,
  /// so a peer only turns dead here once some agent has declared it dead.
  pub merged: StatusDictionary,
  /// The latest snapshot each sender gossiped.
  pub reports: BTreeMap<PeerId, StatusMap>,
}
impl AggregatedView {
  pub fn new<I: IntoIterator<Item = PeerId>>(peers: I) -> AggregatedView {
    AggregatedView {
      merged: StatusDictionary::aggregate(peers),
      reports: BTreeMap::new(),
    }
  }

  pub fn fold(&mut self, msg: GossipMessage) -> Vec<StatusChange> {
    let changes = self.merged.merge(&msg.status);
    self.reports.insert(msg.sender, msg.status);
    changes
  }
}

pub fn lock_view(view: &Mutex<AggregatedView>) -> MutexGuard<'_, AggregatedView> {
  view.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The coordinator's receive loop. It listens for the gossip every agent sends it and folds each
/// datagram into the shared [`AggregatedView`].
pub struct Aggregator {
  socket: Socket,
  shutdown: watch::Sender<bool>,
  task: JoinHandle<()>,
}
impl Aggregator {
  pub async fn spawn(
    socket: Socket,
    view: Arc<Mutex<AggregatedView>>,
  ) -> Result<Aggregator, TransportError> {
    let udp = socket.bind_udp().await?;
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(aggregate(udp, view, rx).instrument(info_span!("aggregator")));
    info!(%socket, "aggregator listening");
    Ok(Aggregator {
      socket: socket,
      shutdown: tx,
      task: task,
    })
  }

  pub fn socket(&self) -> &Socket {
    &self.socket
  }

  pub async fn stop(self) {
    let _ = self.shutdown.send(true);
    let _ = self.task.await;
    info!(socket = %self.socket, "aggregator stopped");
  }
}

async fn aggregate(
  udp: UdpSocket,
  view: Arc<Mutex<AggregatedView>>,
  mut shutdown: watch::Receiver<bool>,
) {
  let mut buf = vec![0u8; MAX_DATAGRAM];
  loop {
    let received = tokio::select! {
      r = udp_recv_gossip(&udp, &mut buf) => r,
      _ = shutdown.changed() => break,
    };
    match received {
      Ok((msg, addr)) => {
        let sender = msg.sender;
        let changes = lock_view(&view).fold(msg);
        debug!(%sender, %addr, changed = changes.len(), "gossip aggregated");
        for change in changes.iter() {
          trace!(peer = %change.peer, before = %change.before, after = %change.after, "updated");
          if change.before.alive && !change.after.alive {
            info!(peer = %change.peer, "peer reported as a fault");
          }
        }
      }
      Err(TransportError::Wire(error)) => warn!(%error, "malformed gossip dropped"),
      Err(error) => warn!(%error, "gossip receive failed"),
    }
  }
}
