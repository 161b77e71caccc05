use crate::cluster::{lock_table, GossipConfig, PeerTable, StatusDictionary};
use crate::core::{
  serialize_status, udp_recv_gossip, GossipMessage, HeartbeatRecord, PeerId, Socket, StatusMap,
  TransportError, MAX_DATAGRAM, STATUS_REQUEST,
};
use crate::testkit::udp_send_unreliable;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, info_span, trace, warn, Instrument};

/// Longest status request line an agent will read.
const MAX_REQUEST: usize = 1024;

#[derive(Debug, Error)]
pub enum AgentError {
  #[error("{peer} is not a configured agent")]
  Unconfigured { peer: PeerId },
  #[error("could not bind {socket}: {source}")]
  Bind {
    socket: Socket,
    #[source]
    source: TransportError,
  },
}

/// A running participant in the gossip protocol.
///
/// Three loops run concurrently on the tokio runtime, sharing one [`PeerTable`]:
/// - the send loop advances this agent's clock every heartbeat and gossips a snapshot to a few
///   random neighbors and to the coordinator,
/// - the receive loop merges incoming gossip and rearms fault timers,
/// - the status responder answers `status` queries over TCP, one connection at a time.
///
/// Dropping the agent without calling [`shutdown`](GossipAgent::shutdown) also stops the loops, at
/// their next wake-up.
pub struct GossipAgent {
  id: PeerId,
  socket: Socket,
  table: Arc<Mutex<PeerTable>>,
  shutdown: watch::Sender<bool>,
  tasks: Vec<JoinHandle<()>>,
}
impl GossipAgent {
  pub async fn start(id: PeerId, config: GossipConfig) -> Result<GossipAgent, AgentError> {
    if !config.is_configured(id) {
      return Err(AgentError::Unconfigured { peer: id });
    }
    let socket = config.socket_of(id);
    info!(%id, %socket, ?config, "agent starting");

    let dict = StatusDictionary::owned(id, config.peers());
    let neighbors = config.peers().filter(|p| *p != id).map(|p| config.socket_of(p)).collect();
    let udp = socket.bind_udp().await.map_err(|source| AgentError::Bind {
      socket: socket.clone(),
      source: source,
    })?;
    let tcp = socket.bind_tcp().await.map_err(|source| AgentError::Bind {
      socket: socket.clone(),
      source: source,
    })?;

    let table = PeerTable::shared(dict, config.fault_duration);
    lock_table(&table).arm_all();

    let (tx, rx) = watch::channel(false);
    let udp = Arc::new(udp);
    let config = Arc::new(config);
    let span = info_span!("agent", %id);
    let tasks = vec![
      tokio::spawn(
        send_loop(id, udp.clone(), table.clone(), neighbors, config.clone(), rx.clone())
          .instrument(span.clone()),
      ),
      tokio::spawn(receive_loop(udp, table.clone(), rx.clone()).instrument(span.clone())),
      tokio::spawn(status_responder(tcp, table.clone(), config.query_timeout, rx).instrument(span)),
    ];
    info!(%id, "agent running");
    Ok(GossipAgent {
      id: id,
      socket: socket,
      table: table,
      shutdown: tx,
      tasks: tasks,
    })
  }

  pub fn id(&self) -> PeerId {
    self.id
  }

  pub fn socket(&self) -> &Socket {
    &self.socket
  }

  pub fn snapshot(&self) -> StatusMap {
    lock_table(&self.table).dict.snapshot()
  }

  pub fn get(&self, peer: PeerId) -> HeartbeatRecord {
    lock_table(&self.table).dict.get(peer)
  }

  /// Stops every loop, cancels every fault timer and closes both listeners.
  pub async fn shutdown(self) {
    info!(id = %self.id, "agent shutting down");
    let _ = self.shutdown.send(true);
    lock_table(&self.table).detector.cancel_all();
    for task in self.tasks {
      let _ = task.await;
    }
    info!(id = %self.id, "agent stopped");
  }

  /// Stops the agent the way a crash would: nothing is flushed and no one is told.
  pub fn kill(self) {
    for task in self.tasks.iter() {
      task.abort();
    }
    lock_table(&self.table).detector.cancel_all();
  }
}

async fn send_loop(
  id: PeerId,
  udp: Arc<UdpSocket>,
  table: Arc<Mutex<PeerTable>>,
  neighbors: Vec<Socket>,
  config: Arc<GossipConfig>,
  mut shutdown: watch::Receiver<bool>,
) {
  debug!("send loop started");
  let coordinator = config.coordinator_socket();
  let fanout = config.fanout.min(neighbors.len());
  let mut rng = SmallRng::from_entropy();
  let mut ticks = interval_at(Instant::now() + config.heartbeat, config.heartbeat);
  ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
  loop {
    tokio::select! {
      _ = ticks.tick() => {}
      _ = shutdown.changed() => break,
    }
    let (me, snapshot) = {
      let mut table = lock_table(&table);
      let me = table.dict.tick();
      (me, table.dict.snapshot())
    };
    let payload = GossipMessage::new(id, snapshot).serialize();
    let chosen = neighbors.choose_multiple(&mut rng, fanout).cloned().collect::<Vec<_>>();
    trace!(?me, to = ?chosen.iter().map(|s| s.udp).collect::<Vec<_>>(), "gossip round");
    for to in chosen.iter().chain(std::iter::once(&coordinator)) {
      if let Err(error) = udp_send_unreliable(&udp, to, payload.clone(), &config.failure).await {
        warn!(%to, %error, "gossip send failed");
      }
    }
  }
  debug!("send loop stopped");
}

async fn receive_loop(
  udp: Arc<UdpSocket>,
  table: Arc<Mutex<PeerTable>>,
  mut shutdown: watch::Receiver<bool>,
) {
  debug!("receive loop started");
  let mut buf = vec![0u8; MAX_DATAGRAM];
  loop {
    let received = tokio::select! {
      r = udp_recv_gossip(&udp, &mut buf) => r,
      _ = shutdown.changed() => break,
    };
    match received {
      Ok((msg, addr)) => {
        let changes = lock_table(&table).apply(&msg.status);
        debug!(sender = %msg.sender, %addr, changed = changes.len(), "gossip received");
        for change in changes.iter() {
          trace!(peer = %change.peer, before = %change.before, after = %change.after, "updated");
        }
      }
      Err(TransportError::Wire(error)) => warn!(%error, "malformed gossip dropped"),
      Err(error) => warn!(%error, "gossip receive failed"),
    }
  }
  debug!("receive loop stopped");
}

async fn status_responder(
  tcp: TcpListener,
  table: Arc<Mutex<PeerTable>>,
  limit: Duration,
  mut shutdown: watch::Receiver<bool>,
) {
  debug!("status responder started");
  loop {
    let accepted = tokio::select! {
      r = tcp.accept() => r,
      _ = shutdown.changed() => break,
    };
    let (stream, addr) = match accepted {
      Ok(accepted) => accepted,
      Err(error) => {
        warn!(%error, "accept failed");
        continue;
      }
    };
    match timeout(limit, answer_status(stream, &table)).await {
      Ok(Ok(true)) => debug!(%addr, "status sent"),
      Ok(Ok(false)) => debug!(%addr, "unknown request ignored"),
      Ok(Err(error)) => warn!(%addr, %error, "status request failed"),
      Err(_) => warn!(%addr, "status request timed out"),
    }
  }
  debug!("status responder stopped");
}

/// Reads a request: everything up to a newline, end of stream, or as soon as the bytes read so far
/// are exactly `status`, so a client that keeps its side open still gets an answer. Answers with
/// the current status map if the request is `status`, and closes the connection without a reply
/// otherwise.
async fn answer_status(
  mut stream: TcpStream,
  table: &Mutex<PeerTable>,
) -> Result<bool, TransportError> {
  let mut request = Vec::with_capacity(STATUS_REQUEST.len());
  let mut chunk = [0u8; 64];
  while request.len() < MAX_REQUEST && request != STATUS_REQUEST.as_bytes() {
    let n = stream.read(&mut chunk).await?;
    if n == 0 {
      break;
    }
    request.extend_from_slice(&chunk[..n]);
    if let Some(end) = request.iter().position(|b| *b == b'\n') {
      request.truncate(end);
      break;
    }
  }
  if request.strip_suffix(b"\r").unwrap_or(&request) != STATUS_REQUEST.as_bytes() {
    return Ok(false);
  }
  let reply = serialize_status(&lock_table(table).dict.snapshot());
  stream.write_all(reply.as_bytes()).await?;
  stream.shutdown().await?;
  Ok(true)
}
