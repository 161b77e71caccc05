use crate::core::{deserialize_status, GossipMessage, StatusMap, WireError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;

/// Largest payload a single UDP datagram can carry.
pub const MAX_DATAGRAM: usize = 65_507;

/// The request a status query sends.
pub const STATUS_REQUEST: &str = "status";

#[derive(Debug, Error)]
pub enum TransportError {
  #[error("i/o error: {0}")]
  Io(#[from] io::Error),
  #[error("no address resolved for {0}")]
  Unresolved(Socket),
  #[error("timed out after {0:?}")]
  Timeout(Duration),
  #[error("empty reply")]
  EmptyReply,
  #[error(transparent)]
  Wire(#[from] WireError),
}

/// The DNS name or IP address of the machine hosting a peer.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize)]
pub enum Host {
  DNS(String),
  IP(IpAddr),
}
impl From<String> for Host {
  fn from(s: String) -> Self {
    match IpAddr::from_str(s.as_str()) {
      Ok(ip) => Host::IP(ip),
      Err(_) => Host::DNS(s),
    }
  }
}
impl Default for Host {
  fn default() -> Self {
    Host::IP(IpAddr::V4(Ipv4Addr::LOCALHOST))
  }
}
impl fmt::Display for Host {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Host::DNS(s) => write!(f, "{}", s),
      Host::IP(ip) => write!(f, "{}", ip),
    }
  }
}

/// Where a process can be reached. Agents gossip over UDP and answer status queries over TCP.
/// Both listen on the same port number.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize, Ord, PartialOrd)]
pub struct Socket {
  pub host: Host,
  pub udp: u16,
  pub tcp: u16,
}
impl Socket {
  pub fn new(host: Host, udp: u16, tcp: u16) -> Socket {
    Socket {
      host: host,
      udp: udp,
      tcp: tcp,
    }
  }

  /// A socket using `port` for both transports.
  pub fn on_port(host: Host, port: u16) -> Socket {
    Socket::new(host, port, port)
  }

  pub async fn as_udp_addr(&self) -> io::Result<Vec<SocketAddr>> {
    self.resolve(self.udp).await
  }

  pub async fn as_tcp_addr(&self) -> io::Result<Vec<SocketAddr>> {
    self.resolve(self.tcp).await
  }

  async fn resolve(&self, port: u16) -> io::Result<Vec<SocketAddr>> {
    match &self.host {
      Host::IP(ip) => Ok(vec![SocketAddr::new(*ip, port)]),
      Host::DNS(s) => {
        lookup_host((s.as_str(), port)).await.map(|x| x.filter(|a| a.is_ipv4()).collect())
      }
    }
  }

  fn first(&self, addrs: io::Result<Vec<SocketAddr>>) -> Result<SocketAddr, TransportError> {
    addrs?.into_iter().next().ok_or_else(|| TransportError::Unresolved(self.clone()))
  }

  pub async fn bind_udp(&self) -> Result<UdpSocket, TransportError> {
    let addr = self.first(self.as_udp_addr().await)?;
    Ok(UdpSocket::bind(addr).await?)
  }

  pub async fn bind_tcp(&self) -> Result<TcpListener, TransportError> {
    let addr = self.first(self.as_tcp_addr().await)?;
    Ok(TcpListener::bind(addr).await?)
  }
}
impl fmt::Display for Socket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.udp == self.tcp {
      write!(f, "{}:{}", self.host, self.udp)
    } else {
      write!(f, "{}:{}|{}", self.host, self.udp, self.tcp)
    }
  }
}

/// Sends one datagram. Nothing is retried; the caller decides whether a failure matters.
pub async fn udp_send(from: &UdpSocket, to: &Socket, payload: &[u8]) -> Result<(), TransportError> {
  let addr = to.first(to.as_udp_addr().await)?;
  from.send_to(payload, addr).await?;
  Ok(())
}

/// Waits for the next datagram and decodes it as gossip. A decoding failure consumes the datagram.
pub async fn udp_recv_gossip(
  udp: &UdpSocket,
  buf: &mut [u8],
) -> Result<(GossipMessage, SocketAddr), TransportError> {
  let (len, addr) = udp.recv_from(buf).await?;
  Ok((GossipMessage::deserialize(&buf[..len])?, addr))
}

/// Asks the agent listening at `socket` for its status dictionary.
pub async fn query_status(socket: &Socket, limit: Duration) -> Result<StatusMap, TransportError> {
  let exchange = async {
    let addr = socket.first(socket.as_tcp_addr().await)?;
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(STATUS_REQUEST.as_bytes()).await?;
    stream.shutdown().await?;
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await?;
    if reply.trim().is_empty() {
      return Err(TransportError::EmptyReply);
    }
    Ok::<_, TransportError>(deserialize_status(&reply)?)
  };
  timeout(limit, exchange).await.map_err(|_| TransportError::Timeout(limit))?
}

#[test]
fn test_host_from_string() {
  assert_eq!(
    Host::from("127.0.0.1".to_string()),
    Host::IP(IpAddr::V4(Ipv4Addr::LOCALHOST))
  );
  assert_eq!(Host::from("localhost".to_string()), Host::DNS("localhost".to_string()));
}

#[test]
fn test_socket_display() {
  assert_eq!(Socket::on_port(Host::default(), 4000).to_string(), "127.0.0.1:4000");
  assert_eq!(
    Socket::new(Host::DNS("node".to_string()), 4000, 4001).to_string(),
    "node:4000|4001"
  );
}
