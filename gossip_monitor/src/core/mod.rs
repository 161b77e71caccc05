//! The base layer: peer identity, heartbeat records, sockets and the wire format.
//!
//! Everything above this module speaks in terms of [`PeerId`] and [`HeartbeatRecord`]. A peer's
//! id determines its port, and its port is the only address it has. Gossip is sent as a single
//! UDP datagram per destination (see [`GossipMessage`] for the encoding), while status queries use
//! a short-lived TCP connection on the same port number (see [`query_status`]).
//!
//! Nothing here retries. Datagrams are assumed to be lost, duplicated or reordered, and the
//! protocol above tolerates that by gossiping again on the next heartbeat.

mod packets;
mod peer;
mod remoting;

#[rustfmt::skip]
pub use {
  packets::deserialize_status,
  packets::serialize_status,
  packets::GossipMessage,
  packets::StatusMap,
  packets::WireError,
  packets::SEPARATOR,
  peer::HeartbeatRecord,
  peer::PeerId,
  peer::PeerIdError,
  remoting::query_status,
  remoting::udp_recv_gossip,
  remoting::udp_send,
  remoting::Host,
  remoting::Socket,
  remoting::TransportError,
  remoting::MAX_DATAGRAM,
  remoting::STATUS_REQUEST,
};
