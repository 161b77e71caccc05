use crate::core::{HeartbeatRecord, PeerId, PeerIdError};
use std::collections::BTreeMap;
use thiserror::Error;

/// A point-in-time copy of a status dictionary. Cloning is cheap, the map is persistent.
pub type StatusMap = im::OrdMap<PeerId, HeartbeatRecord>;

/*
Gossip travels as UTF-8 text so that other implementations can speak the protocol:

  message := sender '#' status
  sender  := digits                         (decoding also accepts "node-" digits)
  status  := { "node-<id>": [clock, alive], ... }   (a JSON object)

Only the first '#' separates the envelope. A status query reply is the status part alone.
*/
pub const SEPARATOR: char = '#';

#[derive(Debug, Error)]
pub enum WireError {
  #[error("payload is not valid UTF-8")]
  Utf8(#[from] std::str::Utf8Error),
  #[error("missing '{}' between sender and status", SEPARATOR)]
  MissingSeparator,
  #[error("bad sender: {0}")]
  Sender(#[source] PeerIdError),
  #[error("bad status key: {0}")]
  Key(#[source] PeerIdError),
  #[error("malformed status map: {0}")]
  Status(#[from] serde_json::Error),
}

/// One gossip datagram: who sent it and what they currently believe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GossipMessage {
  pub sender: PeerId,
  pub status: StatusMap,
}
impl GossipMessage {
  pub fn new(sender: PeerId, status: StatusMap) -> GossipMessage {
    GossipMessage {
      sender: sender,
      status: status,
    }
  }

  pub fn serialize(&self) -> Vec<u8> {
    format!("{}{}{}", self.sender.0, SEPARATOR, serialize_status(&self.status)).into_bytes()
  }

  pub fn deserialize(bytes: &[u8]) -> Result<GossipMessage, WireError> {
    let text = std::str::from_utf8(bytes)?;
    let (sender, status) = text.split_once(SEPARATOR).ok_or(WireError::MissingSeparator)?;
    Ok(GossipMessage {
      sender: sender.parse().map_err(WireError::Sender)?,
      status: deserialize_status(status)?,
    })
  }
}

pub fn serialize_status(status: &StatusMap) -> String {
  let wire = status
    .iter()
    .map(|(peer, rec)| (peer.key(), (rec.clock, rec.alive)))
    .collect::<BTreeMap<_, _>>();
  // A map of strings to (u64, bool) pairs cannot fail to serialize.
  serde_json::to_string(&wire).unwrap_or_default()
}

pub fn deserialize_status(text: &str) -> Result<StatusMap, WireError> {
  let wire: BTreeMap<String, (u64, bool)> = serde_json::from_str(text.trim())?;
  wire
    .into_iter()
    .map(|(key, (clock, alive))| {
      PeerId::from_key(&key).map(|peer| (peer, HeartbeatRecord::new(clock, alive)))
    })
    .collect::<Result<StatusMap, _>>()
    .map_err(WireError::Key)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> StatusMap {
    im::ordmap! {
      PeerId(1) => HeartbeatRecord::new(4, true),
      PeerId(2) => HeartbeatRecord::new(0, false),
      PeerId(10) => HeartbeatRecord::new(17, true)
    }
  }

  #[test]
  fn test_status_text_format() {
    let text = serialize_status(&sample());
    assert_eq!(text, r#"{"node-1":[4,true],"node-10":[17,true],"node-2":[0,false]}"#);
  }

  #[test]
  fn test_message_round_trip() {
    let msg = GossipMessage::new(PeerId(2), sample());
    let bytes = msg.serialize();
    assert!(bytes.starts_with(b"2#{"));
    assert_eq!(GossipMessage::deserialize(&bytes).unwrap(), msg);

    let empty = GossipMessage::new(PeerId(9), StatusMap::new());
    assert_eq!(GossipMessage::deserialize(&empty.serialize()).unwrap(), empty);
  }

  #[test]
  fn test_prefixed_sender_accepted() {
    let msg = GossipMessage::deserialize(br#"node-3#{"node-3":[2,true]}"#).unwrap();
    assert_eq!(msg.sender, PeerId(3));
    assert_eq!(msg.status.get(&PeerId(3)), Some(&HeartbeatRecord::new(2, true)));
  }

  #[test]
  fn test_malformed_messages() {
    assert!(matches!(
      GossipMessage::deserialize(b"3{}"),
      Err(WireError::MissingSeparator)
    ));
    assert!(matches!(GossipMessage::deserialize(b"x#{}"), Err(WireError::Sender(_))));
    assert!(matches!(
      GossipMessage::deserialize(br#"1#{"peer-1":[1,true]}"#),
      Err(WireError::Key(_))
    ));
    assert!(matches!(
      GossipMessage::deserialize(br#"1#{"node-1":[-1,true]}"#),
      Err(WireError::Status(_))
    ));
    assert!(matches!(
      GossipMessage::deserialize(br#"1#{"node-1":[1,"yes"]}"#),
      Err(WireError::Status(_))
    ));
    assert!(matches!(GossipMessage::deserialize(&[0xff, b'#']), Err(WireError::Utf8(_))));
  }

  #[test]
  fn test_only_first_separator_splits() {
    // The status part is parsed whole, so a stray '#' inside it is a status error, not a
    // second envelope.
    assert!(matches!(
      GossipMessage::deserialize(br#"1#{"node-1":[1,true]}#junk"#),
      Err(WireError::Status(_))
    ));
  }
}
