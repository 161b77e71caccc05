use crate::core::{udp_send, Socket, TransportError};
use crate::testkit::FailureConfigMap;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::sleep;
use tracing::{trace, warn};

/// Sends a datagram through the failure settings for `to`: it may be dropped, delayed, or sent
/// right away. A delayed datagram is sent from a background task, and its failure only logged.
pub async fn udp_send_unreliable(
  udp: &Arc<UdpSocket>,
  to: &Socket,
  payload: Vec<u8>,
  fail_map: &FailureConfigMap,
) -> Result<(), TransportError> {
  let fail_cfg = fail_map.get(to);
  if fail_cfg.is_reliable() {
    return udp_send(udp, to, &payload).await;
  }
  if rand::random::<f64>() < fail_cfg.drop_prob {
    trace!(%to, "datagram dropped");
    return Ok(());
  }
  match fail_cfg.delay {
    Some((min, max)) => {
      let range = min.as_millis()..=max.as_millis().max(min.as_millis());
      let dur = Duration::from_millis(SmallRng::from_entropy().gen_range(range) as u64);
      let udp = udp.clone();
      let to = to.clone();
      tokio::spawn(async move {
        sleep(dur).await;
        if let Err(error) = udp_send(&udp, &to, &payload).await {
          warn!(%to, %error, "delayed send failed");
        }
      });
      Ok(())
    }
    None => udp_send(udp, to, &payload).await,
  }
}
