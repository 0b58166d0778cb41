//! In-process link between the phone and watch tasks: fixed latency, deterministic frame
//! drops, and a connection flag observers can follow.

use std::time::Duration;

use stela_core::{Transport, TransportError};
use tokio::sync::{mpsc, watch};

/// One side's sending half.
pub struct LinkEnd {
    name: &'static str,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    max_frame: usize,
    drop_every: u32,
    sent: u32,
    connected: watch::Receiver<bool>,
}

impl Transport for LinkEnd {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if !*self.connected.borrow() {
            return Err(TransportError::Disconnected);
        }
        if frame.len() > self.max_frame {
            return Err(TransportError::TooLarge(frame.len()));
        }
        self.sent = self.sent.wrapping_add(1);
        if self.drop_every != 0 && self.sent % self.drop_every == 0 {
            log::debug!("link({}): dropping frame {}", self.name, self.sent);
            return Ok(());
        }
        self.tx
            .send(frame.to_vec())
            .map_err(|_| TransportError::Disconnected)
    }
}

pub struct Link {
    pub phone: LinkEnd,
    pub watch: LinkEnd,
    /// Frames arriving at the phone.
    pub to_phone: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Frames arriving at the watch.
    pub to_watch: mpsc::UnboundedReceiver<Vec<u8>>,
    pub state: watch::Sender<bool>,
}

/// Open a connected link. Must be called inside a tokio runtime (spawns the delay relays).
pub fn open(max_frame: usize, latency: Duration, drop_every: u32) -> Link {
    let (state, connected) = watch::channel(true);
    let (phone_tx, to_watch) = delayed(latency);
    let (watch_tx, to_phone) = delayed(latency);
    Link {
        phone: LinkEnd {
            name: "phone",
            tx: phone_tx,
            max_frame,
            drop_every,
            sent: 0,
            connected: connected.clone(),
        },
        watch: LinkEnd {
            name: "watch",
            tx: watch_tx,
            max_frame,
            drop_every,
            sent: 0,
            connected,
        },
        to_phone,
        to_watch,
        state,
    }
}

/// Channel whose frames come out `latency` after they go in, in order.
fn delayed(
    latency: Duration,
) -> (
    mpsc::UnboundedSender<Vec<u8>>,
    mpsc::UnboundedReceiver<Vec<u8>>,
) {
    let (tx, mut raw) = mpsc::unbounded_channel::<Vec<u8>>();
    let (out, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(frame) = raw.recv().await {
            tokio::time::sleep(latency).await;
            if out.send(frame).is_err() {
                break;
            }
        }
    });
    (tx, rx)
}

/// Log every connection change until the link is dropped.
pub async fn log_connection_state(mut state: watch::Receiver<bool>) {
    while state.changed().await.is_ok() {
        let connected = *state.borrow();
        log::info!(
            "link: watch {}",
            if connected { "connected" } else { "disconnected" }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_arrive_in_order() {
        let mut link = open(64, Duration::from_millis(1), 0);
        link.phone.send(&[1]).unwrap();
        link.phone.send(&[2]).unwrap();
        assert_eq!(link.to_watch.recv().await, Some(vec![1]));
        assert_eq!(link.to_watch.recv().await, Some(vec![2]));
    }

    #[tokio::test]
    async fn every_nth_frame_is_dropped() {
        let mut link = open(64, Duration::ZERO, 2);
        for i in 1..=4u8 {
            link.watch.send(&[i]).unwrap();
        }
        assert_eq!(link.to_phone.recv().await, Some(vec![1]));
        assert_eq!(link.to_phone.recv().await, Some(vec![3]));
    }

    #[tokio::test]
    async fn oversized_and_disconnected_sends_fail() {
        let mut link = open(4, Duration::ZERO, 0);
        assert!(matches!(
            link.phone.send(&[0; 5]),
            Err(TransportError::TooLarge(5))
        ));
        link.state.send_replace(false);
        assert!(matches!(
            link.phone.send(&[0]),
            Err(TransportError::Disconnected)
        ));
    }
}
