//! Transport boundary: whatever physically carries frames between phone and watch.

use std::collections::VecDeque;

use crate::core::OutboundAction;

/// Sends one encoded frame to the peer. Failures go back to the caller; nothing here
/// retries.
pub trait Transport {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("peer not connected")]
    Disconnected,
    #[error("frame too large: {0} bytes")]
    TooLarge(usize),
    #[error("send failed: {0}")]
    Failed(String),
}

/// Send every `SendMessage` action through `transport` and return the other actions for
/// the host. Stops at the first failed send.
pub fn dispatch<T: Transport + ?Sized>(
    transport: &mut T,
    actions: Vec<OutboundAction>,
) -> Result<Vec<OutboundAction>, TransportError> {
    let mut rest = Vec::new();
    for action in actions {
        match action {
            OutboundAction::SendMessage(frame) => transport.send(&frame)?,
            other => rest.push(other),
        }
    }
    Ok(rest)
}

/// Queue of frames waiting to be picked up, for hosts that poll.
#[derive(Debug, Default)]
pub struct Outbox {
    frames: VecDeque<Vec<u8>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn front(&self) -> Option<&[u8]> {
        self.frames.front().map(Vec::as_slice)
    }

    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.frames.pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Transport for Outbox {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.frames.push_back(frame.to_vec());
        Ok(())
    }
}
