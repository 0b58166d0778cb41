//! Host-driven API: the phone and watch cores take received frames from the host and
//! return actions. Neither core does I/O.

use crate::article::ArticleError;
use crate::protocol::{encode_message, Message, ProtocolError};
use crate::reassembly::ReassemblyError;
use crate::version::Version;
use crate::wire;

/// Action for the host to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    /// Encoded frame to hand to the transport.
    SendMessage(Vec<u8>),
    /// Watch: every word of a block has arrived.
    BlockComplete {
        block_number: i16,
        words: Vec<String>,
    },
    /// Watch: the phone announced a new article; earlier blocks are gone.
    ArticleReset,
    /// Watch: the phone sent (part of) the article layout.
    ConfigReceived {
        text_block_size: Option<i16>,
        total_blocks: Option<i16>,
    },
    /// Watch: no reply to a block request after all attempts.
    RequestAbandoned(i16),
    /// The peer reported its app version.
    PeerVersion(Version),
    /// Phone: the watch app is older than the configured minimum.
    PeerOutdated(Version),
    /// The peer reported an error.
    PeerError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("failed to decode message: {0}")]
    Decode(#[from] ProtocolError),
    #[error("rejected data: {0}")]
    Reassembly(#[from] ReassemblyError),
    #[error("invalid article: {0}")]
    Article(#[from] ArticleError),
}

/// Bytes an error message needs besides its text: dictionary header, tuple header, NUL.
const ERROR_OVERHEAD: usize = wire::header_len() + 7 + 1;

/// Error message whose text is cut (on a char boundary) to fit `max_size`.
pub(crate) fn error_message(text: &str, max_size: usize) -> Message {
    let room = max_size.saturating_sub(ERROR_OVERHEAD);
    let mut end = text.len().min(room);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    Message::Error(text[..end].to_string())
}

/// Encode `msg` and queue it as a `SendMessage` action.
pub(crate) fn push_frame(actions: &mut Vec<OutboundAction>, msg: &Message, max_size: usize) {
    match encode_message(msg, max_size) {
        Ok(frame) => actions.push(OutboundAction::SendMessage(frame)),
        Err(e) => log::error!("dropping outgoing {:?}: {}", msg, e),
    }
}
