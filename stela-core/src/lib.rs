//! Stela phone/watch message protocol.
//! Host-driven: no I/O; the host passes received frames in and performs the returned actions.

pub mod article;
pub mod core;
pub mod ffi;
pub mod keys;
pub mod phone;
pub mod protocol;
pub mod reassembly;
pub mod segment;
pub mod transport;
pub mod version;
pub mod watch;
pub mod wire;

pub use article::{Article, ArticleError};
pub use crate::core::{MessageError, OutboundAction};
pub use keys::{MessageKey, WireType};
pub use phone::{PhoneConfig, PhoneCore};
pub use protocol::{decode_message, encode_message, DataMessage, Direction, Message, MAX_MESSAGE_SIZE};
pub use reassembly::{BlockReassembler, BlockState};
pub use transport::{dispatch, Outbox, Transport, TransportError};
pub use version::Version;
pub use watch::{WatchConfig, WatchCore};
