//! Stela message roles and their mapping onto key-value dictionaries.

use crate::keys::{word_key, MessageKey};
use crate::version::Version;
use crate::wire::{self, Dictionary, Value};

/// Largest encoded dictionary the phone will send. The watch's effective payload is about
/// 255 bytes; the transport envelope is accounted for outside this bound.
pub const MAX_MESSAGE_SIZE: usize = 256;

/// Keys that only appear in a data message.
const CONTENT_KEYS: [MessageKey; 3] = [
    MessageKey::NumWords,
    MessageKey::WordStartIndex,
    MessageKey::FirstWordKey,
];

/// Which peer sent a message. The same key means "set" coming from the phone and
/// "query" coming from the watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    PhoneToWatch,
    WatchToPhone,
}

/// A run of consecutive words of one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMessage {
    pub block_number: i16,
    /// Offset of `words[0]` within the block.
    pub word_start_index: u16,
    pub words: Vec<String>,
}

impl DataMessage {
    /// Block offset one past the last word of this message.
    pub fn end_index(&self) -> usize {
        self.word_start_index as usize + self.words.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Phone: a new article follows; drop everything about the previous one.
    Reset,
    /// Phone: article layout.
    Config {
        text_block_size: Option<i16>,
        total_blocks: Option<i16>,
    },
    /// Phone: words of one block.
    Data(DataMessage),
    /// Watch: send this block (again).
    BlockRequest { block_number: i16 },
    /// Watch: report the current layout values that are flagged.
    ConfigQuery {
        text_block_size: bool,
        total_blocks: bool,
    },
    /// Either side: the sender's app version.
    Version(Version),
    /// Either side: a recoverable problem worth showing to the user.
    Error(String),
}

impl Message {
    /// Build the dictionary for this message. Fails only for data messages with more
    /// words than a dictionary can hold.
    pub fn to_dictionary(&self) -> Result<Dictionary, ProtocolError> {
        let mut d = Dictionary::new();
        match self {
            Message::Reset => d.insert(MessageKey::Reset.id(), Value::U8(1)),
            Message::Config {
                text_block_size,
                total_blocks,
            } => {
                if let Some(n) = text_block_size {
                    d.insert(MessageKey::TextBlockSize.id(), Value::I16(*n));
                }
                if let Some(n) = total_blocks {
                    d.insert(MessageKey::TotalNumberOfBlocks.id(), Value::I16(*n));
                }
            }
            Message::Data(data) => {
                let num_words = u8::try_from(data.words.len())
                    .map_err(|_| ProtocolError::TooManyWords(data.words.len()))?;
                d.insert(MessageKey::NumWords.id(), Value::U8(num_words));
                d.insert(
                    MessageKey::WordStartIndex.id(),
                    Value::U16(data.word_start_index),
                );
                d.insert(MessageKey::BlockNumber.id(), Value::I16(data.block_number));
                d.insert(
                    MessageKey::FirstWordKey.id(),
                    Value::U32(MessageKey::FirstWord.id()),
                );
                for (i, word) in data.words.iter().enumerate() {
                    d.insert(word_key(i), Value::CString(word.clone()));
                }
            }
            Message::BlockRequest { block_number } => {
                d.insert(MessageKey::BlockNumber.id(), Value::I16(*block_number));
            }
            Message::ConfigQuery {
                text_block_size,
                total_blocks,
            } => {
                if *text_block_size {
                    d.insert(MessageKey::TextBlockSize.id(), Value::I16(0));
                }
                if *total_blocks {
                    d.insert(MessageKey::TotalNumberOfBlocks.id(), Value::I16(0));
                }
            }
            Message::Version(v) => {
                d.insert(MessageKey::VersionMajor.id(), Value::U8(v.major));
                d.insert(MessageKey::VersionMinor.id(), Value::U8(v.minor));
                d.insert(MessageKey::VersionPatch.id(), Value::U8(v.patch));
            }
            Message::Error(text) => d.insert(MessageKey::Error.id(), Value::CString(text.clone())),
        }
        Ok(d)
    }

    /// Interpret a dictionary received from the peer. Keys that play no part in the
    /// recognized role are ignored. Returns `Ok(None)` when no role is recognized.
    pub fn from_dictionary(
        d: &Dictionary,
        direction: Direction,
    ) -> Result<Option<Message>, ProtocolError> {
        let msg = match direction {
            Direction::PhoneToWatch => from_phone(d)?,
            Direction::WatchToPhone => from_watch(d),
        };
        log_ignored_keys(d, msg.as_ref());
        Ok(msg)
    }
}

fn from_phone(d: &Dictionary) -> Result<Option<Message>, ProtocolError> {
    if d.contains(MessageKey::Reset.id()) {
        return Ok(Some(Message::Reset));
    }
    if let (Some(num_words), Some(start), Some(block), Some(first_key)) = (
        int_field::<u8>(d, MessageKey::NumWords),
        int_field::<u16>(d, MessageKey::WordStartIndex),
        int_field::<i16>(d, MessageKey::BlockNumber),
        int_field::<u32>(d, MessageKey::FirstWordKey),
    ) {
        if first_key <= MessageKey::VersionPatch.id() {
            return Err(ProtocolError::BadFirstWordKey(first_key));
        }
        let mut words = Vec::with_capacity(num_words as usize);
        for i in 0..num_words as u32 {
            let word = first_key
                .checked_add(i)
                .and_then(|key| d.get(key))
                .and_then(Value::as_str)
                .ok_or(ProtocolError::MissingWord {
                    block_number: block,
                    index: i as usize,
                })?;
            words.push(word.to_string());
        }
        return Ok(Some(Message::Data(DataMessage {
            block_number: block,
            word_start_index: start,
            words,
        })));
    }
    let text_block_size = int_field::<i16>(d, MessageKey::TextBlockSize);
    let total_blocks = int_field::<i16>(d, MessageKey::TotalNumberOfBlocks);
    if text_block_size.is_some() || total_blocks.is_some() {
        return Ok(Some(Message::Config {
            text_block_size,
            total_blocks,
        }));
    }
    Ok(common(d))
}

fn from_watch(d: &Dictionary) -> Option<Message> {
    let has_content = CONTENT_KEYS.iter().any(|k| d.contains(k.id()));
    if !has_content {
        if let Some(block_number) = int_field::<i16>(d, MessageKey::BlockNumber) {
            return Some(Message::BlockRequest { block_number });
        }
    }
    let text_block_size = d.contains(MessageKey::TextBlockSize.id());
    let total_blocks = d.contains(MessageKey::TotalNumberOfBlocks.id());
    if text_block_size || total_blocks {
        return Some(Message::ConfigQuery {
            text_block_size,
            total_blocks,
        });
    }
    common(d)
}

/// Roles either side may send.
fn common(d: &Dictionary) -> Option<Message> {
    if let (Some(major), Some(minor), Some(patch)) = (
        int_field::<u8>(d, MessageKey::VersionMajor),
        int_field::<u8>(d, MessageKey::VersionMinor),
        int_field::<u8>(d, MessageKey::VersionPatch),
    ) {
        return Some(Message::Version(Version::new(major, minor, patch)));
    }
    match d.get(MessageKey::Error.id())? {
        Value::CString(text) => Some(Message::Error(text.clone())),
        other => other
            .as_int()
            .map(|code| Message::Error(format!("error code {}", code))),
    }
}

/// Integer value of `key` converted to the key's width. A value of the wrong type or out
/// of range counts as absent.
fn int_field<T: TryFrom<i64>>(d: &Dictionary, key: MessageKey) -> Option<T> {
    let value = d.get(key.id())?;
    let converted = value.as_int().and_then(|n| T::try_from(n).ok());
    if converted.is_none() {
        log::debug!("protocol: ignoring {:?} with value {:?}", key, value);
    }
    converted
}

fn log_ignored_keys(d: &Dictionary, msg: Option<&Message>) {
    let words = match msg {
        Some(Message::Data(data)) => word_key(0)..word_key(data.words.len()),
        _ => 0..0,
    };
    for (key, _) in d.iter() {
        if MessageKey::from_id(key).is_none() && !words.contains(&key) {
            log::debug!("protocol: ignoring unknown key {}", key);
        }
    }
}

/// Encode a message, enforcing `max_size` on the encoded dictionary.
pub fn encode_message(msg: &Message, max_size: usize) -> Result<Vec<u8>, ProtocolError> {
    let bytes = msg.to_dictionary()?.encode()?;
    if bytes.len() > max_size {
        return Err(ProtocolError::TooLarge {
            len: bytes.len(),
            max: max_size,
        });
    }
    Ok(bytes)
}

/// Decode a received frame. `Ok(None)` when the dictionary is valid but carries no role
/// this side understands.
pub fn decode_message(bytes: &[u8], direction: Direction) -> Result<Option<Message>, ProtocolError> {
    let d = Dictionary::decode(bytes)?;
    Message::from_dictionary(&d, direction)
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("encode error: {0}")]
    Encode(#[from] wire::EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] wire::DecodeError),
    #[error("message too large: {len} > {max}")]
    TooLarge { len: usize, max: usize },
    #[error("too many words for one message: {0}")]
    TooManyWords(usize),
    #[error("first word key {0} overlaps the schema keys")]
    BadFirstWordKey(u32),
    #[error("block {block_number}: word {index} missing")]
    MissingWord { block_number: i16, index: usize },
}
