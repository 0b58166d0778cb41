//! Message key schema shared by the phone and the watch.
//!
//! Every slot of a message dictionary is addressed by a numeric key. The receiver does
//! not get type information from the sender beyond the tuple header, so both sides must
//! agree on the width and signedness of each key's value; [`KEY_TYPES`] is that contract.

/// Keys used in messages between the phone and the watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum MessageKey {
    /// Error report, carried as a string.
    Error = 0,
    /// A new article is about to be sent. Phone only.
    Reset = 1,
    /// Phone: maximum number of words per block. Watch: query for that value.
    TextBlockSize = 2,
    /// Phone: number of blocks in the article. Watch: query for that value.
    TotalNumberOfBlocks = 3,
    /// Number of words in this message. Phone only, alongside the words.
    NumWords = 4,
    /// Offset of this message's first word within its block. Phone only.
    WordStartIndex = 5,
    /// Phone: block the words belong to. Watch: on its own, a request for that block.
    BlockNumber = 6,
    /// Dictionary key holding the first word of this message. Phone only.
    FirstWordKey = 7,
    VersionMajor = 8,
    VersionMinor = 9,
    VersionPatch = 10,
    /// Key of the first word. Word `i` of a message is stored at `FirstWord + i`.
    FirstWord = 11,
}

/// Scalar type of a key's value on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    U8,
    I16,
    U16,
    U32,
    /// NUL-terminated UTF-8 string.
    CString,
}

impl WireType {
    /// Encoded value length in bytes, or `None` for variable-length strings.
    pub const fn width(self) -> Option<usize> {
        match self {
            WireType::U8 => Some(1),
            WireType::I16 | WireType::U16 => Some(2),
            WireType::U32 => Some(4),
            WireType::CString => None,
        }
    }
}

/// Key to wire type mapping, indexed by key value.
pub static KEY_TYPES: [(MessageKey, WireType); 12] = [
    (MessageKey::Error, WireType::CString),
    (MessageKey::Reset, WireType::U8),
    (MessageKey::TextBlockSize, WireType::I16),
    (MessageKey::TotalNumberOfBlocks, WireType::I16),
    (MessageKey::NumWords, WireType::U8),
    (MessageKey::WordStartIndex, WireType::U16),
    (MessageKey::BlockNumber, WireType::I16),
    (MessageKey::FirstWordKey, WireType::U32),
    (MessageKey::VersionMajor, WireType::U8),
    (MessageKey::VersionMinor, WireType::U8),
    (MessageKey::VersionPatch, WireType::U8),
    (MessageKey::FirstWord, WireType::CString),
];

impl MessageKey {
    pub const fn id(self) -> u32 {
        self as u32
    }

    /// Look up a key by its numeric id. Ids past [`MessageKey::FirstWord`] are word slots,
    /// not schema keys, and return `None`.
    pub fn from_id(id: u32) -> Option<Self> {
        KEY_TYPES.get(id as usize).map(|&(key, _)| key)
    }

    pub fn wire_type(self) -> WireType {
        KEY_TYPES[self as usize].1
    }
}

/// Dictionary key of word `index` within a message.
pub fn word_key(index: usize) -> u32 {
    MessageKey::FirstWord.id() + index as u32
}
