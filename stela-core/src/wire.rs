//! Dictionary framing: tuple count (1 byte), then per tuple key (4 bytes LE), type (1 byte),
//! value length (2 bytes LE) and the value. Integers are little endian; strings carry a trailing NUL.

const HEADER_SIZE: usize = 1;
const TUPLE_HEADER_SIZE: usize = 4 + 1 + 2;

/// Maximum number of tuples in one dictionary (count is a single byte).
pub const MAX_TUPLES: usize = u8::MAX as usize;

mod tuple_type {
    pub const BYTE_ARRAY: u8 = 0;
    pub const CSTRING: u8 = 1;
    pub const UINT: u8 = 2;
    pub const INT: u8 = 3;
}

/// A tuple value. Integer variants keep their width so the encoding is exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bytes(Vec<u8>),
    CString(String),
    U8(u8),
    U16(u16),
    U32(u32),
    I8(i8),
    I16(i16),
    I32(i32),
}

impl Value {
    /// Encoded length of the value bytes (excluding the tuple header).
    pub fn encoded_len(&self) -> usize {
        match self {
            Value::Bytes(b) => b.len(),
            Value::CString(s) => s.len() + 1,
            Value::U8(_) | Value::I8(_) => 1,
            Value::U16(_) | Value::I16(_) => 2,
            Value::U32(_) | Value::I32(_) => 4,
        }
    }

    /// Integer value regardless of width or signedness.
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::U8(v) => Some(v.into()),
            Value::U16(v) => Some(v.into()),
            Value::U32(v) => Some(v.into()),
            Value::I8(v) => Some(v.into()),
            Value::I16(v) => Some(v.into()),
            Value::I32(v) => Some(v.into()),
            Value::Bytes(_) | Value::CString(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::CString(s) => Some(s),
            _ => None,
        }
    }

    fn type_byte(&self) -> u8 {
        match self {
            Value::Bytes(_) => tuple_type::BYTE_ARRAY,
            Value::CString(_) => tuple_type::CSTRING,
            Value::U8(_) | Value::U16(_) | Value::U32(_) => tuple_type::UINT,
            Value::I8(_) | Value::I16(_) | Value::I32(_) => tuple_type::INT,
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Value::Bytes(b) => out.extend_from_slice(b),
            Value::CString(s) => {
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            Value::U8(v) => out.push(*v),
            Value::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::I8(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
        }
    }

    /// Parse a value from its type byte and raw bytes. `None` for unknown types,
    /// integer widths other than 1, 2 or 4, and strings that are not UTF-8.
    fn read_from(ty: u8, raw: &[u8]) -> Option<Value> {
        match ty {
            tuple_type::BYTE_ARRAY => Some(Value::Bytes(raw.to_vec())),
            tuple_type::CSTRING => {
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                String::from_utf8(raw[..end].to_vec()).ok().map(Value::CString)
            }
            tuple_type::UINT => match raw {
                &[a] => Some(Value::U8(a)),
                &[a, b] => Some(Value::U16(u16::from_le_bytes([a, b]))),
                &[a, b, c, d] => Some(Value::U32(u32::from_le_bytes([a, b, c, d]))),
                _ => None,
            },
            tuple_type::INT => match raw {
                &[a] => Some(Value::I8(a as i8)),
                &[a, b] => Some(Value::I16(i16::from_le_bytes([a, b]))),
                &[a, b, c, d] => Some(Value::I32(i32::from_le_bytes([a, b, c, d]))),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Size of one tuple on the wire, header included.
pub fn tuple_len(value: &Value) -> usize {
    TUPLE_HEADER_SIZE + value.encoded_len()
}

/// Size of a string tuple holding `s`, without building the value.
pub fn string_tuple_len(s: &str) -> usize {
    TUPLE_HEADER_SIZE + s.len() + 1
}

/// Size of an empty dictionary.
pub const fn header_len() -> usize {
    HEADER_SIZE
}

/// Ordered key-value dictionary, the unit carried by one transport message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    tuples: Vec<(u32, Value)>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value for `key`. Insertion order is kept for new keys.
    pub fn insert(&mut self, key: u32, value: Value) {
        match self.tuples.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.tuples.push((key, value)),
        }
    }

    pub fn get(&self, key: u32) -> Option<&Value> {
        self.tuples.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: u32) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Value)> {
        self.tuples.iter().map(|(k, v)| (*k, v))
    }

    /// Exact number of bytes `encode` produces.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.tuples.iter().map(|(_, v)| tuple_len(v)).sum::<usize>()
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        if self.tuples.len() > MAX_TUPLES {
            return Err(EncodeError::TooManyTuples(self.tuples.len()));
        }
        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(self.tuples.len() as u8);
        for (key, value) in &self.tuples {
            let len = value.encoded_len();
            if len > u16::MAX as usize {
                return Err(EncodeError::ValueTooLong { key: *key, len });
            }
            if matches!(value, Value::CString(s) if s.contains('\0')) {
                return Err(EncodeError::InteriorNul { key: *key });
            }
            out.extend_from_slice(&key.to_le_bytes());
            out.push(value.type_byte());
            out.extend_from_slice(&(len as u16).to_le_bytes());
            value.write_to(&mut out);
        }
        Ok(out)
    }

    /// Decode a whole dictionary. Tuples with an unknown type or a malformed value are
    /// skipped; only a structurally broken buffer is an error.
    pub fn decode(bytes: &[u8]) -> Result<Dictionary, DecodeError> {
        let (&count, mut rest) = bytes.split_first().ok_or(DecodeError::Truncated)?;
        let mut dict = Dictionary::new();
        for _ in 0..count {
            if rest.len() < TUPLE_HEADER_SIZE {
                return Err(DecodeError::Truncated);
            }
            let key = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
            let ty = rest[4];
            let len = u16::from_le_bytes([rest[5], rest[6]]) as usize;
            rest = &rest[TUPLE_HEADER_SIZE..];
            if rest.len() < len {
                return Err(DecodeError::Truncated);
            }
            match Value::read_from(ty, &rest[..len]) {
                Some(value) => dict.insert(key, value),
                None => log::debug!("wire: skipping tuple {} with type {} and length {}", key, ty, len),
            }
            rest = &rest[len..];
        }
        if !rest.is_empty() {
            return Err(DecodeError::TrailingBytes(rest.len()));
        }
        Ok(dict)
    }
}

/// Error encoding a dictionary.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("too many tuples: {0}")]
    TooManyTuples(usize),
    #[error("value for key {key} too long: {len} bytes")]
    ValueTooLong { key: u32, len: usize },
    #[error("string for key {key} contains NUL")]
    InteriorNul { key: u32 },
}

/// Error decoding a dictionary.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("dictionary truncated")]
    Truncated,
    #[error("{0} trailing bytes after dictionary")]
    TrailingBytes(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dictionary {
        let mut d = Dictionary::new();
        d.insert(4, Value::U8(3));
        d.insert(5, Value::U16(515));
        d.insert(6, Value::I16(-2));
        d.insert(7, Value::U32(11));
        d.insert(11, Value::CString("hello".into()));
        d
    }

    #[test]
    fn layout_is_little_endian_with_headers() {
        let mut d = Dictionary::new();
        d.insert(6, Value::I16(2));
        let bytes = d.encode().unwrap();
        assert_eq!(bytes, vec![1, 6, 0, 0, 0, 3, 2, 0, 2, 0]);
        assert_eq!(bytes.len(), d.encoded_len());
    }

    #[test]
    fn cstring_carries_nul() {
        let mut d = Dictionary::new();
        d.insert(11, Value::CString("ab".into()));
        let bytes = d.encode().unwrap();
        assert_eq!(&bytes[5..], &[1, 3, 0, b'a', b'b', 0]);
        assert_eq!(tuple_len(&Value::CString("ab".into())), 10);
    }

    #[test]
    fn decode_restores_values() {
        let d = sample();
        let bytes = d.encode().unwrap();
        assert_eq!(bytes.len(), d.encoded_len());
        let back = Dictionary::decode(&bytes).unwrap();
        assert_eq!(back, d);
        assert_eq!(back.get(6).and_then(Value::as_int), Some(-2));
        assert_eq!(back.get(11).and_then(Value::as_str), Some("hello"));
    }

    #[test]
    fn truncated_and_trailing() {
        let bytes = sample().encode().unwrap();
        assert!(matches!(Dictionary::decode(&[]), Err(DecodeError::Truncated)));
        assert!(matches!(
            Dictionary::decode(&bytes[..bytes.len() - 1]),
            Err(DecodeError::Truncated)
        ));
        let mut extra = bytes.clone();
        extra.push(0);
        assert!(matches!(
            Dictionary::decode(&extra),
            Err(DecodeError::TrailingBytes(1))
        ));
    }

    #[test]
    fn malformed_tuple_is_skipped_not_fatal() {
        // key 9, unknown type 7, 1 byte; then key 6 int16.
        let bytes = vec![2, 9, 0, 0, 0, 7, 1, 0, 0xff, 6, 0, 0, 0, 3, 2, 0, 5, 0];
        let d = Dictionary::decode(&bytes).unwrap();
        assert_eq!(d.len(), 1);
        assert_eq!(d.get(6), Some(&Value::I16(5)));
    }

    #[test]
    fn odd_integer_width_is_skipped() {
        let bytes = vec![1, 4, 0, 0, 0, 2, 3, 0, 1, 2, 3];
        let d = Dictionary::decode(&bytes).unwrap();
        assert!(d.is_empty());
    }

    #[test]
    fn insert_replaces_existing_key() {
        let mut d = Dictionary::new();
        d.insert(1, Value::U8(1));
        d.insert(2, Value::U8(2));
        d.insert(1, Value::U8(9));
        assert_eq!(d.len(), 2);
        assert_eq!(d.iter().next(), Some((1, &Value::U8(9))));
    }

    #[test]
    fn interior_nul_rejected() {
        let mut d = Dictionary::new();
        d.insert(0, Value::CString("a\0b".into()));
        assert!(matches!(d.encode(), Err(EncodeError::InteriorNul { key: 0 })));
    }
}
