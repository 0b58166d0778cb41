//! Block reassembly on the watch side.
//!
//! Data messages carry no "last message" flag. A block is complete once the words
//! received cover its length: for inner blocks that length is the configured block size;
//! for the final block it is learned from the first message shorter than the per-message
//! cap.

use crate::protocol::DataMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Empty,
    Partial { words_received: usize },
    Complete,
}

/// Collects the words of one block, keyed by offset. Receiving the same message twice
/// overwrites the same slots, so retransmissions are harmless.
#[derive(Debug, Clone)]
pub struct BlockReassembler {
    block_number: i16,
    /// Length given up front (inner blocks).
    expected: Option<usize>,
    /// Length learned from a short message (final block).
    learned: Option<usize>,
    per_message: usize,
    words: Vec<Option<String>>,
    received: usize,
}

impl BlockReassembler {
    /// Block of known length.
    pub fn with_len(block_number: i16, len: usize) -> Self {
        Self::new(block_number, Some(len), 0)
    }

    /// Block whose length is revealed by the first message carrying fewer than
    /// `per_message` words.
    pub fn open_ended(block_number: i16, per_message: usize) -> Self {
        Self::new(block_number, None, per_message)
    }

    fn new(block_number: i16, expected: Option<usize>, per_message: usize) -> Self {
        Self {
            block_number,
            expected,
            learned: None,
            per_message,
            words: Vec::new(),
            received: 0,
        }
    }

    /// Block length, if known yet.
    pub fn len(&self) -> Option<usize> {
        self.expected.or(self.learned)
    }

    pub fn words_received(&self) -> usize {
        self.received
    }

    pub fn state(&self) -> BlockState {
        match self.len() {
            Some(n) if self.words.len() >= n && self.words[..n].iter().all(Option::is_some) => {
                BlockState::Complete
            }
            _ if self.received == 0 => BlockState::Empty,
            _ => BlockState::Partial {
                words_received: self.received,
            },
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state() == BlockState::Complete
    }

    /// Store the words of `msg` at their offsets and return the resulting state.
    pub fn accept(&mut self, msg: &DataMessage) -> Result<BlockState, ReassemblyError> {
        if msg.block_number != self.block_number {
            return Err(ReassemblyError::WrongBlock {
                expected: self.block_number,
                got: msg.block_number,
            });
        }
        let end = msg.end_index();
        if let Some(n) = self.expected {
            if end > n {
                return Err(ReassemblyError::OutOfRange { end, len: n });
            }
        }
        if self.words.len() < end {
            self.words.resize(end, None);
        }
        let start = msg.word_start_index as usize;
        for (slot, word) in self.words[start..end].iter_mut().zip(&msg.words) {
            if slot.is_none() {
                self.received += 1;
            }
            *slot = Some(word.clone());
        }
        if self.expected.is_none() && msg.words.len() < self.per_message {
            self.learned = Some(self.learned.map_or(end, |n| n.max(end)));
        }
        Ok(self.state())
    }

    /// Words of a complete block, in order.
    pub fn words(&self) -> Option<Vec<String>> {
        if !self.is_complete() {
            return None;
        }
        let n = self.len()?;
        self.words[..n].iter().cloned().collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReassemblyError {
    #[error("message for block {got} given to block {expected}")]
    WrongBlock { expected: i16, got: i16 },
    #[error("words end at {end}, past block length {len}")]
    OutOfRange { end: usize, len: usize },
}
