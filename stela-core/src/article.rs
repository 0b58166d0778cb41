//! Article: the text being pushed to the watch, as an ordered list of word blocks.

/// Upper bound for block size and block count (both travel as signed 16-bit values).
pub const MAX_BLOCKS: usize = i16::MAX as usize;
pub const MAX_TEXT_BLOCK_SIZE: usize = i16::MAX as usize;

/// Ordered blocks of words. Every block but the last holds exactly `text_block_size`
/// words; the last may hold any number, including zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    text_block_size: usize,
    blocks: Vec<Vec<String>>,
}

impl Article {
    /// Split text on whitespace and group the words into blocks. Empty text gives one
    /// empty block.
    pub fn from_text(text: &str, text_block_size: usize) -> Result<Self, ArticleError> {
        let words = text.split_whitespace().map(str::to_string).collect();
        Self::from_words(words, text_block_size)
    }

    /// The same words grouped into blocks of a different size.
    pub fn regroup(&self, text_block_size: usize) -> Result<Self, ArticleError> {
        Self::from_words(self.words().map(str::to_string).collect(), text_block_size)
    }

    fn from_words(words: Vec<String>, text_block_size: usize) -> Result<Self, ArticleError> {
        check_block_size(text_block_size)?;
        let mut blocks: Vec<Vec<String>> = words
            .chunks(text_block_size)
            .map(<[String]>::to_vec)
            .collect();
        if blocks.is_empty() {
            blocks.push(Vec::new());
        }
        Self::from_blocks(text_block_size, blocks)
    }

    pub fn from_blocks(
        text_block_size: usize,
        blocks: Vec<Vec<String>>,
    ) -> Result<Self, ArticleError> {
        check_block_size(text_block_size)?;
        if blocks.is_empty() {
            return Err(ArticleError::NoBlocks);
        }
        if blocks.len() > MAX_BLOCKS {
            return Err(ArticleError::TooManyBlocks(blocks.len()));
        }
        let last = blocks.len() - 1;
        for (index, block) in blocks.iter().enumerate() {
            if index < last && block.len() != text_block_size {
                return Err(ArticleError::PartialBlock {
                    index,
                    len: block.len(),
                });
            }
            if block.len() > u16::MAX as usize {
                return Err(ArticleError::BlockTooLong {
                    index,
                    len: block.len(),
                });
            }
            if let Some(word) = block.iter().find(|w| w.contains('\0')) {
                return Err(ArticleError::InvalidWord(word.clone()));
            }
        }
        Ok(Self {
            text_block_size,
            blocks,
        })
    }

    pub fn text_block_size(&self) -> usize {
        self.text_block_size
    }

    pub fn total_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, index: usize) -> Option<&[String]> {
        self.blocks.get(index).map(Vec::as_slice)
    }

    pub fn word_count(&self) -> usize {
        self.blocks.iter().map(Vec::len).sum()
    }

    /// All words in reading order.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().flatten().map(String::as_str)
    }
}

fn check_block_size(text_block_size: usize) -> Result<(), ArticleError> {
    if text_block_size == 0 || text_block_size > MAX_TEXT_BLOCK_SIZE {
        return Err(ArticleError::BadBlockSize(text_block_size));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ArticleError {
    #[error("text block size {0} out of range")]
    BadBlockSize(usize),
    #[error("article has no blocks")]
    NoBlocks,
    #[error("too many blocks: {0}")]
    TooManyBlocks(usize),
    #[error("block {index} has {len} words; only the last block may be partial")]
    PartialBlock { index: usize, len: usize },
    #[error("block {index} too long: {len} words")]
    BlockTooLong { index: usize, len: usize },
    #[error("word contains NUL: {0:?}")]
    InvalidWord(String),
    #[error("word does not fit in one message: {0:?}")]
    WordTooLarge(String),
    #[error("message size {0} cannot hold a data message")]
    MessageSizeTooSmall(usize),
}
