//! Segmentation: pack a block's words into data messages under the size ceiling.

use crate::article::{Article, ArticleError};
use crate::protocol::DataMessage;
use crate::wire::{self, Value};

/// Tuples every data message carries besides its words: word count, start index,
/// block number and first word key.
const DATA_HEADER_TUPLES: usize = 4;

/// Most words one dictionary can hold next to the data header.
pub const MAX_WORDS_PER_MESSAGE: usize = wire::MAX_TUPLES - DATA_HEADER_TUPLES;

/// Encoded size of a data message with no words.
pub fn data_header_len() -> usize {
    wire::header_len()
        + wire::tuple_len(&Value::U8(0))
        + wire::tuple_len(&Value::U16(0))
        + wire::tuple_len(&Value::I16(0))
        + wire::tuple_len(&Value::U32(0))
}

/// Word cap per message for a given block size.
pub fn words_per_message(text_block_size: usize) -> usize {
    text_block_size.clamp(1, MAX_WORDS_PER_MESSAGE)
}

/// Check that every word of the article fits in a data message on its own.
pub fn check_fits(article: &Article, max_size: usize) -> Result<(), ArticleError> {
    let header = data_header_len();
    if header >= max_size {
        return Err(ArticleError::MessageSizeTooSmall(max_size));
    }
    match article
        .words()
        .find(|w| header + wire::string_tuple_len(w) > max_size)
    {
        Some(word) => Err(ArticleError::WordTooLarge(word.to_string())),
        None => Ok(()),
    }
}

/// Largest word cap at which a message full of the article's longest words still fits in
/// `max_size`. Under this cap only the word count ends a message, never the byte ceiling.
pub fn byte_safe_words_per_message(article: &Article, max_size: usize) -> usize {
    let longest = article
        .words()
        .map(wire::string_tuple_len)
        .max()
        .unwrap_or_else(|| wire::string_tuple_len(""));
    max_size.saturating_sub(data_header_len()) / longest
}

/// Greedily pack `words` into messages: a word goes into the current message unless it
/// would push the message past `max_size` or past `per_message` words. Words keep their
/// order and are never split. An empty block yields one empty message.
///
/// Panics if a single word cannot fit; [`check_fits`] rules that out for an article.
pub fn pack_block(
    block_number: i16,
    words: &[String],
    per_message: usize,
    max_size: usize,
) -> Vec<DataMessage> {
    let header = data_header_len();
    let mut out = Vec::new();
    let mut start = 0usize;
    loop {
        let mut size = header;
        let mut end = start;
        while end < words.len() && end - start < per_message {
            let next = size + wire::string_tuple_len(&words[end]);
            if next > max_size {
                break;
            }
            size = next;
            end += 1;
        }
        assert!(
            end > start || words.is_empty(),
            "word {} of block {} does not fit in {} bytes",
            start,
            block_number,
            max_size
        );
        assert!(size <= max_size, "packed message exceeds {} bytes", max_size);
        out.push(DataMessage {
            block_number,
            word_start_index: start as u16,
            words: words[start..end].to_vec(),
        });
        start = end;
        if start >= words.len() {
            return out;
        }
    }
}

/// Data messages for block `index` of `article`, or `None` if there is no such block.
///
/// The final block has no known length on the receiving side; it ends at the first
/// message with fewer words than the per-message cap. When the final block's last
/// message is full, an empty message is appended to mark the end.
pub fn segment_block(article: &Article, index: usize, max_size: usize) -> Option<Vec<DataMessage>> {
    let words = article.block(index)?;
    let per_message = words_per_message(article.text_block_size());
    let mut messages = pack_block(index as i16, words, per_message, max_size);
    let is_final = index + 1 == article.total_blocks();
    if is_final {
        if let Some(last) = messages.last() {
            if last.words.len() == per_message {
                messages.push(DataMessage {
                    block_number: index as i16,
                    word_start_index: last.end_index() as u16,
                    words: Vec::new(),
                });
            }
        }
    }
    Some(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_message, Message, MAX_MESSAGE_SIZE};
    use rand::Rng;

    fn words(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("word{}", i)).collect()
    }

    #[test]
    fn header_len_matches_encoding() {
        let msg = Message::Data(DataMessage {
            block_number: 0,
            word_start_index: 0,
            words: vec![],
        });
        let d = msg.to_dictionary().unwrap();
        assert_eq!(d.encoded_len(), data_header_len());
        assert_eq!(data_header_len(), 38);
    }

    #[test]
    fn twelve_words_block_size_five() {
        let article = Article::from_blocks(5, vec![words(12)]).unwrap();
        let msgs = segment_block(&article, 0, MAX_MESSAGE_SIZE).unwrap();
        assert_eq!(msgs.len(), 3);
        let starts: Vec<u16> = msgs.iter().map(|m| m.word_start_index).collect();
        let counts: Vec<usize> = msgs.iter().map(|m| m.words.len()).collect();
        assert_eq!(starts, vec![0, 5, 10]);
        assert_eq!(counts, vec![5, 5, 2]);
        let joined: Vec<String> = msgs.iter().flat_map(|m| m.words.clone()).collect();
        assert_eq!(joined, words(12));
    }

    #[test]
    fn empty_block_is_one_empty_message() {
        let msgs = pack_block(3, &[], 10, MAX_MESSAGE_SIZE);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].block_number, 3);
        assert_eq!(msgs[0].word_start_index, 0);
        assert!(msgs[0].words.is_empty());
    }

    #[test]
    fn byte_ceiling_splits_before_word_cap() {
        // 38 header + 4 * (7 + 21) = 150; a fifth word would reach 178.
        let long: Vec<String> = (0..10).map(|i| format!("{:020}", i)).collect();
        let msgs = pack_block(0, &long, 100, 160);
        assert_eq!(msgs[0].words.len(), 4);
        assert_eq!(msgs[1].word_start_index, 4);
        for m in &msgs {
            let bytes = encode_message(&Message::Data(m.clone()), 160).unwrap();
            assert!(bytes.len() <= 160);
        }
    }

    #[test]
    fn full_final_block_gets_terminator() {
        let article = Article::from_blocks(5, vec![words(5), words(10)]).unwrap();
        let first = segment_block(&article, 0, MAX_MESSAGE_SIZE).unwrap();
        assert_eq!(first.len(), 1);
        let last = segment_block(&article, 1, MAX_MESSAGE_SIZE).unwrap();
        assert_eq!(last.len(), 3);
        assert!(last[2].words.is_empty());
        assert_eq!(last[2].word_start_index, 10);
        assert!(segment_block(&article, 2, MAX_MESSAGE_SIZE).is_none());
    }

    #[test]
    fn byte_safe_cap_follows_longest_word() {
        // "word10".."word69": tuple of 7 + 7 bytes; (256 - 38) / 14 = 15.
        let article = Article::from_blocks(50, vec![words(70)[10..].to_vec()]).unwrap();
        assert_eq!(byte_safe_words_per_message(&article, MAX_MESSAGE_SIZE), 15);
        let empty = Article::from_text("", 5).unwrap();
        assert_eq!(byte_safe_words_per_message(&empty, MAX_MESSAGE_SIZE), 27);

        let long: Vec<String> = (0..30).map(|i| format!("{:020}", i)).collect();
        let article = Article::from_blocks(30, vec![long]).unwrap();
        let cap = byte_safe_words_per_message(&article, 160);
        assert_eq!(cap, 4);
        let msgs = segment_block(&article.regroup(cap).unwrap(), 7, 160).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].words.len(), 2);
    }

    #[test]
    fn packing_is_deterministic() {
        let article = Article::from_text(&words(40).join(" "), 16).unwrap();
        for i in 0..article.total_blocks() {
            assert_eq!(
                segment_block(&article, i, MAX_MESSAGE_SIZE),
                segment_block(&article, i, MAX_MESSAGE_SIZE)
            );
        }
    }

    #[test]
    fn check_fits_rejects_oversized_word() {
        let article = Article::from_text(&"x".repeat(300), 5).unwrap();
        assert!(matches!(
            check_fits(&article, MAX_MESSAGE_SIZE),
            Err(ArticleError::WordTooLarge(_))
        ));
        let ok = Article::from_text("short words only", 5).unwrap();
        assert!(check_fits(&ok, MAX_MESSAGE_SIZE).is_ok());
        assert!(matches!(
            check_fits(&ok, 20),
            Err(ArticleError::MessageSizeTooSmall(20))
        ));
    }

    #[test]
    fn random_blocks_keep_order_and_ceiling() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let max_size = rng.gen_range(60..=512);
            let longest = max_size - data_header_len() - 8;
            let n = rng.gen_range(0..120);
            let block: Vec<String> = (0..n)
                .map(|_| {
                    let len = rng.gen_range(1..=longest.min(24));
                    (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
                })
                .collect();
            let per_message = rng.gen_range(1..=MAX_WORDS_PER_MESSAGE);
            let msgs = pack_block(1, &block, per_message, max_size);

            let mut expected_start = 0usize;
            let mut joined = Vec::new();
            for m in &msgs {
                assert_eq!(m.word_start_index as usize, expected_start);
                assert!(m.words.len() <= per_message);
                let bytes = Message::Data(m.clone()).to_dictionary().unwrap().encode().unwrap();
                assert!(bytes.len() <= max_size);
                expected_start = m.end_index();
                joined.extend(m.words.iter().cloned());
            }
            assert_eq!(joined, block);
        }
    }
}
