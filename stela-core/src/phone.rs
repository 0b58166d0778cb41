//! Phone endpoint: holds the current article and serves it to the watch block by block.

use serde::Deserialize;

use crate::article::Article;
use crate::core::{error_message, push_frame, MessageError, OutboundAction};
use crate::protocol::{decode_message, encode_message, Direction, Message, MAX_MESSAGE_SIZE};
use crate::segment;
use crate::version::Version;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhoneConfig {
    /// Ceiling for every encoded message sent to the watch.
    pub max_message_size: usize,
    /// Watch apps older than this are asked to update.
    pub min_watch_version: Option<Version>,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            max_message_size: MAX_MESSAGE_SIZE,
            min_watch_version: None,
        }
    }
}

pub struct PhoneCore {
    config: PhoneConfig,
    article: Option<Article>,
    watch_version: Option<Version>,
}

impl PhoneCore {
    pub fn new() -> Self {
        Self::with_config(PhoneConfig::default())
    }

    pub fn with_config(config: PhoneConfig) -> Self {
        Self {
            config,
            article: None,
            watch_version: None,
        }
    }

    pub fn article(&self) -> Option<&Article> {
        self.article.as_ref()
    }

    /// Version last reported by the watch.
    pub fn watch_version(&self) -> Option<Version> {
        self.watch_version
    }

    /// Replace the current article: returns RESET followed by the layout. Requests for the
    /// previous article are answered from the new one from here on.
    pub fn begin_article(&mut self, article: Article) -> Result<Vec<OutboundAction>, MessageError> {
        let max = self.config.max_message_size;
        segment::check_fits(&article, max)?;
        // A short data message ends the final block, so the byte ceiling must never be
        // what cuts a message short.
        let cap = segment::byte_safe_words_per_message(&article, max);
        let article = if segment::words_per_message(article.text_block_size()) > cap {
            log::info!(
                "phone: text block size {} lowered to {} to fit {}-byte messages",
                article.text_block_size(),
                cap,
                max
            );
            article.regroup(cap)?
        } else {
            article
        };
        let config = Message::Config {
            text_block_size: Some(article.text_block_size() as i16),
            total_blocks: Some(article.total_blocks() as i16),
        };
        log::info!(
            "phone: new article, {} words in {} blocks of {}",
            article.word_count(),
            article.total_blocks(),
            article.text_block_size()
        );
        self.article = Some(article);
        let mut actions = Vec::new();
        push_frame(&mut actions, &Message::Reset, max);
        push_frame(&mut actions, &config, max);
        Ok(actions)
    }

    /// Data messages for a block, without encoding. `None` without an article or for an
    /// index outside it.
    pub fn block_messages(&self, block_number: i16) -> Option<Vec<Message>> {
        let article = self.article.as_ref()?;
        let index = usize::try_from(block_number).ok()?;
        let messages = segment::segment_block(article, index, self.config.max_message_size)?;
        Some(messages.into_iter().map(Message::Data).collect())
    }

    /// Frames for one block, or an error message for the watch if the block does not exist.
    pub fn send_block(&self, block_number: i16) -> Vec<OutboundAction> {
        let max = self.config.max_message_size;
        let Some(messages) = self.block_messages(block_number) else {
            let text = match &self.article {
                None => "No article loaded".to_string(),
                Some(a) => format!(
                    "Block {} out of range (article has {})",
                    block_number,
                    a.total_blocks()
                ),
            };
            log::warn!("phone: {}", text);
            let mut actions = Vec::new();
            push_frame(&mut actions, &error_message(&text, max), max);
            return actions;
        };
        messages
            .iter()
            .map(|msg| {
                let frame = encode_message(msg, max)
                    .unwrap_or_else(|e| panic!("packed data message failed to encode: {}", e));
                OutboundAction::SendMessage(frame)
            })
            .collect()
    }

    /// Own version, for announcing to the watch.
    pub fn announce_version(&self) -> Vec<OutboundAction> {
        let mut actions = Vec::new();
        push_frame(
            &mut actions,
            &Message::Version(Version::current()),
            self.config.max_message_size,
        );
        actions
    }

    /// Process a frame received from the watch.
    pub fn on_message_received(&mut self, bytes: &[u8]) -> Result<Vec<OutboundAction>, MessageError> {
        match decode_message(bytes, Direction::WatchToPhone)? {
            Some(msg) => Ok(self.handle(msg)),
            None => {
                log::debug!("phone: ignoring message with no recognized role");
                Ok(Vec::new())
            }
        }
    }

    pub fn handle(&mut self, msg: Message) -> Vec<OutboundAction> {
        let max = self.config.max_message_size;
        let mut actions = Vec::new();
        match msg {
            Message::BlockRequest { block_number } => {
                log::debug!("phone: watch requested block {}", block_number);
                actions.extend(self.send_block(block_number));
            }
            Message::ConfigQuery {
                text_block_size,
                total_blocks,
            } => match &self.article {
                Some(article) => {
                    let reply = Message::Config {
                        text_block_size: text_block_size.then(|| article.text_block_size() as i16),
                        total_blocks: total_blocks.then(|| article.total_blocks() as i16),
                    };
                    push_frame(&mut actions, &reply, max);
                }
                None => push_frame(&mut actions, &error_message("No article loaded", max), max),
            },
            Message::Version(v) => {
                self.watch_version = Some(v);
                actions.push(OutboundAction::PeerVersion(v));
                push_frame(&mut actions, &Message::Version(Version::current()), max);
                if let Some(min) = self.config.min_watch_version {
                    if v.is_unknown() || v < min {
                        log::warn!("phone: watch app {} older than required {}", v, min);
                        let text = format!("Please update Stela on your watch to {} or later", min);
                        push_frame(&mut actions, &error_message(&text, max), max);
                        actions.push(OutboundAction::PeerOutdated(v));
                    }
                }
            }
            Message::Error(text) => {
                log::warn!("phone: watch reported error: {}", text);
                actions.push(OutboundAction::PeerError(text));
            }
            Message::Reset | Message::Config { .. } | Message::Data(_) => {
                log::debug!("phone: ignoring phone-only message from watch");
            }
        }
        actions
    }
}

impl Default for PhoneCore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DataMessage;

    fn decode_all(actions: &[OutboundAction]) -> Vec<Message> {
        actions
            .iter()
            .filter_map(|a| match a {
                OutboundAction::SendMessage(frame) => {
                    decode_message(frame, Direction::PhoneToWatch).unwrap()
                }
                _ => None,
            })
            .collect()
    }

    fn watch_frame(msg: &Message) -> Vec<u8> {
        encode_message(msg, MAX_MESSAGE_SIZE).unwrap()
    }

    fn words(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("word{}", i)).collect()
    }

    #[test]
    fn begin_article_sends_reset_then_layout() {
        let mut phone = PhoneCore::new();
        let article = Article::from_blocks(5, vec![words(12)]).unwrap();
        let actions = phone.begin_article(article).unwrap();
        assert_eq!(
            decode_all(&actions),
            vec![
                Message::Reset,
                Message::Config {
                    text_block_size: Some(5),
                    total_blocks: Some(1),
                },
            ]
        );
    }

    #[test]
    fn twelve_words_go_out_as_three_messages() {
        let mut phone = PhoneCore::new();
        phone
            .begin_article(Article::from_blocks(5, vec![words(12)]).unwrap())
            .unwrap();
        let msgs = decode_all(&phone.send_block(0));
        let data: Vec<DataMessage> = msgs
            .into_iter()
            .map(|m| match m {
                Message::Data(d) => d,
                other => panic!("expected data, got {:?}", other),
            })
            .collect();
        assert_eq!(data.len(), 3);
        assert_eq!(
            data.iter().map(|d| d.word_start_index).collect::<Vec<_>>(),
            vec![0, 5, 10]
        );
        assert_eq!(
            data.iter().map(|d| d.words.len()).collect::<Vec<_>>(),
            vec![5, 5, 2]
        );
        let all: Vec<String> = data.into_iter().flat_map(|d| d.words).collect();
        assert_eq!(all, words(12));
    }

    #[test]
    fn block_size_is_lowered_until_full_messages_fit() {
        let mut phone = PhoneCore::new();
        let text = words(80)[10..].join(" ");
        let actions = phone
            .begin_article(Article::from_text(&text, 50).unwrap())
            .unwrap();
        assert_eq!(
            decode_all(&actions)[1],
            Message::Config {
                text_block_size: Some(15),
                total_blocks: Some(5),
            }
        );
        for block_number in 0..5 {
            let msgs = decode_all(&phone.send_block(block_number));
            let counts: Vec<usize> = msgs
                .iter()
                .map(|m| match m {
                    Message::Data(d) => d.words.len(),
                    other => panic!("expected data, got {:?}", other),
                })
                .collect();
            let expected = if block_number < 4 { vec![15] } else { vec![10] };
            assert_eq!(counts, expected);
        }
    }

    #[test]
    fn block_request_resends_identical_frames() {
        let mut phone = PhoneCore::new();
        let text = words(30).join(" ");
        phone
            .begin_article(Article::from_text(&text, 8).unwrap())
            .unwrap();
        let first = phone.send_block(2);
        let request = watch_frame(&Message::BlockRequest { block_number: 2 });
        let again = phone.on_message_received(&request).unwrap();
        assert_eq!(first, again);
        assert!(!again.is_empty());
    }

    #[test]
    fn request_out_of_range_or_without_article_gets_error() {
        let mut phone = PhoneCore::new();
        let request = watch_frame(&Message::BlockRequest { block_number: 0 });
        let msgs = decode_all(&phone.on_message_received(&request).unwrap());
        assert!(matches!(msgs.as_slice(), [Message::Error(_)]));

        phone
            .begin_article(Article::from_text("a b c", 5).unwrap())
            .unwrap();
        for block_number in [1, -1] {
            let request = watch_frame(&Message::BlockRequest { block_number });
            let msgs = decode_all(&phone.on_message_received(&request).unwrap());
            assert!(matches!(msgs.as_slice(), [Message::Error(_)]));
        }
    }

    #[test]
    fn config_query_reports_requested_fields() {
        let mut phone = PhoneCore::new();
        phone
            .begin_article(Article::from_text(&words(25).join(" "), 10).unwrap())
            .unwrap();
        let query = watch_frame(&Message::ConfigQuery {
            text_block_size: false,
            total_blocks: true,
        });
        let msgs = decode_all(&phone.on_message_received(&query).unwrap());
        assert_eq!(
            msgs,
            vec![Message::Config {
                text_block_size: None,
                total_blocks: Some(3),
            }]
        );
    }

    #[test]
    fn version_report_is_answered() {
        let mut phone = PhoneCore::new();
        let report = watch_frame(&Message::Version(Version::new(1, 2, 0)));
        let actions = phone.on_message_received(&report).unwrap();
        assert!(actions.contains(&OutboundAction::PeerVersion(Version::new(1, 2, 0))));
        assert_eq!(
            decode_all(&actions),
            vec![Message::Version(Version::current())]
        );
        assert_eq!(phone.watch_version(), Some(Version::new(1, 2, 0)));
    }

    #[test]
    fn outdated_watch_is_asked_to_update() {
        let mut phone = PhoneCore::with_config(PhoneConfig {
            min_watch_version: Some(Version::new(2, 0, 0)),
            ..PhoneConfig::default()
        });
        let report = watch_frame(&Message::Version(Version::new(1, 9, 9)));
        let actions = phone.on_message_received(&report).unwrap();
        assert!(actions.contains(&OutboundAction::PeerOutdated(Version::new(1, 9, 9))));
        let msgs = decode_all(&actions);
        assert!(matches!(msgs.last(), Some(Message::Error(_))));

        let current = watch_frame(&Message::Version(Version::new(2, 0, 0)));
        let actions = phone.on_message_received(&current).unwrap();
        assert!(!actions
            .iter()
            .any(|a| matches!(a, OutboundAction::PeerOutdated(_))));
    }

    #[test]
    fn watch_error_is_surfaced() {
        let mut phone = PhoneCore::new();
        let frame = watch_frame(&Message::Error("out of memory".into()));
        let actions = phone.on_message_received(&frame).unwrap();
        assert_eq!(
            actions,
            vec![OutboundAction::PeerError("out of memory".into())]
        );
    }

    #[test]
    fn oversized_word_rejects_article() {
        let mut phone = PhoneCore::new();
        let article = Article::from_text(&"x".repeat(400), 5).unwrap();
        assert!(matches!(
            phone.begin_article(article),
            Err(MessageError::Article(_))
        ));
        assert!(phone.article().is_none());
    }

    #[test]
    fn undecodable_frame_is_an_error() {
        let mut phone = PhoneCore::new();
        assert!(matches!(
            phone.on_message_received(&[3, 1]),
            Err(MessageError::Decode(_))
        ));
    }
}
