//! Watch endpoint: requests blocks, reassembles them, retries requests that go unanswered.

use std::collections::HashMap;

use serde::Deserialize;

use crate::core::{error_message, push_frame, MessageError, OutboundAction};
use crate::protocol::{decode_message, DataMessage, Direction, Message, MAX_MESSAGE_SIZE};
use crate::reassembly::{BlockReassembler, BlockState};
use crate::segment::words_per_message;
use crate::version::Version;

/// Default ticks to wait for a block before asking again.
pub const DEFAULT_REQUEST_TIMEOUT_TICKS: u64 = 5;

/// Default number of times a block is requested before giving up.
pub const DEFAULT_MAX_REQUEST_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    pub request_timeout_ticks: u64,
    pub max_request_attempts: u32,
    pub max_message_size: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            request_timeout_ticks: DEFAULT_REQUEST_TIMEOUT_TICKS,
            max_request_attempts: DEFAULT_MAX_REQUEST_ATTEMPTS,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

/// Outstanding block request.
struct PendingRequest {
    sent_tick: u64,
    attempts: u32,
}

pub struct WatchCore {
    config: WatchConfig,
    text_block_size: Option<i16>,
    total_blocks: Option<i16>,
    blocks: HashMap<i16, BlockReassembler>,
    pending: HashMap<i16, PendingRequest>,
    tick_count: u64,
    phone_version: Option<Version>,
}

impl WatchCore {
    pub fn new() -> Self {
        Self::with_config(WatchConfig::default())
    }

    pub fn with_config(config: WatchConfig) -> Self {
        Self {
            config,
            text_block_size: None,
            total_blocks: None,
            blocks: HashMap::new(),
            pending: HashMap::new(),
            tick_count: 0,
            phone_version: None,
        }
    }

    /// Number of articles announced so far.
    pub fn text_block_size(&self) -> Option<i16> {
        self.text_block_size
    }

    pub fn total_blocks(&self) -> Option<i16> {
        self.total_blocks
    }

    pub fn phone_version(&self) -> Option<Version> {
        self.phone_version
    }

    pub fn is_pending(&self, block_number: i16) -> bool {
        self.pending.contains_key(&block_number)
    }

    pub fn block_state(&self, block_number: i16) -> BlockState {
        self.blocks
            .get(&block_number)
            .map_or(BlockState::Empty, BlockReassembler::state)
    }

    pub fn block_words(&self, block_number: i16) -> Option<Vec<String>> {
        self.blocks.get(&block_number)?.words()
    }

    /// All words of the article once every block is complete.
    pub fn article_words(&self) -> Option<Vec<String>> {
        let total = self.total_blocks?;
        let mut out = Vec::new();
        for block_number in 0..total {
            out.extend(self.block_words(block_number)?);
        }
        Some(out)
    }

    /// Report this app's version to the phone.
    pub fn hello(&self) -> Vec<OutboundAction> {
        self.frame(&Message::Version(Version::current()))
    }

    /// Ask the phone for a block. Starts (or restarts) the retry clock for it.
    pub fn request_block(&mut self, block_number: i16) -> Vec<OutboundAction> {
        self.pending.insert(
            block_number,
            PendingRequest {
                sent_tick: self.tick_count,
                attempts: 1,
            },
        );
        self.frame(&Message::BlockRequest { block_number })
    }

    /// Ask the phone for the article layout.
    pub fn query_config(&self) -> Vec<OutboundAction> {
        self.frame(&Message::ConfigQuery {
            text_block_size: true,
            total_blocks: true,
        })
    }

    /// Tell the phone something went wrong on this side.
    pub fn report_error(&self, text: &str) -> Vec<OutboundAction> {
        self.frame(&error_message(text, self.config.max_message_size))
    }

    /// Process a frame received from the phone.
    pub fn on_message_received(&mut self, bytes: &[u8]) -> Result<Vec<OutboundAction>, MessageError> {
        match decode_message(bytes, Direction::PhoneToWatch)? {
            Some(msg) => self.handle(msg),
            None => {
                log::debug!("watch: ignoring message with no recognized role");
                Ok(Vec::new())
            }
        }
    }

    pub fn handle(&mut self, msg: Message) -> Result<Vec<OutboundAction>, MessageError> {
        let mut actions = Vec::new();
        match msg {
            Message::Reset => {
                self.text_block_size = None;
                self.total_blocks = None;
                self.blocks.clear();
                self.pending.clear();
                log::info!("watch: article reset");
                actions.push(OutboundAction::ArticleReset);
            }
            Message::Config {
                text_block_size,
                total_blocks,
            } => {
                if let Some(n) = text_block_size {
                    if n > 0 {
                        self.text_block_size = Some(n);
                    } else {
                        log::warn!("watch: ignoring text block size {}", n);
                    }
                }
                if let Some(n) = total_blocks {
                    if n >= 0 {
                        self.total_blocks = Some(n);
                    } else {
                        log::warn!("watch: ignoring block count {}", n);
                    }
                }
                actions.push(OutboundAction::ConfigReceived {
                    text_block_size,
                    total_blocks,
                });
            }
            Message::Data(data) => {
                if let Some(done) = self.on_data(data)? {
                    actions.push(done);
                }
            }
            Message::Version(v) => {
                self.phone_version = Some(v);
                actions.push(OutboundAction::PeerVersion(v));
            }
            Message::Error(text) => {
                log::warn!("watch: phone reported error: {}", text);
                actions.push(OutboundAction::PeerError(text));
            }
            Message::BlockRequest { .. } | Message::ConfigQuery { .. } => {
                log::debug!("watch: ignoring watch-only message from phone");
            }
        }
        Ok(actions)
    }

    /// Store words of a block. Returns `BlockComplete` when this message finished it.
    fn on_data(&mut self, data: DataMessage) -> Result<Option<OutboundAction>, MessageError> {
        let (Some(block_size), Some(total)) = (self.text_block_size, self.total_blocks) else {
            log::debug!(
                "watch: dropping data for block {} received before layout",
                data.block_number
            );
            return Ok(None);
        };
        let block_number = data.block_number;
        if block_number < 0 || block_number >= total {
            log::debug!("watch: dropping data for block {} of {}", block_number, total);
            return Ok(None);
        }
        let block_size = block_size as usize;
        let block = self.blocks.entry(block_number).or_insert_with(|| {
            if block_number + 1 == total {
                BlockReassembler::open_ended(block_number, words_per_message(block_size))
            } else {
                BlockReassembler::with_len(block_number, block_size)
            }
        });
        let was_complete = block.is_complete();
        let state = block.accept(&data)?;
        if state != BlockState::Complete || was_complete {
            return Ok(None);
        }
        self.pending.remove(&block_number);
        let words = block.words().unwrap_or_default();
        log::info!("watch: block {} complete, {} words", block_number, words.len());
        Ok(Some(OutboundAction::BlockComplete {
            block_number,
            words,
        }))
    }

    /// Advance the clock: re-request blocks whose reply is overdue, and give up on those
    /// that have used all attempts.
    pub fn tick(&mut self) -> Vec<OutboundAction> {
        self.tick_count = self.tick_count.saturating_add(1);
        let mut overdue: Vec<i16> = self
            .pending
            .iter()
            .filter(|(_, p)| {
                self.tick_count.saturating_sub(p.sent_tick) > self.config.request_timeout_ticks
            })
            .map(|(&b, _)| b)
            .collect();
        overdue.sort_unstable();

        let mut actions = Vec::new();
        for block_number in overdue {
            let Some(p) = self.pending.get_mut(&block_number) else {
                continue;
            };
            if p.attempts >= self.config.max_request_attempts {
                self.pending.remove(&block_number);
                log::warn!("watch: giving up on block {}", block_number);
                actions.push(OutboundAction::RequestAbandoned(block_number));
                continue;
            }
            p.attempts += 1;
            p.sent_tick = self.tick_count;
            log::debug!(
                "watch: re-requesting block {} (attempt {})",
                block_number,
                p.attempts
            );
            push_frame(
                &mut actions,
                &Message::BlockRequest { block_number },
                self.config.max_message_size,
            );
        }
        actions
    }

    fn frame(&self, msg: &Message) -> Vec<OutboundAction> {
        let mut actions = Vec::new();
        push_frame(&mut actions, msg, self.config.max_message_size);
        actions
    }
}

impl Default for WatchCore {
    fn default() -> Self {
        Self::new()
    }
}
