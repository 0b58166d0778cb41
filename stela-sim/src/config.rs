//! Load config from file and environment.

use serde::Deserialize;
use std::path::PathBuf;
use stela_core::{PhoneConfig, WatchConfig};
use uuid::Uuid;

/// Simulator configuration. File: ~/.config/stela/config.toml or /etc/stela/config.toml.
/// Env overrides: STELA_TEXT_BLOCK_SIZE, STELA_MAX_MESSAGE_SIZE, STELA_TICK_MS,
/// STELA_LATENCY_MS, STELA_DROP_EVERY.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Words per block (default 50).
    #[serde(default = "default_text_block_size")]
    pub text_block_size: usize,
    /// Watch clock period in milliseconds (default 200).
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// One-way link delay in milliseconds (default 20).
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
    /// Drop every n-th frame on each side of the link; 0 drops nothing.
    #[serde(default)]
    pub drop_every: u32,
    /// Identifier of the watch app the phone addresses.
    #[serde(default = "default_app_uuid")]
    pub app_uuid: Uuid,
    /// Page a fresh install starts from.
    #[serde(default = "default_url")]
    pub default_url: String,
    #[serde(default)]
    pub phone: PhoneConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

fn default_text_block_size() -> usize {
    50
}
fn default_tick_ms() -> u64 {
    200
}
fn default_latency_ms() -> u64 {
    20
}
fn default_app_uuid() -> Uuid {
    Uuid::from_u128(0x2b1b2b6c_3c8e_4e0c_9f1e_5a7d1c0e7a11)
}
fn default_url() -> String {
    "https://en.wikipedia.org/wiki/Special:Random".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            text_block_size: default_text_block_size(),
            tick_ms: default_tick_ms(),
            latency_ms: default_latency_ms(),
            drop_every: 0,
            app_uuid: default_app_uuid(),
            default_url: default_url(),
            phone: PhoneConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    if let Some(n) = env_parse::<usize>("STELA_TEXT_BLOCK_SIZE") {
        c.text_block_size = n;
    }
    if let Some(n) = env_parse::<usize>("STELA_MAX_MESSAGE_SIZE") {
        c.phone.max_message_size = n;
        c.watch.max_message_size = n;
    }
    if let Some(n) = env_parse::<u64>("STELA_TICK_MS") {
        c.tick_ms = n;
    }
    if let Some(n) = env_parse::<u64>("STELA_LATENCY_MS") {
        c.latency_ms = n;
    }
    if let Some(n) = env_parse::<u32>("STELA_DROP_EVERY") {
        c.drop_every = n;
    }
    c
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let s = std::env::var(name).ok()?;
    match s.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("config: ignoring {}={:?}", name, s);
            None
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/stela/config.toml"));
    }
    out.push(PathBuf::from("/etc/stela/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            let s = match std::fs::read_to_string(&p) {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("config: cannot read {}: {}", p.display(), e);
                    break;
                }
            };
            match parse(&s) {
                Ok(c) => {
                    log::info!("config: loaded {}", p.display());
                    return Some(c);
                }
                Err(e) => log::warn!("config: ignoring {}: {}", p.display(), e),
            }
            break;
        }
    }
    None
}

fn parse(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(s)
}
