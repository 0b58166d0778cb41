// Stela simulator: runs the phone and watch cores against each other over an in-process
// link and prints the article the watch reassembled.

mod config;
mod link;

use std::io::Read;
use std::time::Duration;

use anyhow::{bail, Context};
use stela_core::{dispatch, Article, OutboundAction, PhoneCore, WatchCore};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::link::LinkEnd;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    let mut path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("stela-sim {}", VERSION);
                return Ok(());
            }
            "--help" | "-h" => {
                println!("usage: stela-sim [FILE]\nReads the article from FILE, or stdin if omitted.");
                return Ok(());
            }
            _ => path = Some(arg),
        }
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = config::load();
    log::info!("stela-sim {} app {} ({})", VERSION, cfg.app_uuid, cfg.default_url);

    let text = match &path {
        Some(p) => std::fs::read_to_string(p).with_context(|| format!("reading {}", p))?,
        None => {
            let mut s = String::new();
            std::io::stdin()
                .read_to_string(&mut s)
                .context("reading stdin")?;
            s
        }
    };
    let article = Article::from_text(&text, cfg.text_block_size)?;
    log::info!(
        "article: {} words in {} blocks of {}",
        article.word_count(),
        article.total_blocks(),
        article.text_block_size()
    );

    let rt = tokio::runtime::Runtime::new()?;
    let words = rt.block_on(async {
        tokio::select! {
            r = run(&cfg, article) => r.map(Some),
            r = shutdown_signal() => r.map(|_| None),
        }
    })?;
    match words {
        Some(words) => println!("{}", words.join(" ")),
        None => log::info!("interrupted"),
    }
    Ok(())
}

/// Push `article` from the phone to the watch and return the words the watch ended up with.
async fn run(cfg: &Config, article: Article) -> anyhow::Result<Vec<String>> {
    let link = link::open(
        cfg.phone.max_message_size.max(cfg.watch.max_message_size),
        Duration::from_millis(cfg.latency_ms),
        cfg.drop_every,
    );
    tokio::spawn(link::log_connection_state(link.state.subscribe()));

    let mut phone = PhoneCore::with_config(cfg.phone.clone());
    let mut phone_end = link.phone;
    let mut events = dispatch(&mut phone_end, phone.begin_article(article)?)?;
    events.extend(dispatch(&mut phone_end, phone.announce_version())?);
    log_phone_events(events);
    let phone_task = tokio::spawn(run_phone(phone, phone_end, link.to_phone));

    let watch = WatchCore::with_config(cfg.watch.clone());
    let tick = Duration::from_millis(cfg.tick_ms.max(1));
    let result = run_watch(watch, link.watch, link.to_watch, tick).await;

    link.state.send_replace(false);
    phone_task.abort();
    result
}

async fn run_phone(
    mut core: PhoneCore,
    mut out: LinkEnd,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
) -> anyhow::Result<()> {
    while let Some(frame) = rx.recv().await {
        match core.on_message_received(&frame) {
            Ok(actions) => log_phone_events(dispatch(&mut out, actions)?),
            Err(e) => log::warn!("phone: dropping frame: {}", e),
        }
    }
    Ok(())
}

fn log_phone_events(events: Vec<OutboundAction>) {
    for event in events {
        match event {
            OutboundAction::PeerVersion(v) => log::info!("phone: watch app {}", v),
            OutboundAction::PeerOutdated(v) => log::warn!("phone: watch app {} is outdated", v),
            other => log::debug!("phone: {:?}", other),
        }
    }
}

/// Drive the watch: ask for the layout until it arrives, then fetch blocks in order.
async fn run_watch(
    mut core: WatchCore,
    mut out: LinkEnd,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    tick: Duration,
) -> anyhow::Result<Vec<String>> {
    dispatch(&mut out, core.hello())?;
    let mut interval = tokio::time::interval(tick);
    let mut started = false;
    loop {
        let actions = tokio::select! {
            _ = interval.tick() => {
                let mut actions = core.tick();
                if core.total_blocks().is_none() || core.text_block_size().is_none() {
                    actions.extend(core.query_config());
                }
                actions
            }
            frame = rx.recv() => {
                let Some(frame) = frame else {
                    bail!("link closed before the article arrived");
                };
                match core.on_message_received(&frame) {
                    Ok(actions) => actions,
                    Err(e) => {
                        log::warn!("watch: dropping frame: {}", e);
                        core.report_error(&e.to_string())
                    }
                }
            }
        };

        let mut next = Vec::new();
        for event in dispatch(&mut out, actions)? {
            match event {
                OutboundAction::ArticleReset => started = false,
                OutboundAction::ConfigReceived { .. } => {
                    if !started && core.text_block_size().is_some() && core.total_blocks().is_some() {
                        started = true;
                        next.push(0);
                    }
                }
                OutboundAction::BlockComplete { block_number, .. } => {
                    let total = core.total_blocks().unwrap_or(0);
                    if block_number + 1 < total {
                        next.push(block_number + 1);
                    }
                }
                OutboundAction::RequestAbandoned(block_number) => {
                    bail!("phone never sent block {}", block_number);
                }
                OutboundAction::PeerError(text) => log::warn!("watch: phone says: {}", text),
                OutboundAction::PeerVersion(v) => log::info!("watch: phone app {}", v),
                other => log::debug!("watch: {:?}", other),
            }
        }
        for block_number in next {
            if core.block_state(block_number) != stela_core::BlockState::Complete {
                dispatch(&mut out, core.request_block(block_number))?;
            }
        }

        if started {
            if let Some(words) = core.article_words() {
                return Ok(words);
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
