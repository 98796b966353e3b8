use std::io::Write;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::Parser;
use futures::future::join_all;
use tokio::signal;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;

use streamdeck_hass::backoff::Backoff;
use streamdeck_hass::config::{self, DeckConfig};
use streamdeck_hass::error::{ApiError, ApiResult};
use streamdeck_hass::host::config_store::YamlConfigStore;
use streamdeck_hass::host::hass::HassClient;
use streamdeck_hass::host::{EntryData, Host};
use streamdeck_hass::render::glyph::MdiGlyphs;
use streamdeck_hass::session::manager::SessionManager;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: Utf8PathBuf,
}

/*
 * Formatter function to output in syslog format. This makes sense when running
 * as a service (where output might go to a log file, or the system journal)
 */
#[allow(clippy::match_same_arms)]
fn syslog_format(
    buf: &mut pretty_env_logger::env_logger::fmt::Formatter,
    record: &log::Record,
) -> std::io::Result<()> {
    writeln!(
        buf,
        "<{}>{}: {}",
        match record.level() {
            log::Level::Error => 3,
            log::Level::Warn => 4,
            log::Level::Info => 6,
            log::Level::Debug => 7,
            log::Level::Trace => 7,
        },
        record.target(),
        record.args()
    )
}

fn init_logging() -> ApiResult<()> {
    /* Try to provide reasonable default filters, when RUST_LOG is not specified */
    const DEFAULT_LOG_FILTERS: &[&str] = &[
        "debug",
        "hyper_util=info",
        "reqwest=info",
        "tungstenite=info",
        "tokio_tungstenite=info",
    ];

    let log_filters = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTERS.join(","));

    /* Detect if we need syslog or human-readable formatting */
    if std::env::var("SYSTEMD_EXEC_PID").is_ok_and(|pid| pid == std::process::id().to_string()) {
        Ok(pretty_env_logger::env_logger::builder()
            .format(syslog_format)
            .parse_filters(&log_filters)
            .try_init()?)
    } else {
        Ok(pretty_env_logger::formatted_timed_builder()
            .parse_filters(&log_filters)
            .try_init()?)
    }
}

/// Keep trying to set up `entry_id` until the deck answers or we shut down.
async fn setup_deck(
    manager: Arc<SessionManager>,
    entry_id: String,
    deck: DeckConfig,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::default();

    loop {
        match manager.setup(&entry_id, &deck).await {
            Ok(session) => {
                log::info!("[{}] Session started", session.title());
                return;
            }
            Err(ApiError::NotReady(host)) => {
                let delay = backoff.next_delay();
                log::warn!(
                    "[{}] Stream Deck at {host} not ready, retrying setup in {delay:?}",
                    deck.title(&entry_id)
                );
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(delay) => {}
                }
            }
            Err(err) => {
                log::error!("[{}] Setup failed: {err}", deck.title(&entry_id));
                return;
            }
        }
    }
}

async fn wait_for_shutdown() -> ApiResult<&'static str> {
    let mut sigterm = signal::unix::signal(SignalKind::terminate())?;

    tokio::select! {
        res = signal::ctrl_c() => {
            res?;
            Ok("Ctrl-C pressed, exiting..")
        }
        _ = sigterm.recv() => Ok("SIGTERM received, exiting.."),
    }
}

async fn run() -> ApiResult<()> {
    init_logging()?;

    let args = Args::parse();

    let config = config::parse(&args.config)?;
    log::debug!("Configuration loaded successfully");

    if !config.has_decks() {
        log::warn!("{}", "-".repeat(80));
        log::warn!("No Stream Decks configured in {}!", args.config);
        log::warn!("The bridge will run, but has no buttons to drive.");
        log::warn!("{}", "-".repeat(80));
    }

    let hass = Arc::new(HassClient::new(&config.hass)?);

    let store = Arc::new(YamlConfigStore::load(config.bridge.bindings_file.clone())?);
    for entry_id in config.decks.keys() {
        store.ensure_entry(entry_id, EntryData::default()).await?;
    }

    let host = Host::new(hass.clone(), hass.clone(), hass.clone(), store);
    let cancel = CancellationToken::new();

    let pump = tokio::spawn({
        let hass = hass.clone();
        let sink = host.state_change_sender();
        let cancel = cancel.clone();
        async move { hass.pump_state_changes(sink, cancel).await }
    });

    let manager = Arc::new(SessionManager::new(host, Arc::new(MdiGlyphs)));
    let setups: Vec<_> = config
        .decks
        .into_iter()
        .map(|(entry_id, deck)| {
            tokio::spawn(setup_deck(manager.clone(), entry_id, deck, cancel.clone()))
        })
        .collect();

    let msg = wait_for_shutdown().await?;
    log::warn!("{msg}");
    let _ = std::io::stderr().flush();

    cancel.cancel();
    /* Let in-flight setups settle before unloading */
    for res in join_all(setups).await {
        if let Err(err) = res {
            log::error!("Deck setup task failed: {err}");
        }
    }
    manager.shutdown().await;
    if let Err(err) = pump.await {
        log::error!("State change pump failed: {err}");
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        log::error!("Stream Deck bridge error: {err}");
        log::error!("Fatal error encountered, cannot continue.");
    }
}
