mod config;
mod error;
mod gmail;
mod invoice;
mod ledger;
mod pipeline;
mod tracker;

use std::env;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use config::Config;
use gmail::GmailMailbox;
use invoice::PatternExtractor;
use ledger::LedgerClient;
use tracker::Tracker;

const DEFAULT_CONFIG_PATH: &str = ".config/invoice_relay.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter("info")
        .init();

    // Install crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let config_path = env::var("INVOICE_RELAY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let cfg = Config::load(&config_path)?;
    let formats = cfg.date_formats()?;

    let hub = gmail::create_hub(&cfg, &config_path).await?;
    let mailbox = GmailMailbox::new(hub, &cfg.gmail, formats.mail_date.clone());
    let extractor = PatternExtractor::new(formats);
    let mut tracker = Tracker::load(&cfg.storage.state_dir);
    let mut ledger = LedgerClient::connect(&cfg.ledger).await?;

    let result = pipeline::run_cycle(
        &mailbox,
        &extractor,
        &mut ledger,
        &mut tracker,
        Path::new(&cfg.storage.invoice_dir),
        cfg.pipeline.on_extraction_error,
    )
    .await;

    // tear the browser session down before deciding the exit status
    if let Err(e) = ledger.close().await {
        warn!(error = %e, "Failed to close WebDriver session");
    }

    let report = result?;
    info!(
        fetched = report.fetched,
        skipped = report.skipped,
        processed = report.processed,
        "Poll cycle finished"
    );

    Ok(())
}
