use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::Result;
use clap::{Parser, ValueEnum};
use presentment::{
    config::SessionConfig,
    core::document::DocumentStore,
    session::SessionController,
    transfer::memory::MemoryTransferChannel,
};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

mod config;
mod engine;

use config::{load_documents, load_script, HolderConfig};
use engine::{HeadlessConfig, HeadlessEngine};

#[derive(Parser, Debug)]
#[command(name = "headless-holder")]
#[command(about = "Runs a presentation session against a scripted verifier")]
#[command(version)]
struct Cli {
    /// JSON array of stored documents
    #[arg(short, long, env = "HOLDER_DOCUMENTS")]
    documents: PathBuf,

    /// JSON script of the verifier's events
    #[arg(short, long, env = "HOLDER_SCRIPT")]
    script: PathBuf,

    /// Engagement mode of proximity sessions
    #[arg(short, long, value_enum, default_value = "qr", env = "HOLDER_MODE")]
    mode: Mode,

    /// Start a remote session from this link instead of a proximity engagement
    #[arg(long, env = "HOLDER_DEEP_LINK")]
    deep_link: Option<Url>,

    /// Print the stored documents and exit
    #[arg(long, default_value = "false")]
    list_documents: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Disable automatic consent (will decline all requests)
    #[arg(long, default_value = "false")]
    no_auto_consent: bool,

    /// Artificial response delay in milliseconds
    #[arg(long, default_value = "0", env = "RESPONSE_DELAY_MS")]
    response_delay_ms: u64,

    /// Give up when no request arrives within this many milliseconds
    #[arg(long, default_value = "30000", env = "REQUEST_TIMEOUT_MS")]
    timeout_ms: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Qr,
    Nfc,
}

impl Cli {
    fn into_config(self) -> Result<HolderConfig> {
        let session = match &self.deep_link {
            Some(link) => SessionConfig::from_deep_link(link)?,
            None if self.mode == Mode::Nfc => SessionConfig::proximity_nfc(),
            None => SessionConfig::proximity_qr(),
        };

        Ok(HolderConfig {
            documents: self.documents,
            script: self.script,
            engine: HeadlessConfig {
                auto_consent: !self.no_auto_consent,
                response_delay_ms: self.response_delay_ms,
                timeout_ms: self.timeout_ms,
                alternate_engagement: self.deep_link.is_none() && self.mode == Mode::Nfc,
            },
            session,
        })
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup tracing/logging
    setup_logging(&cli.log_level)?;

    let list_documents = cli.list_documents;
    let config = cli.into_config()?;
    let store = Arc::new(load_documents(&config.documents).await?);

    if list_documents {
        print_documents(&*store).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let script = load_script(&config.script).await?;
    print_startup_banner(&config, store.all_documents().await?.len());

    let channel = Arc::new(
        MemoryTransferChannel::new()
            .with_engagement_events(script.before_selection)
            .with_response_events(script.after_selection),
    );

    let controller = Arc::new(
        SessionController::builder()
            .with_transfer_channel(channel.clone())
            .with_alternate_engagement(channel)
            .with_document_store(store)
            .with_config(config.session.clone())
            .build()?,
    );

    let engine = HeadlessEngine::new(config.engine.clone(), controller);
    let outcome = engine.run().await?;

    info!(%outcome, "session finished");
    println!("Outcome: {outcome}");

    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Setup tracing subscriber for logging
fn setup_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level))
        .add_directive("headless_holder=debug".parse()?);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .init();

    Ok(())
}

async fn print_documents(store: &dyn DocumentStore) -> Result<()> {
    for document in store.all_documents().await? {
        let Some(details) = store.details(&document.id).await? else {
            continue;
        };
        println!();
        println!(
            "{} ({})",
            details.document_name.as_deref().unwrap_or(&details.document_id),
            details.doc_type
        );
        if let Some(expiry_date) = &details.expiry_date {
            println!("  Expires: {expiry_date}");
        }
        for row in &details.rows {
            println!("  {}: {}", row.title, row.value);
        }
    }
    println!();
    Ok(())
}

/// Print startup banner with configuration info
fn print_startup_banner(config: &HolderConfig, documents_count: usize) {
    let consent = if config.engine.auto_consent {
        "automatic"
    } else {
        "decline all"
    };

    println!();
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                    Headless Presentation Holder                  ║");
    println!("╠══════════════════════════════════════════════════════════════════╣");
    println!("║                                                                  ║");
    println!("║  Engagement:           {:<40} ║", format!("{:?}", config.session.mode));
    println!("║  Stored Documents:     {:<40} ║", documents_count);
    println!("║  Consent:              {:<40} ║", consent);
    println!("║                                                                  ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();
}
