//! # warden-bot
//!
//! Moderator binary. Wires settings, logging, the ledger, the enforcement
//! pipeline and the command group to a line-delimited JSON adapter on
//! stdin/stdout.

#![deny(unsafe_code)]

mod console;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use warden_commands::{CommandContext, CommandSurface};
use warden_core::{Classifier, MemberId};
use warden_enforcement::{
    Dispatcher, EnforcementPipeline, HttpClassifier, PipelineConfig, UnconfiguredClassifier,
};
use warden_ledger::{JsonFileStore, ViolationLedger};
use warden_settings::WardenSettings;

use crate::console::{CommandEvent, ConsolePlatform, Inbound, parse_line};

/// Grace period for in-flight pipelines on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Warden image moderator.
#[derive(Parser, Debug)]
#[command(name = "warden-bot", about = "Automated image moderator")]
struct Cli {
    /// Settings file (defaults to `$WARDEN_SETTINGS` or `./warden.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ledger document path (overrides settings).
    #[arg(long)]
    data_file: Option<String>,

    /// This bot's own member id; its messages are never scanned.
    #[arg(long)]
    self_id: Option<String>,
}

fn load_settings(args: &Cli) -> Result<WardenSettings> {
    let path = args
        .config
        .clone()
        .unwrap_or_else(warden_settings::settings_path);
    let mut settings = warden_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    if let Some(ref data_file) = args.data_file {
        settings.data_file.clone_from(data_file);
    }
    Ok(settings)
}

fn build_classifier(settings: &WardenSettings) -> Result<Arc<dyn Classifier>> {
    match settings.classifier.endpoint {
        Some(ref endpoint) => {
            let timeout = Duration::from_millis(settings.classifier.timeout_ms);
            let classifier = HttpClassifier::new(endpoint.clone(), timeout)
                .context("Failed to build classifier client")?;
            Ok(Arc::new(classifier))
        }
        None => {
            warn!("no classifier endpoint configured; every classification will fail");
            Ok(Arc::new(UnconfiguredClassifier))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = load_settings(&args)?;

    // Logging first so that startup is captured.
    let log_handle = match settings.logging.sqlite_path {
        Some(ref path) => {
            let conn = rusqlite::Connection::open(path)
                .with_context(|| format!("Failed to open log database {path}"))?;
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
                .context("Failed to set log database pragmas")?;
            let handle = warden_logging::init_subscriber_with_sqlite(&settings.logging.level, conn)
                .context("Failed to initialize log transport")?;
            Some(handle)
        }
        None => {
            warden_logging::init_subscriber(&settings.logging.level);
            None
        }
    };
    let flush_task = log_handle.clone().map(warden_logging::spawn_flush_task);

    let store = Arc::new(JsonFileStore::new(settings.data_path()));
    let ledger = Arc::new(ViolationLedger::open(store).await);
    info!(
        enabled_communities = ledger.enabled_count(),
        data_file = %settings.data_path().display(),
        "ledger loaded"
    );

    let platform = Arc::new(ConsolePlatform::stdout());
    let pipeline = Arc::new(EnforcementPipeline::new(
        Arc::clone(&ledger),
        build_classifier(&settings)?,
        platform.clone(),
        PipelineConfig {
            classify_timeout: settings.enforcement.classify_timeout(),
            image_attachments_only: settings.enforcement.image_attachments_only,
            self_id: args.self_id.map(MemberId::from),
            ..PipelineConfig::default()
        },
    ));
    let dispatcher = Dispatcher::new(pipeline, settings.enforcement.max_in_flight);
    let commands = CommandSurface::new(Arc::clone(&ledger), settings.commands.prefix.clone());

    info!(prefix = commands.prefix(), max_in_flight = settings.enforcement.max_in_flight, "moderator ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut interrupted = false;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                interrupted = true;
                break;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("input closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "failed to read input");
                break;
            }
        };
        match parse_line(&line) {
            None => {}
            Some(Ok(Inbound::Message(event))) => {
                let _ = dispatcher.dispatch(event);
            }
            Some(Ok(Inbound::Command(cmd))) => handle_command(&commands, &platform, cmd).await,
            Some(Err(e)) => warn!(error = %e, "skipping malformed input line"),
        }
    }

    // End of input still enforces everything accepted; an interrupt does not wait for the queue.
    let dropped = if interrupted {
        dispatcher.shutdown(SHUTDOWN_GRACE).await
    } else {
        dispatcher.close(SHUTDOWN_GRACE).await
    };
    if let Err(e) = ledger.persist().await {
        warn!(error = %e, "final ledger save failed");
    }
    info!(dropped, "moderator stopped");

    if let Some(task) = flush_task {
        task.abort();
    }
    if let Some(handle) = log_handle {
        handle.flush();
    }
    Ok(())
}

async fn handle_command(commands: &CommandSurface, platform: &ConsolePlatform, cmd: CommandEvent) {
    let ctx = CommandContext {
        community: cmd.community_id.clone(),
        invoker: cmd.author_id,
        is_admin: cmd.is_admin,
    };
    if let Some(reply) = commands.handle(&ctx, &cmd.text).await {
        if let Err(e) = platform.reply(cmd.community_id.as_ref(), &cmd.channel_id, &reply) {
            warn!(error = %e, channel_id = %cmd.channel_id, "failed to post command reply");
        }
    }
}
