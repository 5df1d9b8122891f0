//! offcache - drive offline generations from the command line.
//!
//! Builds and inspects the generations of one scope on local disk, and routes
//! single requests through them the way an intercepting host would.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use offcache_core::notify::MessageSink;
use offcache_core::{
    BroadcastSink, Config, DiskStorage, HttpNetwork, OfflineWorker, Request, ServedFrom, Session,
    StaticSessions, WorkerContext,
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable overriding the configured scope
const SCOPE_ENV: &str = "OFFCACHE_SCOPE";

/// Extra wait after the notification delay so the last event gets printed
const WATCH_GRACE_MS: u64 = 250;

#[derive(Parser)]
#[command(name = "offcache", version, about = "Versioned offline generations for web apps")]
struct Cli {
    /// Scope URL (overrides config and OFFCACHE_SCOPE)
    #[arg(long, global = true)]
    scope: Option<String>,

    /// Directory holding generations
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    /// Also write logs to a daily-rotated file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an update check, building a new generation if the manifest changed
    Check {
        /// Treat this as the install-time check
        #[arg(long)]
        first: bool,
    },
    /// List stored generations, oldest first
    List,
    /// Route one request through the stored generations
    Fetch {
        url: String,
        /// Route as a top-level navigation
        #[arg(long)]
        navigate: bool,
        /// URL of an open session (repeatable)
        #[arg(long = "session")]
        sessions: Vec<String>,
    },
    /// Run an update check and print every notification as JSON
    Watch,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(verbose: u8, log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    // RUST_LOG wins; otherwise -v raises the default level
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "offcache.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn build_worker(
    cli: &Cli,
    config: &Config,
    sessions: Vec<Session>,
    sink: Option<Arc<dyn MessageSink>>,
) -> Result<OfflineWorker> {
    let mut config = config.clone();
    if let Some(scope) = cli.scope.clone().or_else(|| std::env::var(SCOPE_ENV).ok()) {
        config.scope = Some(scope);
    }
    if let Some(dir) = cli.storage_dir.clone() {
        config.storage_dir = Some(dir);
    }

    let settings = config
        .worker_settings()
        .context("Pass --scope, set OFFCACHE_SCOPE, or add \"scope\" to the config file")?;
    let storage = DiskStorage::new(config.storage_dir()?).context("Failed to open storage directory")?;
    let network = HttpNetwork::with_timeout(config.request_timeout())?;

    let context = WorkerContext {
        network: Arc::new(network),
        storage: Arc::new(storage),
        sessions: Arc::new(StaticSessions::new(sessions)),
        sink,
    };
    Ok(OfflineWorker::new(&settings, context)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.log_dir.as_ref());
    let config = Config::load()?;

    match &cli.command {
        Command::Check { first } => {
            let worker = build_worker(&cli, &config, Vec::new(), None)?;
            let outcome = worker.coordinator().check_for_update(*first).await;
            println!("{:?}", outcome);
        }
        Command::List => {
            let worker = build_worker(&cli, &config, Vec::new(), None)?;
            let generations = worker.generations().list_generations().await?;
            if generations.is_empty() {
                println!("No generations stored");
            }
            let newest = generations.len().saturating_sub(1);
            for (i, name) in generations.iter().enumerate() {
                let version = worker.generations().version_of(name).unwrap_or("?");
                let role = match (i, generations.len()) {
                    (0, 1) => "current",
                    (0, _) => "serving",
                    (i, _) if i == newest => "pending",
                    _ => "superseded",
                };
                println!("v{:<12} {:<10} {}", version, role, name);
            }
        }
        Command::Fetch {
            url,
            navigate,
            sessions,
        } => {
            let sessions = sessions.iter().map(Session::controlled).collect();
            let worker = build_worker(&cli, &config, sessions, None)?;
            let request = if *navigate {
                Request::navigate(url.as_str())
            } else {
                Request::get(url.as_str())
            };

            let outcome = worker.handle_fetch(request).await;
            let source = match &outcome.served_from {
                ServedFrom::Generation(name) => name.as_str(),
                ServedFrom::Network => "network",
            };
            match &outcome.response {
                Ok(response) => println!(
                    "{} {} ({} bytes) from {}",
                    response.status,
                    response.status_text,
                    response.body.len(),
                    source
                ),
                Err(e) => println!("failed: {}", e),
            }

            if let Some(background) = outcome.background {
                let check = background.await.context("Background update check panicked")?;
                info!(outcome = ?check, "Background update check finished");
            }
        }
        Command::Watch => {
            let sink = Arc::new(BroadcastSink::new());
            let mut events = sink.subscribe();
            let handle: Arc<dyn MessageSink> = sink.clone();
            let worker = build_worker(&cli, &config, Vec::new(), Some(handle))?;

            let first = worker.generations().list_generations().await?.is_empty();
            let outcome = worker.coordinator().check_for_update(first).await;

            // Notifications arrive after the configured delay
            let wait = Duration::from_millis(config.notify_delay_ms + WATCH_GRACE_MS);
            let deadline = tokio::time::Instant::now() + wait;
            while let Ok(Ok(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
                println!("{}", serde_json::to_string(&event)?);
            }
            eprintln!("{:?}", outcome);
        }
    }

    Ok(())
}
