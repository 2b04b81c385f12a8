// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use arenad::config::ArenaConfig;
use arenad::AppContext;

#[derive(Parser)]
#[command(
    name = "arenad",
    about = "Reviewer Arena — blind pairwise review comparisons with Elo ratings",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// REST API server port
    #[arg(long, env = "ARENAD_PORT")]
    port: Option<u16>,

    /// Data directory for config, registries, the vote log, and the SQLite database
    #[arg(long, env = "ARENAD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ARENAD_LOG")]
    log: Option<String>,

    /// Bind address (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "ARENAD_BIND")]
    bind_address: Option<String>,

    /// Paper registry snapshot, JSONL (default: {data_dir}/papers.jsonl)
    #[arg(long, env = "ARENAD_PAPERS_FILE")]
    papers_file: Option<std::path::PathBuf>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "ARENAD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the arena server (default when no subcommand given).
    Serve,
    /// Replay the full vote history and print the resulting leaderboard.
    ///
    /// Offline check that the incremental in-memory ratings and the canonical
    /// replay agree. Does not modify anything.
    Recompute,
    /// Append votes present in SQLite but missing from the JSONL log.
    ///
    /// The server runs this automatically on every maintenance sweep; the
    /// subcommand exists for one-off repairs while the server is down.
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ArenaConfig::new(
        args.port,
        args.data_dir,
        args.log,
        args.bind_address,
        args.papers_file,
    );
    let _log_guard = setup_logging(&config.log, args.log_file.as_deref(), &config.log_format);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Recompute => recompute(config).await,
        Command::Reconcile => reconcile(config).await,
    }
}

async fn serve(config: ArenaConfig) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.data_dir.display(),
        "starting arenad"
    );
    let sweep_interval = config.sweep_interval_secs;
    let ctx = AppContext::new(config).await?;

    // Background maintenance: session expiry + vote log reconciliation.
    let sweep_ctx = Arc::clone(&ctx);
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(sweep_interval.max(1)));
        // The first tick fires immediately, which doubles as crash recovery:
        // any divergence left by an unclean shutdown is repaired before the
        // server takes meaningful traffic.
        loop {
            ticker.tick().await;
            sweep_ctx.maintenance_sweep().await;
        }
    });

    arenad::rest::start_rest_server(ctx).await
}

async fn recompute(config: ArenaConfig) -> Result<()> {
    let storage = arenad::storage::Storage::new(&config.data_dir).await?;
    let store = arenad::votes::VoteStore::new(storage.pool(), &config.data_dir);
    let votes = store.all_votes().await?;
    let book = arenad::rating::RatingBook::new(config.k_factor, config.default_rating);
    book.recompute(&votes).await;

    println!("{} votes replayed", votes.len());
    for entry in book.leaderboard().await {
        println!(
            "{:<24} {:>8.1}  ({} comparisons, 95% CI {:.1}..{:.1})",
            entry.reviewer, entry.rating, entry.comparisons, entry.ci_lower, entry.ci_upper
        );
    }
    Ok(())
}

async fn reconcile(config: ArenaConfig) -> Result<()> {
    let storage = arenad::storage::Storage::new(&config.data_dir).await?;
    let store = arenad::votes::VoteStore::new(storage.pool(), &config.data_dir);
    let appended = store.reconcile().await?;
    println!("{appended} vote(s) appended to the log");
    Ok(())
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("arenad.log"));

        if let Err(e) = std::fs::create_dir_all(dir) {
            // Subscriber is not installed yet, so plain stderr it is.
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}
