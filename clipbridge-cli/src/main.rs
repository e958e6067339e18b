//! clipbridge - clipboard history capture and cross-device code sync.
//!
//! Thin operator-facing dispatch over the store and query engine; the
//! interesting machinery lives in `clipbridge-core` and `clipbridge-sync`.

mod config;
mod monitor;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use clipbridge_core::{ClipboardItem, HistoryFilter, HistoryStore, StoreStats};

use crate::config::Config;

/// Cap for list-style output; the full history stays queryable.
const DISPLAY_LIMIT: usize = 50;

#[derive(Debug, Parser)]
#[command(
    name = "clipbridge",
    about = "Clipboard history capture and cross-device access-code sync",
    version
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the history database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Override the bridge base URL
    #[arg(long, global = true)]
    bridge_url: Option<String>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the most recent history items
    Display,
    /// Search history by substring, optionally constrained to tags
    Search {
        query: String,
        /// Require a tag (repeatable; all must be present)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Only items captured within the last N hours
        #[arg(long)]
        hours: Option<u64>,
    },
    /// Show items captured within the last N hours
    Recent {
        #[arg(default_value_t = 24)]
        hours: u64,
    },
    /// List captured access codes
    #[command(name = "yourl-codes")]
    YourlCodes,
    /// Show store and sync counters
    Stats,
    /// Delete all history
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Watch the clipboard and sync with the bridge until interrupted
    Monitor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.db_path = Some(db);
    }
    if let Some(url) = cli.bridge_url {
        config.bridge_url = Some(url);
    }
    // surface invalid pattern configuration before touching the store
    config.pattern_set()?;

    let store = Arc::new(HistoryStore::open(config.resolve_db_path()?)?);

    match cli.command {
        Command::Display => {
            render_items(&store.list(&HistoryFilter::default())?);
        }
        Command::Search { query, tags, hours } => {
            let mut filter = HistoryFilter::default().with_text(query);
            for tag in tags {
                filter = filter.with_tag(tag);
            }
            if let Some(hours) = hours {
                filter = filter.with_since_hours(hours);
            }
            render_items(&store.list(&filter)?);
        }
        Command::Recent { hours } => {
            render_items(&store.list(&HistoryFilter::default().with_since_hours(hours))?);
        }
        Command::YourlCodes => {
            render_items(&store.find_access_codes()?);
        }
        Command::Stats => {
            render_stats(&store.stats()?);
        }
        Command::Clear { yes } => {
            let total = store.stats()?.total_items;
            if yes {
                store.clear()?;
                println!("Cleared {total} items.");
            } else {
                println!("Would delete {total} items; re-run with --yes to confirm.");
            }
        }
        Command::Monitor => {
            monitor::run(&config, store).await?;
        }
    }

    Ok(())
}

fn setup_logging(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt()
        .with_env_filter(filter)
        .with_target(verbose > 1)
        .init();
}

fn render_items(items: &[ClipboardItem]) {
    if items.is_empty() {
        println!("No clipboard items found.");
        return;
    }

    println!("Clipboard history ({} items)", items.len());
    for (i, item) in items.iter().take(DISPLAY_LIMIT).enumerate() {
        let tags: Vec<&str> = item.tags.iter().map(String::as_str).collect();
        println!("\n{}. {}", i + 1, item.preview(80));
        println!(
            "   captured {}  device {}  seen {}x{}",
            item.captured_at.format("%Y-%m-%d %H:%M:%S"),
            item.device_id,
            item.seen_count,
            if item.truncated { "  (truncated)" } else { "" },
        );
        println!("   tags: {}", tags.join(", "));
    }
    if items.len() > DISPLAY_LIMIT {
        println!("\n… {} more not shown", items.len() - DISPLAY_LIMIT);
    }
}

fn render_stats(stats: &StoreStats) {
    println!("items:         {}", stats.total_items);
    println!("access codes:  {}", stats.access_code_items);
    println!("pending push:  {}", stats.pending_push);
    println!(
        "last sync:     {}",
        stats
            .last_sync_at
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string())
    );
    println!(
        "watermark:     {}",
        stats
            .watermark
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "none".to_string())
    );
}
