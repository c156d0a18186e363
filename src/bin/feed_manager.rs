//! Maintenance CLI for a published feed directory: stats, cleanup, reset, validation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ooir_trend_feeds::manage::{clean_old_history, collect_stats, validate_dir};
use ooir_trend_feeds::{init_tracing, FeedSpec, HistoryStore};

#[derive(Parser, Debug)]
#[command(name = "feed-manager", about = "Manage OOIR RSS feeds")]
struct Cli {
    /// RSS feed directory.
    #[arg(long, env = "OOIR_OUTPUT_DIR", default_value = "rss_feeds")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show statistics for every feed.
    Stats {
        /// Also export the statistics as JSON to this path.
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Drop history entries first seen more than N days ago.
    Clean {
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(i64).range(0..=36_500))]
        days: i64,
    },
    /// Delete the history of one feed.
    Reset {
        #[arg(long)]
        field: String,
        #[arg(long)]
        category: Option<String>,
    },
    /// Check every feed for basic RSS structure.
    Validate,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Stats { json } => {
            let stats = collect_stats(&cli.dir)?;
            println!("{}", "=".repeat(60));
            println!("OOIR RSS FEED STATISTICS");
            println!("{}", "=".repeat(60));
            println!("Feeds: {}", stats.total_feeds);
            println!("Papers: {}", stats.total_papers);
            println!();
            if stats.feeds.is_empty() {
                println!("No RSS feeds found in {}", cli.dir.display());
            }
            for (id, s) in &stats.feeds {
                println!("{}", s.title.as_deref().unwrap_or(id));
                println!("  file:    {}", s.filename);
                println!("  items:   {} ({} new)", s.total_items, s.new_items);
                println!("  size:    {} bytes", s.file_size);
                println!(
                    "  updated: {}",
                    s.last_build_date.as_deref().unwrap_or("unknown")
                );
                if let Some(k) = s.known_papers {
                    println!("  known papers: {k}");
                }
                println!();
            }
            for (file, err) in &stats.unreadable {
                println!("unreadable: {file}: {err}");
            }
            if let Some(path) = json {
                let body = serde_json::to_vec_pretty(&stats).context("serializing stats")?;
                std::fs::write(&path, body)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("Statistics exported to {}", path.display());
            }
        }
        Command::Clean { days } => {
            let cleaned = clean_old_history(&cli.dir, days)?;
            for (id, n) in &cleaned {
                println!("{id}: removed {n} old papers");
            }
            let total: usize = cleaned.iter().map(|(_, n)| n).sum();
            println!("Cleanup finished. {total} old papers removed.");
        }
        Command::Reset { field, category } => {
            let feed = FeedSpec::new(&field, category.as_deref());
            let store = HistoryStore::in_output_dir(&cli.dir);
            if store.reset(&feed.identifier())? {
                println!("History for '{}' reset", feed.display_name());
            } else {
                println!("No history found for '{}'", feed.display_name());
            }
        }
        Command::Validate => {
            println!("Validating RSS feeds...");
            println!("{}", "-".repeat(40));
            let results = validate_dir(&cli.dir)?;
            let mut invalid = 0usize;
            for (file, verdict) in &results {
                match verdict {
                    Ok(v) => println!("ok   {file}: {} items, title '{}'", v.items, v.title),
                    Err(e) => {
                        invalid += 1;
                        println!("FAIL {file}: {e:#}");
                    }
                }
            }
            println!("{}", "-".repeat(40));
            println!("valid:   {}", results.len() - invalid);
            println!("invalid: {invalid}");
            if invalid > 0 {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
