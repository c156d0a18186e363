//! OOIR trend monitor: refreshes every configured feed once and writes the index page.
//! Meant to be run periodically by an external scheduler (cron, CI).

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use std::path::PathBuf;

use ooir_trend_feeds::runner::{write_index, FeedOutcome, FeedRunner};
use ooir_trend_feeds::sources::crossref::CrossrefMetadataSource;
use ooir_trend_feeds::sources::ooir::OoirTrendSource;
use ooir_trend_feeds::{init_tracing, AppConfig};

#[derive(Parser, Debug)]
#[command(
    name = "ooir-trend-feeds",
    about = "Fetch OOIR paper trends and republish them as per-category RSS feeds"
)]
struct Cli {
    /// Config file (TOML, or JSON by extension). Defaults to $OOIR_CONFIG_PATH or config/ooir.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for feeds, index and history.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Trend day to query (YYYY-MM-DD). Defaults to today (UTC).
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Maximum items per feed.
    #[arg(long)]
    max_items: Option<usize>,

    /// Days a paper stays visible after it leaves the trend list.
    #[arg(long)]
    retention_days: Option<i64>,

    /// Fill missing paper metadata from Crossref.
    #[arg(long, default_value_t = false)]
    enrich: bool,
}

fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut cfg = match &cli.config {
        Some(p) => AppConfig::load_from(p)?,
        None => AppConfig::load_default()?,
    };
    if let Some(dir) = &cli.output_dir {
        cfg.output_dir = dir.clone();
    }
    if let Some(n) = cli.max_items {
        cfg.max_items = n;
    }
    if let Some(d) = cli.retention_days {
        cfg.retention_days = d;
    }
    if cli.enrich {
        cfg.enrich_metadata = true;
    }
    cfg.sanitize();
    Ok(cfg)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let cfg = resolve_config(&cli)?;
    let day = cli.date.unwrap_or_else(|| Utc::now().date_naive());
    if !cfg.has_contact_email() {
        tracing::warn!(
            "no contact email configured; set {} or `email` in the config",
            ooir_trend_feeds::config::app::ENV_EMAIL
        );
    }

    let trends = OoirTrendSource::http(&cfg.api_base_url, &cfg.email, cfg.request_timeout())?;
    let crossref = if cfg.enrich_metadata {
        Some(CrossrefMetadataSource::new(
            &cfg.metadata_base_url,
            &cfg.email,
            cfg.request_timeout(),
        )?)
    } else {
        None
    };

    let mut runner = FeedRunner::new(&cfg, &trends);
    if let Some(c) = &crossref {
        runner = runner.with_metadata(c);
    }

    let report = runner.run(day).await;
    let index = write_index(&cfg, &report).context("writing index page")?;

    println!("\n=== OOIR trend monitoring results ({}) ===", report.day);
    for r in &report.feeds {
        match &r.outcome {
            FeedOutcome::Published {
                path,
                new_items,
                total_items,
            } => println!(
                "{}: {} ({} papers, {} new)",
                r.feed.display_name(),
                path.display(),
                total_items,
                new_items
            ),
            FeedOutcome::Failed { error, .. } => {
                println!("{}: ERROR: {}", r.feed.display_name(), error)
            }
        }
    }
    println!(
        "\nFeeds written to '{}'. Open '{}' for an overview.",
        cfg.output_dir.display(),
        index.display()
    );
    Ok(())
}
