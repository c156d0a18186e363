// src/runner.rs
//! Sequential feed refresh: fetch → enrich → load history → merge → save → render.
//!
//! Feeds are processed one at a time in configured order. A feed whose fetch
//! fails (or yields no data) is reported as failed and left untouched: its
//! history record and previously published XML stay as they were.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::{AppConfig, FeedSpec};
use crate::history::HistoryStore;
use crate::merge::merge;
use crate::persist::write_atomic;
use crate::render::{render_index, render_rss, FeedDocument};
use crate::sources::enrich_all;
use crate::sources::types::{MetadataSource, TrendSnapshot, TrendSource};

pub const INDEX_FILE: &str = "index.html";

/// Every counter the crate increments, with its description.
const COUNTERS: &[(&str, &str)] = &[
    ("feeds_refreshed_total", "Feeds merged and republished."),
    (
        "feeds_failed_total",
        "Feeds skipped because of upstream errors or missing data.",
    ),
    ("feed_new_items_total", "Papers first seen in a run."),
    (
        "feed_evicted_items_total",
        "Papers dropped after their retention window.",
    ),
    (
        "history_load_fallbacks_total",
        "History records that were unreadable and replaced by an empty one.",
    ),
    ("trend_items_total", "Papers parsed from trend responses."),
    (
        "metadata_lookup_errors_total",
        "Metadata lookups that failed and were skipped.",
    ),
];

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        for (name, help) in COUNTERS {
            describe_counter!(*name, *help);
        }
        describe_gauge!("runner_last_run_ts", "Unix ts when the runner last finished.");
    });
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedOutcome {
    Published {
        path: PathBuf,
        new_items: usize,
        total_items: usize,
    },
    Failed {
        error: String,
        /// Previously published file, still served unchanged.
        previous: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedReport {
    pub feed: FeedSpec,
    pub identifier: String,
    pub outcome: FeedOutcome,
}

impl FeedReport {
    /// True when a feed file exists for this entry (fresh or previous).
    pub fn has_feed_file(&self) -> bool {
        match &self.outcome {
            FeedOutcome::Published { .. } => true,
            FeedOutcome::Failed { previous, .. } => previous.is_some(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub day: NaiveDate,
    pub feeds: Vec<FeedReport>,
}

impl RunReport {
    pub fn published(&self) -> usize {
        self.feeds
            .iter()
            .filter(|r| matches!(r.outcome, FeedOutcome::Published { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.feeds.len() - self.published()
    }
}

pub struct FeedRunner<'a> {
    config: &'a AppConfig,
    trends: &'a dyn TrendSource,
    metadata: Option<&'a dyn MetadataSource>,
    store: HistoryStore,
}

impl<'a> FeedRunner<'a> {
    pub fn new(config: &'a AppConfig, trends: &'a dyn TrendSource) -> Self {
        Self {
            config,
            trends,
            metadata: None,
            store: config.history_store(),
        }
    }

    pub fn with_metadata(mut self, metadata: &'a dyn MetadataSource) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn feed_path(&self, identifier: &str) -> PathBuf {
        self.config.output_dir.join(format!("{identifier}.xml"))
    }

    /// Refresh every configured feed for `day`, in order.
    pub async fn run(&self, day: NaiveDate) -> RunReport {
        ensure_metrics_described();
        info!(target: "runner", feeds = self.config.feeds.len(), %day, "starting trend monitoring");

        let pause = self.config.pause_between_feeds();
        let mut reports = Vec::with_capacity(self.config.feeds.len());
        for (i, feed) in self.config.feeds.iter().enumerate() {
            if i > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            reports.push(self.run_feed(feed, day).await);
        }

        gauge!("runner_last_run_ts").set(Utc::now().timestamp() as f64);
        let report = RunReport {
            day,
            feeds: reports,
        };
        info!(
            target: "runner",
            published = report.published(),
            failed = report.failed(),
            "monitoring finished"
        );
        report
    }

    pub async fn run_feed(&self, feed: &FeedSpec, day: NaiveDate) -> FeedReport {
        let identifier = feed.identifier();
        let outcome = match self.refresh(feed, &identifier, day).await {
            Ok(outcome) => {
                counter!("feeds_refreshed_total").increment(1);
                outcome
            }
            Err(e) => {
                let error = format!("{e:#}");
                warn!(target: "runner", %identifier, %error, "feed not refreshed");
                counter!("feeds_failed_total").increment(1);
                let prev = self.feed_path(&identifier);
                FeedOutcome::Failed {
                    error,
                    previous: prev.exists().then_some(prev),
                }
            }
        };
        FeedReport {
            feed: feed.clone(),
            identifier,
            outcome,
        }
    }

    async fn refresh(&self, feed: &FeedSpec, identifier: &str, day: NaiveDate) -> Result<FeedOutcome> {
        let mut observed = match self.trends.fetch(feed, day).await? {
            TrendSnapshot::Items(items) => items,
            TrendSnapshot::NoData(reason) => bail!("{} returned no data: {reason}", self.trends.name()),
        };

        if let Some(meta) = self.metadata {
            let n = enrich_all(&mut observed, meta).await;
            tracing::debug!(target: "runner", %identifier, enriched = n, "metadata enrichment done");
        }

        let history = self.store.load(identifier);
        let now = Utc::now();
        let mut outcome = merge(identifier, observed, history, &self.config.merge_params(), now);

        let display_name = feed.display_name();
        let doc = FeedDocument {
            identifier,
            display_name: &display_name,
            items: &outcome.display_list,
            new_fingerprints: &outcome.new_fingerprints,
        };
        let xml = render_rss(&doc, now).with_context(|| format!("rendering {identifier}"))?;

        self.store.save(identifier, &mut outcome.history)?;
        let path = self.feed_path(identifier);
        write_atomic(&path, xml.as_bytes())
            .with_context(|| format!("writing feed {}", path.display()))?;

        counter!("feed_new_items_total").increment(outcome.new_count() as u64);
        counter!("feed_evicted_items_total").increment(outcome.evicted as u64);
        info!(target: "runner", %identifier, path = %path.display(), "feed saved");

        Ok(FeedOutcome::Published {
            path,
            new_items: outcome.new_count(),
            total_items: outcome.display_list.len(),
        })
    }
}

/// Write `index.html` for a finished run into the output directory.
pub fn write_index(config: &AppConfig, report: &RunReport) -> Result<PathBuf> {
    let html = render_index(&report.feeds, &config.public_base_url, Utc::now());
    let path = config.output_dir.join(INDEX_FILE);
    write_atomic(&path, html.as_bytes())
        .with_context(|| format!("writing index {}", path.display()))?;
    info!(target: "runner", path = %path.display(), "index page written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_incremented_counter_is_described() {
        let sources = [
            include_str!("runner.rs"),
            include_str!("history.rs"),
            include_str!("sources/mod.rs"),
            include_str!("sources/ooir.rs"),
        ];
        let re = regex::Regex::new(r#"\bcounter!\("([a-z_]+)"\)"#).unwrap();
        let mut used = 0;
        for src in sources {
            for cap in re.captures_iter(src) {
                used += 1;
                let name = &cap[1];
                assert!(
                    COUNTERS.iter().any(|(n, _)| *n == name),
                    "counter {name} has no description"
                );
            }
        }
        assert!(used >= COUNTERS.len());
        ensure_metrics_described();
    }
}
