// src/manage.rs
//! Maintenance over a published output directory: statistics, validation
//! and history cleanup. Used by the `feed-manager` binary.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::history::HistoryStore;
use crate::render::rss::NEW_MARKER;

#[derive(Debug, Deserialize)]
struct RssDoc {
    channel: Option<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "lastBuildDate")]
    last_build_date: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
}

fn parse_rfc2822_to_unix(ts: &str) -> Option<i64> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeedStats {
    pub filename: String,
    pub title: Option<String>,
    pub total_items: usize,
    pub new_items: usize,
    pub last_build_date: Option<String>,
    pub last_build_unix: Option<i64>,
    pub file_size: u64,
    pub known_papers: Option<usize>,
    pub history_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub feeds: BTreeMap<String, FeedStats>,
    pub total_feeds: usize,
    pub total_papers: usize,
    /// Files that could not be parsed, with the reason.
    pub unreadable: BTreeMap<String, String>,
    pub generated_at: DateTime<Utc>,
}

/// A feed that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidFeed {
    pub title: String,
    pub items: usize,
}

/// `*.xml` files in `dir`, sorted by name.
pub fn feed_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("listing {}", dir.display())),
    };
    let mut out: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("xml"))
        .collect();
    out.sort();
    Ok(out)
}

fn root_element_name(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().context("reading xml")? {
            Event::Start(e) | Event::Empty(e) => {
                return Ok(String::from_utf8_lossy(e.name().as_ref()).into_owned())
            }
            Event::Eof => bail!("empty document"),
            _ => {}
        }
    }
}

/// Check the RSS basics: `<rss>` root, a `<channel>`, and a non-empty channel title.
pub fn validate_feed_xml(xml: &str) -> Result<ValidFeed> {
    let root = root_element_name(xml)?;
    if root != "rss" {
        bail!("not an RSS feed (root element is <{root}>, expected <rss>)");
    }
    let doc: RssDoc = quick_xml::de::from_str(xml).context("parsing rss")?;
    let channel = doc.channel.ok_or_else(|| anyhow!("no <channel> element"))?;
    let title = channel
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| anyhow!("channel has no title"))?;
    Ok(ValidFeed {
        title,
        items: channel.item.len(),
    })
}

/// Validate every feed file in `dir`.
pub fn validate_dir(dir: &Path) -> Result<Vec<(String, Result<ValidFeed>)>> {
    let mut out = Vec::new();
    for path in feed_files(dir)? {
        let name = file_name(&path);
        let verdict = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))
            .and_then(|xml| validate_feed_xml(&xml));
        out.push((name, verdict));
    }
    Ok(out)
}

fn feed_stats(path: &Path, store: &HistoryStore) -> Result<FeedStats> {
    let xml = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let doc: RssDoc = quick_xml::de::from_str(&xml).context("parsing rss")?;
    let channel = doc.channel.ok_or_else(|| anyhow!("no <channel> element"))?;
    let new_items = channel
        .item
        .iter()
        .filter(|i| i.title.as_deref().is_some_and(|t| t.contains(NEW_MARKER)))
        .count();
    let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    let identifier = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let (known_papers, history_updated) = if store.path_for(&identifier).exists() {
        let rec = store.load(&identifier);
        (Some(rec.len()), rec.last_updated)
    } else {
        (None, None)
    };

    Ok(FeedStats {
        filename: file_name(path),
        title: channel.title,
        total_items: channel.item.len(),
        new_items,
        last_build_unix: channel.last_build_date.as_deref().and_then(parse_rfc2822_to_unix),
        last_build_date: channel.last_build_date,
        file_size,
        known_papers,
        history_updated,
    })
}

/// Collect statistics over all feeds in `output_dir`, keyed by identifier.
pub fn collect_stats(output_dir: &Path) -> Result<StatsReport> {
    let store = HistoryStore::in_output_dir(output_dir);
    let mut feeds = BTreeMap::new();
    let mut unreadable = BTreeMap::new();
    for path in feed_files(output_dir)? {
        let key = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        match feed_stats(&path, &store) {
            Ok(s) => {
                feeds.insert(key, s);
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %format!("{e:#}"), "skipping unreadable feed");
                unreadable.insert(file_name(&path), format!("{e:#}"));
            }
        }
    }
    let total_papers = feeds.values().map(|s: &FeedStats| s.total_items).sum();
    Ok(StatsReport {
        total_feeds: feeds.len(),
        total_papers,
        feeds,
        unreadable,
        generated_at: Utc::now(),
    })
}

/// Remove history items first seen more than `days` ago in every record.
/// Returns per-identifier counts of removed items (only non-zero entries).
pub fn clean_old_history(output_dir: &Path, days: i64) -> Result<Vec<(String, usize)>> {
    if days < 0 {
        bail!("days must not be negative, got {days}");
    }
    let cutoff = Duration::try_days(days)
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .ok_or_else(|| anyhow!("{days} days reaches before the earliest representable date"))?;
    let store = HistoryStore::in_output_dir(output_dir);
    let mut cleaned = Vec::new();
    for id in store.identifiers()? {
        let removed = store.prune_older_than(&id, cutoff)?;
        if removed > 0 {
            cleaned.push((id, removed));
        }
    }
    Ok(cleaned)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}
