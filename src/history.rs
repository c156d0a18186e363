//! Per-feed record of retained papers, persisted as versioned JSON.
//!
//! One file per feed identifier under `<output_dir>/.history/`. Reads are
//! self-healing: a missing, truncated or otherwise unreadable record loads as
//! empty (the papers simply show up as new once more). Writes are atomic.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::fingerprint::Fingerprint;
use crate::item::{de_lenient_timestamp, RetainedItem};
use crate::persist::write_atomic;

/// Current on-disk schema version.
pub const HISTORY_VERSION: u32 = 1;

const HISTORY_SUFFIX: &str = "_history.json";

/// Retained papers of one feed.
///
/// `fingerprints` is always exactly the fingerprint set of `items`, and
/// `items` never holds two entries with the same fingerprint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryRecord {
    pub fingerprints: BTreeSet<Fingerprint>,
    pub items: Vec<RetainedItem>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl HistoryRecord {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a record from an item list, keeping the first item per fingerprint.
    pub fn from_items(items: Vec<RetainedItem>, last_updated: Option<DateTime<Utc>>) -> Self {
        let mut fingerprints = BTreeSet::new();
        let mut kept = Vec::with_capacity(items.len());
        for it in items {
            if fingerprints.insert(it.fingerprint.clone()) {
                kept.push(it);
            }
        }
        Self {
            fingerprints,
            items: kept,
            last_updated,
        }
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.fingerprints.contains(fp)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True when the set/list invariants hold.
    pub fn is_consistent(&self) -> bool {
        let from_items: BTreeSet<&Fingerprint> = self.items.iter().map(|i| &i.fingerprint).collect();
        from_items.len() == self.items.len()
            && from_items.len() == self.fingerprints.len()
            && self.fingerprints.iter().all(|fp| from_items.contains(fp))
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let file = HistoryFileRef {
            version: HISTORY_VERSION,
            fingerprints: &self.fingerprints,
            items: &self.items,
            last_updated: self.last_updated,
        };
        serde_json::to_vec_pretty(&file).context("serializing history record")
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let raw: Value = serde_json::from_slice(bytes).context("history is not valid JSON")?;
        let version = raw
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("history has no schema version"))?;
        match version {
            1 => {
                let f: HistoryFileV1 =
                    serde_json::from_value(raw).context("decoding history v1")?;
                Ok(f.migrate())
            }
            other => bail!("unsupported history schema version {other}"),
        }
    }
}

#[derive(Serialize)]
struct HistoryFileRef<'a> {
    version: u32,
    fingerprints: &'a BTreeSet<Fingerprint>,
    items: &'a [RetainedItem],
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct HistoryFileV1 {
    // Stored for readers of the raw file; rebuilt from `items` on load.
    #[serde(default)]
    #[allow(dead_code)]
    fingerprints: Vec<Fingerprint>,
    #[serde(default)]
    items: Vec<RetainedItem>,
    #[serde(default, deserialize_with = "de_lenient_timestamp")]
    last_updated: Option<DateTime<Utc>>,
}

impl HistoryFileV1 {
    fn migrate(self) -> HistoryRecord {
        HistoryRecord::from_items(self.items, self.last_updated)
    }
}

/// Directory of history records, one file per feed identifier.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Store living in the conventional `.history` directory of a feed output dir.
    pub fn in_output_dir(output_dir: &Path) -> Self {
        Self::new(output_dir.join(".history"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, identifier: &str) -> PathBuf {
        self.dir.join(format!("{identifier}{HISTORY_SUFFIX}"))
    }

    /// Load the record for `identifier`; never fails.
    pub fn load(&self, identifier: &str) -> HistoryRecord {
        let path = self.path_for(identifier);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(target: "history", %identifier, "no history yet, starting empty");
                return HistoryRecord::empty();
            }
            Err(e) => {
                warn!(target: "history", %identifier, error = %e, "history unreadable, starting empty");
                counter!("history_load_fallbacks_total").increment(1);
                return HistoryRecord::empty();
            }
        };
        match HistoryRecord::decode(&bytes) {
            Ok(rec) => rec,
            Err(e) => {
                warn!(target: "history", %identifier, error = %format!("{e:#}"), "history corrupt, starting empty");
                counter!("history_load_fallbacks_total").increment(1);
                HistoryRecord::empty()
            }
        }
    }

    /// Overwrite the record for `identifier`, stamping `last_updated`.
    pub fn save(&self, identifier: &str, record: &mut HistoryRecord) -> Result<()> {
        record.last_updated = Some(Utc::now());
        let bytes = record.encode()?;
        let path = self.path_for(identifier);
        write_atomic(&path, &bytes)
            .with_context(|| format!("saving history for {identifier}"))?;
        debug!(target: "history", %identifier, items = record.len(), "history saved");
        Ok(())
    }

    /// Identifiers that have a record on disk, sorted.
    pub fn identifiers(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("listing {}", self.dir.display()));
            }
        };
        let mut out: Vec<String> = entries
            .flatten()
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.strip_suffix(HISTORY_SUFFIX).map(str::to_string)
            })
            .collect();
        out.sort();
        Ok(out)
    }

    /// Drop items first seen before `cutoff`. Items with an unknown
    /// `first_seen` stay. Returns how many were removed.
    pub fn prune_older_than(&self, identifier: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        let record = self.load(identifier);
        let before = record.len();
        let kept: Vec<RetainedItem> = record
            .items
            .into_iter()
            .filter(|it| it.first_seen.map_or(true, |ts| ts >= cutoff))
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            let mut pruned = HistoryRecord::from_items(kept, record.last_updated);
            self.save(identifier, &mut pruned)?;
            info!(target: "history", %identifier, removed, "pruned old papers");
        }
        Ok(removed)
    }

    /// Delete the record. Returns false when there was none.
    pub fn reset(&self, identifier: &str) -> Result<bool> {
        let path = self.path_for(identifier);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }
}
