// src/merge.rs
//! Incremental feed merge.
//!
//! Reconciles one fresh trend snapshot against a feed's history record:
//! new papers go first (in snapshot order), then previously retained papers
//! in their prior order. Retained papers that dropped out of the snapshot stay
//! visible for `retention_window` after `first_seen`, then are evicted for good.
//! The result is capped at `max_items`; the cap is the only place a paper that
//! is still trending can fall out of history.
//!
//! The merge is a pure in-memory transform. `now` is passed in.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

use crate::fingerprint::{fingerprint, Fingerprint, FingerprintMode};
use crate::history::HistoryRecord;
use crate::item::{ObservedItem, RetainedItem};

pub const DEFAULT_MAX_ITEMS: usize = 50;
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeParams {
    /// Upper bound on the display list; values below 1 act as 1.
    pub max_items: usize,
    pub retention_window: Duration,
    pub fingerprint_mode: FingerprintMode,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            retention_window: Duration::days(DEFAULT_RETENTION_DAYS),
            fingerprint_mode: FingerprintMode::default(),
        }
    }
}

impl MergeParams {
    pub fn new(max_items: usize, retention_window: Duration) -> Self {
        Self {
            max_items,
            retention_window,
            ..Self::default()
        }
    }

    pub fn with_fingerprint_mode(mut self, mode: FingerprintMode) -> Self {
        self.fingerprint_mode = mode;
        self
    }
}

/// Result of one merge.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Ordered, capped list to render.
    pub display_list: Vec<RetainedItem>,
    /// Record to persist; its items equal `display_list`.
    pub history: HistoryRecord,
    /// Papers first seen in this run (and still within the cap).
    pub new_fingerprints: BTreeSet<Fingerprint>,
    /// Papers dropped because their retention window ran out.
    pub evicted: usize,
    /// Papers dropped by the `max_items` cap.
    pub truncated: usize,
    /// Later duplicates inside the snapshot that were ignored.
    pub duplicates: usize,
}

impl MergeOutcome {
    pub fn is_new(&self, fp: &Fingerprint) -> bool {
        self.new_fingerprints.contains(fp)
    }

    pub fn new_count(&self) -> usize {
        self.new_fingerprints.len()
    }
}

/// Merge `observed` (API order) into `history` for the feed `identifier`.
pub fn merge(
    identifier: &str,
    observed: Vec<ObservedItem>,
    history: HistoryRecord,
    params: &MergeParams,
    now: DateTime<Utc>,
) -> MergeOutcome {
    // 1) Fingerprint the snapshot; first occurrence in API order wins.
    let mut seen_now: HashSet<Fingerprint> = HashSet::with_capacity(observed.len());
    let mut batch: Vec<(Fingerprint, ObservedItem)> = Vec::with_capacity(observed.len());
    let mut duplicates = 0usize;
    for item in observed {
        let fp = fingerprint(&item, params.fingerprint_mode);
        if seen_now.insert(fp.clone()) {
            batch.push((fp, item));
        } else {
            duplicates += 1;
        }
    }

    // 2) Split into truly new vs. already known. "Known" means a retained
    //    item exists for the fingerprint; the record's set mirrors its items.
    let known: HashSet<&Fingerprint> = history.items.iter().map(|i| &i.fingerprint).collect();
    let mut truly_new: Vec<RetainedItem> = Vec::new();
    let mut refreshed: HashMap<Fingerprint, ObservedItem> = HashMap::new();
    for (fp, item) in batch {
        if known.contains(&fp) {
            refreshed.insert(fp, item);
        } else {
            debug!(target: "merge", %identifier, fingerprint = %fp, title = %short_title(&item.title), "new paper");
            truly_new.push(RetainedItem {
                fingerprint: fp,
                first_seen: Some(now),
                currently_trending: true,
                item,
            });
        }
    }
    drop(known);

    // 3) Walk the retained items in prior order.
    let mut survivors: Vec<RetainedItem> = Vec::with_capacity(history.items.len());
    let mut evicted = 0usize;
    for mut retained in history.items {
        if let Some(fresh) = refreshed.remove(&retained.fingerprint) {
            retained.item = fresh;
            retained.currently_trending = true;
            survivors.push(retained);
            continue;
        }
        retained.currently_trending = false;
        match retained.first_seen {
            Some(ts) if now - ts >= params.retention_window => {
                debug!(target: "merge", %identifier, fingerprint = %retained.fingerprint, "retention window elapsed, evicting");
                evicted += 1;
            }
            // Unknown first_seen counts as not yet expired.
            _ => survivors.push(retained),
        }
    }

    // 4) New first, then survivors; first occurrence per fingerprint wins.
    let new_in_batch: HashSet<Fingerprint> =
        truly_new.iter().map(|it| it.fingerprint.clone()).collect();
    let mut emitted: HashSet<Fingerprint> = HashSet::with_capacity(truly_new.len() + survivors.len());
    let mut display_list: Vec<RetainedItem> = truly_new
        .into_iter()
        .chain(survivors)
        .filter(|it| emitted.insert(it.fingerprint.clone()))
        .collect();

    // 5) Cap.
    let cap = params.max_items.max(1);
    let truncated = display_list.len().saturating_sub(cap);
    display_list.truncate(cap);

    // 6) History mirrors the capped list.
    let new_fingerprints: BTreeSet<Fingerprint> = display_list
        .iter()
        .filter(|it| new_in_batch.contains(&it.fingerprint))
        .map(|it| it.fingerprint.clone())
        .collect();
    let new_history = HistoryRecord::from_items(display_list.clone(), history.last_updated);

    info!(
        target: "merge",
        %identifier,
        new = new_fingerprints.len(),
        total = display_list.len(),
        evicted,
        truncated,
        duplicates,
        "merged snapshot"
    );

    MergeOutcome {
        display_list,
        history: new_history,
        new_fingerprints,
        evicted,
        truncated,
        duplicates,
    }
}

fn short_title(title: &str) -> String {
    title.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint_title_authors;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn paper(title: &str, author: &str) -> ObservedItem {
        ObservedItem {
            title: title.into(),
            authors: vec![author.into()],
            ..ObservedItem::default()
        }
    }

    fn retained(title: &str, author: &str, first_seen: Option<DateTime<Utc>>) -> RetainedItem {
        RetainedItem {
            fingerprint: fingerprint_title_authors(title, &[author]),
            first_seen,
            currently_trending: true,
            item: paper(title, author),
        }
    }

    fn titles(list: &[RetainedItem]) -> Vec<&str> {
        list.iter().map(|r| r.item.title.as_str()).collect()
    }

    #[test]
    fn in_batch_duplicate_keeps_first_occurrence() {
        let mut first = paper("A", "X");
        first.citations = 1;
        let mut second = paper("A", "X");
        second.citations = 99;

        let out = merge(
            "f",
            vec![first, second, paper("B", "Y")],
            HistoryRecord::empty(),
            &MergeParams::default(),
            now(),
        );
        assert_eq!(titles(&out.display_list), vec!["A", "B"]);
        assert_eq!(out.display_list[0].item.citations, 1);
        assert_eq!(out.duplicates, 1);
    }

    #[test]
    fn still_trending_item_is_refreshed_in_place() {
        let seen = now() - Duration::days(2);
        let history = HistoryRecord::from_items(
            vec![retained("Old", "O", Some(seen)), retained("A", "X", Some(seen))],
            None,
        );
        let mut fresh = paper("A", "X");
        fresh.citations = 77;

        let out = merge("f", vec![fresh, paper("N", "Z")], history, &MergeParams::default(), now());
        // new first, then legacy order, no re-sorting of the refreshed item
        assert_eq!(titles(&out.display_list), vec!["N", "Old", "A"]);
        let a = &out.display_list[2];
        assert_eq!(a.item.citations, 77);
        assert_eq!(a.first_seen, Some(seen));
        assert!(a.currently_trending);
        assert!(!out.display_list[1].currently_trending);
        assert!(out.is_new(&out.display_list[0].fingerprint));
        assert!(!out.is_new(&a.fingerprint));
    }

    #[test]
    fn unknown_first_seen_is_kept() {
        let history = HistoryRecord::from_items(vec![retained("A", "X", None)], None);
        let out = merge("f", vec![], history, &MergeParams::default(), now());
        assert_eq!(out.display_list.len(), 1);
        assert!(!out.display_list[0].currently_trending);
        assert_eq!(out.display_list[0].first_seen, None);
    }

    #[test]
    fn eviction_boundary_is_exclusive() {
        let window = Duration::days(7);
        let params = MergeParams::new(10, window);
        let just_inside = retained("in", "X", Some(now() - window + Duration::seconds(1)));
        let exactly = retained("edge", "X", Some(now() - window));
        let history = HistoryRecord::from_items(vec![just_inside, exactly], None);

        let out = merge("f", vec![], history, &params, now());
        assert_eq!(titles(&out.display_list), vec!["in"]);
        assert_eq!(out.evicted, 1);
    }

    #[test]
    fn history_mirrors_display_list() {
        let history = HistoryRecord::from_items(
            (0..5)
                .map(|i| retained(&format!("old{i}"), "X", Some(now())))
                .collect(),
            None,
        );
        let observed = (0..4).map(|i| paper(&format!("new{i}"), "Y")).collect();
        let out = merge("f", observed, history, &MergeParams::new(6, Duration::days(7)), now());

        assert_eq!(titles(&out.display_list), vec!["new0", "new1", "new2", "new3", "old0", "old1"]);
        assert_eq!(out.truncated, 3);
        assert_eq!(out.history.items, out.display_list);
        assert!(out.history.is_consistent());
    }

    #[test]
    fn doi_mode_matches_across_title_changes() {
        let params = MergeParams::default().with_fingerprint_mode(FingerprintMode::Doi);
        let mut v1 = paper("Preprint title", "X");
        v1.doi = Some("10.5555/abc".into());
        let first = merge("f", vec![v1], HistoryRecord::empty(), &params, now());

        let mut v2 = paper("Published title", "X");
        v2.doi = Some("10.5555/ABC".into());
        let later = now() + Duration::hours(6);
        let second = merge("f", vec![v2], first.history, &params, later);

        assert_eq!(second.display_list.len(), 1);
        assert_eq!(second.new_count(), 0);
        assert_eq!(second.display_list[0].item.title, "Published title");
        assert_eq!(second.display_list[0].first_seen, Some(now()));
    }
}
