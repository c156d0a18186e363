// tests/runner_e2e.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;

use ooir_trend_feeds::runner::write_index;
use ooir_trend_feeds::sources::types::{Metadata, MetadataSource, TrendSnapshot, TrendSource};
use ooir_trend_feeds::{AppConfig, FeedOutcome, FeedRunner, FeedSpec, HistoryStore, ObservedItem};

#[derive(Clone)]
enum Scripted {
    Items(Vec<&'static str>),
    NoData,
    Fail,
}

/// Trend source answering per feed identifier from a script that tests can swap.
#[derive(Default)]
struct ScriptedSource {
    script: Mutex<HashMap<String, Scripted>>,
}

impl ScriptedSource {
    fn set(&self, feed: &FeedSpec, answer: Scripted) {
        self.script
            .lock()
            .unwrap()
            .insert(feed.identifier(), answer);
    }
}

#[async_trait]
impl TrendSource for ScriptedSource {
    async fn fetch(&self, feed: &FeedSpec, _day: NaiveDate) -> Result<TrendSnapshot> {
        let answer = self.script.lock().unwrap().get(&feed.identifier()).cloned();
        match answer {
            Some(Scripted::Items(titles)) => Ok(TrendSnapshot::Items(
                titles
                    .into_iter()
                    .map(|t| ObservedItem {
                        title: t.to_string(),
                        authors: vec!["Doe J".into()],
                        doi: Some(format!("10.1/{}", t.to_lowercase())),
                        ..ObservedItem::default()
                    })
                    .collect(),
            )),
            Some(Scripted::NoData) => Ok(TrendSnapshot::NoData("no data for this day".into())),
            Some(Scripted::Fail) | None => Err(anyhow!("connection refused")),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

struct JournalLookup;

#[async_trait]
impl MetadataSource for JournalLookup {
    async fn lookup(&self, _doi: &str) -> Result<Option<Metadata>> {
        Ok(Some(Metadata {
            journal: Some("Journal of Lookups".into()),
            ..Metadata::default()
        }))
    }

    fn name(&self) -> &'static str {
        "lookup"
    }
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 14).unwrap()
}

fn config(dir: &std::path::Path, feeds: Vec<FeedSpec>) -> AppConfig {
    AppConfig {
        output_dir: dir.to_path_buf(),
        pause_between_feeds_ms: 0,
        feeds,
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn publishes_then_rerun_flags_nothing_new() {
    let tmp = tempfile::tempdir().unwrap();
    let cs = FeedSpec::new("Computer Science", None);
    let rh = FeedSpec::new("Clinical Medicine", Some("Rheumatology"));
    let cfg = config(tmp.path(), vec![cs.clone(), rh.clone()]);

    let src = ScriptedSource::default();
    src.set(&cs, Scripted::Items(vec!["Alpha", "Beta"]));
    src.set(&rh, Scripted::Items(vec!["Gamma"]));

    let runner = FeedRunner::new(&cfg, &src);
    let report = runner.run(day()).await;
    assert_eq!(report.published(), 2);
    assert_eq!(report.failed(), 0);
    match &report.feeds[0].outcome {
        FeedOutcome::Published {
            path,
            new_items,
            total_items,
        } => {
            assert_eq!(path, &tmp.path().join("computer_science.xml"));
            assert_eq!((*new_items, *total_items), (2, 2));
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let xml = std::fs::read_to_string(tmp.path().join("computer_science.xml")).unwrap();
    assert_eq!(xml.matches("🆕 NEW").count(), 2);
    assert!(tmp
        .path()
        .join(".history")
        .join("clinical_medicine_rheumatology_history.json")
        .exists());

    let report = runner.run(day()).await;
    match &report.feeds[0].outcome {
        FeedOutcome::Published { new_items, .. } => assert_eq!(*new_items, 0),
        other => panic!("unexpected outcome {other:?}"),
    }
    let xml = std::fs::read_to_string(tmp.path().join("computer_science.xml")).unwrap();
    assert!(!xml.contains("🆕"));
    assert_eq!(xml.matches("<item>").count(), 2);
}

#[tokio::test]
async fn failed_feed_keeps_previous_files() {
    let tmp = tempfile::tempdir().unwrap();
    let cs = FeedSpec::new("Computer Science", None);
    let ss = FeedSpec::new("Social Sciences", None);
    let cfg = config(tmp.path(), vec![cs.clone(), ss.clone()]);

    let src = ScriptedSource::default();
    src.set(&cs, Scripted::Items(vec!["Alpha"]));
    src.set(&ss, Scripted::Items(vec!["Delta"]));
    let runner = FeedRunner::new(&cfg, &src);
    runner.run(day()).await;

    let store = HistoryStore::in_output_dir(tmp.path());
    let xml_before = std::fs::read(tmp.path().join("computer_science.xml")).unwrap();
    let hist_before = std::fs::read(store.path_for("computer_science")).unwrap();

    src.set(&cs, Scripted::Fail);
    src.set(&ss, Scripted::NoData);
    let report = runner.run(day()).await;
    assert_eq!(report.failed(), 2);

    match &report.feeds[0].outcome {
        FeedOutcome::Failed { error, previous } => {
            assert!(error.contains("connection refused"));
            assert_eq!(previous.as_deref(), Some(tmp.path().join("computer_science.xml").as_path()));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(matches!(
        &report.feeds[1].outcome,
        FeedOutcome::Failed { error, .. } if error.contains("no data")
    ));

    assert_eq!(std::fs::read(tmp.path().join("computer_science.xml")).unwrap(), xml_before);
    assert_eq!(std::fs::read(store.path_for("computer_science")).unwrap(), hist_before);
    assert_eq!(store.load("social_sciences").len(), 1);
}

#[tokio::test]
async fn failure_on_first_run_has_no_previous_file() {
    let tmp = tempfile::tempdir().unwrap();
    let cs = FeedSpec::new("Computer Science", None);
    let cfg = config(tmp.path(), vec![cs.clone()]);
    let src = ScriptedSource::default();
    src.set(&cs, Scripted::Fail);

    let report = FeedRunner::new(&cfg, &src).run(day()).await;
    assert!(matches!(
        &report.feeds[0].outcome,
        FeedOutcome::Failed { previous: None, .. }
    ));
    assert!(!report.feeds[0].has_feed_file());
    assert!(!tmp.path().join("computer_science.xml").exists());
}

#[tokio::test]
async fn corrupt_history_starts_over() {
    let tmp = tempfile::tempdir().unwrap();
    let cs = FeedSpec::new("Computer Science", None);
    let cfg = config(tmp.path(), vec![cs.clone()]);
    let store = HistoryStore::in_output_dir(tmp.path());
    std::fs::create_dir_all(store.dir()).unwrap();
    std::fs::write(store.path_for("computer_science"), b"{ not json").unwrap();

    let src = ScriptedSource::default();
    src.set(&cs, Scripted::Items(vec!["Alpha", "Beta"]));
    let report = FeedRunner::new(&cfg, &src).run(day()).await;
    match &report.feeds[0].outcome {
        FeedOutcome::Published { new_items, .. } => assert_eq!(*new_items, 2),
        other => panic!("unexpected outcome {other:?}"),
    }
    let rec = store.load("computer_science");
    assert_eq!(rec.len(), 2);
    assert!(rec.is_consistent());
    assert!(rec.last_updated.is_some());
}

#[tokio::test]
async fn enrichment_fills_missing_journal() {
    let tmp = tempfile::tempdir().unwrap();
    let cs = FeedSpec::new("Computer Science", None);
    let cfg = config(tmp.path(), vec![cs.clone()]);
    let src = ScriptedSource::default();
    src.set(&cs, Scripted::Items(vec!["Alpha"]));

    FeedRunner::new(&cfg, &src)
        .with_metadata(&JournalLookup)
        .run(day())
        .await;
    let xml = std::fs::read_to_string(tmp.path().join("computer_science.xml")).unwrap();
    assert!(xml.contains("Journal: Journal of Lookups"));
}

#[tokio::test]
async fn index_lists_feeds_and_failures() {
    let tmp = tempfile::tempdir().unwrap();
    let cs = FeedSpec::new("Computer Science", None);
    let bio = FeedSpec::new("Biology & Biochemistry", None);
    let mut cfg = config(tmp.path(), vec![cs.clone(), bio.clone()]);
    cfg.public_base_url = "https://feeds.example.org/ooir/".into();

    let src = ScriptedSource::default();
    src.set(&cs, Scripted::Items(vec!["Alpha"]));
    src.set(&bio, Scripted::Fail);
    let report = FeedRunner::new(&cfg, &src).run(day()).await;

    let path = write_index(&cfg, &report).unwrap();
    assert_eq!(path, tmp.path().join("index.html"));
    let html = std::fs::read_to_string(path).unwrap();
    assert!(html.contains(r#"<a href="computer_science.xml" class="feed-link">Computer Science</a>"#));
    assert!(html.contains("Biology &amp; Biochemistry"));
    assert!(html.contains(r#"class="feed-item error""#));
    assert!(html.contains("<code>https://feeds.example.org/ooir/computer_science.xml</code>"));
    assert!(!html.contains("biology_and_biochemistry.xml</code>"));
}
