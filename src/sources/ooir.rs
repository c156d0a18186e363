// src/sources/ooir.rs
//! OOIR `paper-trends` API.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use metrics::counter;
use serde_json::Value;
use std::time::Duration;

use crate::config::FeedSpec;
use crate::item::ObservedItem;
use crate::sources::types::{TrendSnapshot, TrendSource};

pub struct OoirTrendSource {
    mode: Mode,
}

enum Mode {
    Http {
        client: reqwest::Client,
        base_url: String,
        email: String,
    },
    /// Captured response body, replayed for every feed.
    Fixture(String),
}

impl OoirTrendSource {
    pub fn http(base_url: &str, email: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ooir-trend-feeds/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building ooir http client")?;
        Ok(Self {
            mode: Mode::Http {
                client,
                base_url: base_url.to_string(),
                email: email.to_string(),
            },
        })
    }

    pub fn from_fixture_str(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
        }
    }
}

/// Interpret a response body. Accepts `{"papers": [...]}` or a bare array;
/// `{"error": ...}` or an object without papers is `NoData`. A body that is
/// not JSON at all is an error.
pub fn parse_trend_body(body: &str) -> Result<TrendSnapshot> {
    let trimmed = body.trim();
    let v: Value = serde_json::from_str(trimmed).with_context(|| {
        let head: String = trimmed.chars().take(200).collect();
        format!("trend response is not JSON: {head}")
    })?;

    let papers = match v {
        Value::Array(arr) => arr,
        Value::Object(mut obj) => {
            if let Some(err) = obj.get("error") {
                let msg = err
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string());
                return Ok(TrendSnapshot::NoData(msg));
            }
            match obj.remove("papers") {
                Some(Value::Array(arr)) => arr,
                Some(Value::Null) | None => {
                    return Ok(TrendSnapshot::NoData("response has no papers".into()))
                }
                Some(other) => bail!("`papers` is not a list: {other}"),
            }
        }
        Value::Null => return Ok(TrendSnapshot::NoData("null response".into())),
        other => bail!("unexpected trend response: {other}"),
    };

    let mut items = Vec::with_capacity(papers.len());
    for p in papers {
        match p {
            Value::Object(obj) => items.push(ObservedItem::from_json_object(&obj)),
            other => tracing::debug!(entry = %other, "skipping non-object paper entry"),
        }
    }
    counter!("trend_items_total").increment(items.len() as u64);
    Ok(TrendSnapshot::Items(items))
}

/// Tag items with the feed's field/category when upstream left them blank.
fn tag_with_feed(snapshot: TrendSnapshot, feed: &FeedSpec) -> TrendSnapshot {
    match snapshot {
        TrendSnapshot::Items(mut items) => {
            for it in items.iter_mut() {
                if it.field.is_none() {
                    it.field = Some(feed.field.clone());
                }
                if it.category.is_none() {
                    it.category = feed.category.clone();
                }
            }
            TrendSnapshot::Items(items)
        }
        other => other,
    }
}

#[async_trait]
impl TrendSource for OoirTrendSource {
    async fn fetch(&self, feed: &FeedSpec, day: NaiveDate) -> Result<TrendSnapshot> {
        match &self.mode {
            Mode::Fixture(body) => parse_trend_body(body).map(|s| tag_with_feed(s, feed)),
            Mode::Http {
                client,
                base_url,
                email,
            } => {
                let day_s = day.format("%Y-%m-%d").to_string();
                let mut params: Vec<(&str, &str)> = vec![
                    ("email", email.as_str()),
                    ("type", "paper-trends"),
                    ("day", day_s.as_str()),
                    ("field", feed.field.as_str()),
                ];
                if let Some(cat) = feed.category.as_deref() {
                    params.push(("category", cat));
                }

                tracing::info!(target: "runner", feed = %feed.display_name(), day = %day_s, "fetching trends");
                let resp = client
                    .get(base_url.as_str())
                    .query(&params)
                    .send()
                    .await
                    .with_context(|| format!("ooir request for {}", feed.identifier()))?;
                let resp = resp
                    .error_for_status()
                    .with_context(|| format!("ooir status for {}", feed.identifier()))?;
                let body = resp.text().await.context("reading ooir body")?;
                parse_trend_body(&body).map(|s| tag_with_feed(s, feed))
            }
        }
    }

    fn name(&self) -> &'static str {
        "OOIR"
    }
}
