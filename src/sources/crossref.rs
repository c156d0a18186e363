// src/sources/crossref.rs
//! Crossref `works/{doi}` lookup used for optional enrichment.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::sources::types::{Metadata, MetadataSource};

#[derive(Debug, Deserialize)]
struct Envelope {
    message: Work,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Work {
    title: Vec<String>,
    author: Vec<Author>,
    #[serde(rename = "container-title")]
    container_title: Vec<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    published: Option<DateParts>,
    #[serde(rename = "published-print")]
    published_print: Option<DateParts>,
    #[serde(rename = "URL")]
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Author {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DateParts {
    #[serde(rename = "date-parts")]
    date_parts: Vec<Vec<Option<i64>>>,
}

impl DateParts {
    /// `YYYY`, `YYYY-MM` or `YYYY-MM-DD`, whatever precision Crossref has.
    fn render(&self) -> Option<String> {
        let parts: Vec<i64> = self
            .date_parts
            .first()?
            .iter()
            .map_while(|p| *p)
            .collect();
        match parts.as_slice() {
            [y] => Some(format!("{y:04}")),
            [y, m] => Some(format!("{y:04}-{m:02}")),
            [y, m, d, ..] => Some(format!("{y:04}-{m:02}-{d:02}")),
            [] => None,
        }
    }
}

impl From<Work> for Metadata {
    fn from(w: Work) -> Self {
        let authors = w
            .author
            .into_iter()
            .filter_map(|a| {
                if let Some(n) = a.name {
                    return Some(n);
                }
                let joined = format!(
                    "{} {}",
                    a.given.unwrap_or_default(),
                    a.family.unwrap_or_default()
                );
                let joined = joined.trim();
                (!joined.is_empty()).then(|| joined.to_string())
            })
            .collect();
        let published = w
            .published
            .as_ref()
            .and_then(DateParts::render)
            .or_else(|| w.published_print.as_ref().and_then(DateParts::render));
        Metadata {
            title: w.title.into_iter().next(),
            authors,
            journal: w.container_title.into_iter().next(),
            abstract_text: w.abstract_text,
            published,
            url: w.url,
        }
    }
}

/// Parse a `works/{doi}` response body.
pub fn parse_work_body(body: &str) -> Result<Metadata> {
    let env: Envelope = serde_json::from_str(body).context("parsing crossref work")?;
    Ok(env.message.into())
}

/// `<base_url>/<doi>` with the DOI as one percent-encoded path segment.
/// DOIs may contain `/`, `#`, `?` or `<`, none of which may split the path.
pub fn work_url(base_url: &str, doi: &str) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(base_url)
        .with_context(|| format!("invalid crossref base url {base_url}"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("crossref base url cannot take a path: {base_url}"))?
        .pop_if_empty()
        .push(doi.trim());
    Ok(url)
}

pub struct CrossrefMetadataSource {
    client: reqwest::Client,
    base_url: String,
}

impl CrossrefMetadataSource {
    pub fn new(base_url: &str, contact_email: &str, timeout: Duration) -> Result<Self> {
        // Crossref routes requests with a mailto to its polite pool.
        let ua = if contact_email.is_empty() {
            concat!("ooir-trend-feeds/", env!("CARGO_PKG_VERSION")).to_string()
        } else {
            format!(
                "ooir-trend-feeds/{} (mailto:{contact_email})",
                env!("CARGO_PKG_VERSION")
            )
        };
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(ua)
            .build()
            .context("building crossref http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MetadataSource for CrossrefMetadataSource {
    async fn lookup(&self, doi: &str) -> Result<Option<Metadata>> {
        let url = work_url(&self.base_url, doi)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("crossref request for {doi}"))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp
            .error_for_status()
            .with_context(|| format!("crossref status for {doi}"))?;
        let body = resp.text().await.context("reading crossref body")?;
        parse_work_body(&body).map(Some)
    }

    fn name(&self) -> &'static str {
        "Crossref"
    }
}
