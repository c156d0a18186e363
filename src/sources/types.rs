// src/sources/types.rs
use anyhow::Result;
use chrono::NaiveDate;

use crate::config::FeedSpec;
use crate::item::ObservedItem;

/// What the trend API returned for one (field, category, day).
#[derive(Debug, Clone, PartialEq)]
pub enum TrendSnapshot {
    /// Possibly empty, in API order.
    Items(Vec<ObservedItem>),
    /// The API answered but explicitly had nothing usable (error payload etc.).
    NoData(String),
}

#[async_trait::async_trait]
pub trait TrendSource: Send + Sync {
    async fn fetch(&self, feed: &FeedSpec, day: NaiveDate) -> Result<TrendSnapshot>;
    fn name(&self) -> &'static str;
}

/// Fields a metadata service may know about a DOI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub journal: Option<String>,
    pub abstract_text: Option<String>,
    pub published: Option<String>,
    pub url: Option<String>,
}

#[async_trait::async_trait]
pub trait MetadataSource: Send + Sync {
    /// `Ok(None)` when the service does not know the DOI.
    async fn lookup(&self, doi: &str) -> Result<Option<Metadata>>;
    fn name(&self) -> &'static str;
}
