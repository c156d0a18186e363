// src/item.rs
//! Paper records: the ephemeral `ObservedItem` built from one trend snapshot,
//! and the persisted `RetainedItem` carrying provenance.
//!
//! All optional upstream fields are resolved here, once, so the merge engine
//! only ever sees fully-defaulted records.

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::fingerprint::Fingerprint;

/// Placeholder for missing textual fields.
pub const NOT_AVAILABLE: &str = "N/A";

/// One paper from a trend snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservedItem {
    /// Normalized title; empty when upstream had none.
    pub title: String,
    pub authors: Vec<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
    pub citations: u64,
    pub altmetric_score: f64,
    /// Publication date as delivered upstream, or "N/A".
    pub published: String,
    pub journal: Option<String>,
    pub abstract_text: Option<String>,
    pub field: Option<String>,
    pub category: Option<String>,
    /// Upstream keys we do not model, kept verbatim.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl Default for ObservedItem {
    fn default() -> Self {
        Self {
            title: String::new(),
            authors: Vec::new(),
            doi: None,
            url: None,
            citations: 0,
            altmetric_score: 0.0,
            published: NOT_AVAILABLE.to_string(),
            journal: None,
            abstract_text: None,
            field: None,
            category: None,
            extra: BTreeMap::new(),
        }
    }
}

impl ObservedItem {
    /// Build a fully-defaulted item from one upstream JSON object.
    /// Unknown keys land in `extra`; nothing here fails.
    pub fn from_json_object(obj: &Map<String, Value>) -> Self {
        let mut rest = obj.clone();
        let mut take = |keys: &[&str]| -> Option<Value> {
            keys.iter()
                .find_map(|k| rest.remove(*k).filter(|v| !v.is_null()))
        };

        let title = take(&["title"])
            .and_then(|v| value_to_string(&v))
            .map(|s| normalize_text(&s))
            .unwrap_or_default();
        let authors = take(&["authors", "author"])
            .map(|v| parse_authors(&v))
            .unwrap_or_default();
        let doi = take(&["doi", "DOI"]).and_then(|v| non_empty(value_to_string(&v)));
        let url = take(&["url", "link"]).and_then(|v| non_empty(value_to_string(&v)));
        let citations = take(&["citations", "cited_by"])
            .and_then(|v| value_to_f64(&v))
            .map(|f| if f.is_finite() && f > 0.0 { f as u64 } else { 0 })
            .unwrap_or(0);
        let altmetric_score = take(&["altmetric_score", "altmetric", "score"])
            .and_then(|v| value_to_f64(&v))
            .filter(|f| f.is_finite())
            .unwrap_or(0.0);
        let published = take(&["published", "pubdate", "publication_date", "date"])
            .and_then(|v| non_empty(value_to_string(&v)))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        let journal = take(&["journal", "source"])
            .and_then(|v| non_empty(value_to_string(&v)))
            .map(|s| normalize_text(&s));
        let abstract_text = take(&["abstract"])
            .and_then(|v| non_empty(value_to_string(&v)))
            .map(|s| normalize_text(&s));
        let field = take(&["field"]).and_then(|v| non_empty(value_to_string(&v)));
        let category = take(&["category"]).and_then(|v| non_empty(value_to_string(&v)));

        Self {
            title,
            authors,
            doi,
            url,
            citations,
            altmetric_score,
            published,
            journal,
            abstract_text,
            field,
            category,
            extra: rest.into_iter().collect(),
        }
    }
}

/// A paper kept in a feed's history, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetainedItem {
    pub fingerprint: Fingerprint,
    /// Set once when the paper is first observed. `None` means the stored
    /// value was missing or unreadable.
    #[serde(default, deserialize_with = "de_lenient_timestamp")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub currently_trending: bool,
    pub item: ObservedItem,
}

/// Accepts RFC 3339, naive ISO-8601 (taken as UTC) or unix seconds.
/// Anything else becomes `None` instead of failing the whole record.
pub(crate) fn de_lenient_timestamp<'de, D>(d: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(parse_timestamp_value))
}

pub(crate) fn parse_timestamp_value(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|n| n.and_utc())
}

/// Normalize text: decode entities, strip tags, unify quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML/JATS tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z][^>]*>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

fn parse_authors(v: &Value) -> Vec<String> {
    match v {
        Value::Array(arr) => arr
            .iter()
            .filter_map(author_name)
            .map(|s| normalize_text(&s))
            .filter(|s| !s.is_empty())
            .collect(),
        other => author_name(other)
            .map(|s| normalize_text(&s))
            .filter(|s| !s.is_empty())
            .into_iter()
            .collect(),
    }
}

fn author_name(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Object(o) => {
            if let Some(name) = o.get("name").and_then(Value::as_str) {
                return Some(name.to_string());
            }
            let given = o.get("given").and_then(Value::as_str).unwrap_or_default();
            let family = o.get("family").and_then(Value::as_str).unwrap_or_default();
            let joined = format!("{given} {family}");
            let joined = joined.trim();
            (!joined.is_empty()).then(|| joined.to_string())
        }
        _ => None,
    }
}

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(a) => a.first().and_then(value_to_string),
        _ => None,
    }
}

fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn missing_fields_get_placeholders() {
        let it = ObservedItem::from_json_object(&obj(json!({})));
        assert_eq!(it.title, "");
        assert!(it.authors.is_empty());
        assert_eq!(it.published, NOT_AVAILABLE);
        assert_eq!(it.citations, 0);
        assert!(it.doi.is_none());
    }

    #[test]
    fn lenient_field_shapes() {
        let it = ObservedItem::from_json_object(&obj(json!({
            "title": "  Gut&nbsp;microbiome   <i>in vivo</i> ",
            "authors": "Single Author",
            "citations": "42",
            "altmetric": 17.5,
            "doi": " 10.1/xyz ",
            "rank": 3
        })));
        assert_eq!(it.title, "Gut microbiome in vivo");
        assert_eq!(it.authors, vec!["Single Author".to_string()]);
        assert_eq!(it.citations, 42);
        assert!((it.altmetric_score - 17.5).abs() < 1e-9);
        assert_eq!(it.doi.as_deref(), Some("10.1/xyz"));
        assert_eq!(it.extra.get("rank"), Some(&json!(3)));
    }

    #[test]
    fn structured_authors_are_joined() {
        let it = ObservedItem::from_json_object(&obj(json!({
            "authors": [{"given": "Ada", "family": "Lovelace"}, {"name": "C. Babbage"}, 7, ""]
        })));
        assert_eq!(it.authors, vec!["Ada Lovelace", "C. Babbage"]);
    }

    #[test]
    fn lenient_first_seen() {
        let fp = "0123456789abcdef";
        let ok: RetainedItem = serde_json::from_value(json!({
            "fingerprint": fp,
            "first_seen": "2025-03-01T10:00:00.123456",
            "item": {"title": "A"}
        }))
        .unwrap();
        assert_eq!(
            ok.first_seen.unwrap().to_rfc3339(),
            "2025-03-01T10:00:00.123456+00:00"
        );

        let bad: RetainedItem = serde_json::from_value(json!({
            "fingerprint": fp,
            "first_seen": "last tuesday",
            "item": {}
        }))
        .unwrap();
        assert!(bad.first_seen.is_none());
        assert_eq!(bad.item.published, NOT_AVAILABLE);

        let missing: RetainedItem = serde_json::from_value(json!({
            "fingerprint": fp,
            "item": {}
        }))
        .unwrap();
        assert!(missing.first_seen.is_none());
        assert!(!missing.currently_trending);
    }
}
