// src/config/feeds.rs
//! Monitored (field, category) pairs and the identifiers derived from them.

use serde::{Deserialize, Serialize};

/// One monitored feed. `category = None` means all categories of the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSpec {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl FeedSpec {
    pub fn new(field: &str, category: Option<&str>) -> Self {
        Self {
            field: field.to_string(),
            category: category
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        }
    }

    /// Human-readable name, e.g. `Clinical Medicine (Rheumatology)`.
    pub fn display_name(&self) -> String {
        match &self.category {
            Some(c) => format!("{} ({})", self.field, c),
            None => self.field.clone(),
        }
    }

    /// Key for history and output files.
    pub fn identifier(&self) -> String {
        match &self.category {
            Some(c) => normalize_identifier(&format!("{}_{}", self.field, c)),
            None => normalize_identifier(&self.field),
        }
    }
}

/// Lowercase, `&` → `and`, whitespace → `_`, everything outside
/// `[a-z0-9_-]` dropped, runs of `_` collapsed.
pub fn normalize_identifier(raw: &str) -> String {
    let lowered = raw.replace('&', "and").to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    for ch in lowered.chars() {
        let mapped = if ch.is_whitespace() { '_' } else { ch };
        if !(mapped.is_ascii_lowercase() || mapped.is_ascii_digit() || mapped == '_' || mapped == '-') {
            continue;
        }
        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.push(mapped);
    }
    out.trim_matches('_').to_string()
}

/// The feeds monitored when no configuration names any.
pub fn default_feeds() -> Vec<FeedSpec> {
    let mut feeds: Vec<FeedSpec> = [
        "Biology & Biochemistry",
        "Clinical Medicine",
        "Computer Science",
        "Economics & Business",
        "Multidisciplinary",
        "Philosophy & Religion",
        "Psychiatry and Psychology",
        "Social Sciences",
    ]
    .iter()
    .map(|f| FeedSpec::new(f, None))
    .collect();

    for cat in [
        "Integrative & Complementary Medicine",
        "Endocrinology & Metabolism",
        "Medical Informatics",
        "Medicine, General & Internal",
        "Medicine, Research & Experimental",
        "Nutrition & Dietetics",
        "Orthopedics",
        "Pharmacology & Pharmacy",
        "Rehabilitation",
        "Rheumatology",
        "Sport Sciences",
    ] {
        feeds.push(FeedSpec::new("Clinical Medicine", Some(cat)));
    }
    feeds
}
