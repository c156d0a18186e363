// src/sources/mod.rs
pub mod crossref;
pub mod ooir;
pub mod types;

use metrics::counter;

use crate::item::{normalize_text, ObservedItem, NOT_AVAILABLE};
use crate::sources::types::{Metadata, MetadataSource};

/// Fill empty fields of `item` from `meta`. Populated fields are never
/// overwritten, so enrichment cannot move an already-keyed paper.
pub fn enrich(item: &mut ObservedItem, meta: Metadata) {
    if item.title.is_empty() {
        if let Some(t) = meta.title {
            item.title = normalize_text(&t);
        }
    }
    if item.authors.is_empty() {
        item.authors = meta.authors;
    }
    if item.journal.is_none() {
        item.journal = meta.journal;
    }
    if item.abstract_text.is_none() {
        item.abstract_text = meta.abstract_text.map(|a| normalize_text(&a));
    }
    if item.published == NOT_AVAILABLE {
        if let Some(p) = meta.published {
            item.published = p;
        }
    }
    if item.url.is_none() {
        item.url = meta.url;
    }
}

/// Enrich every item that carries a DOI. Lookup failures are logged and
/// skipped; they never block the merge. Returns how many items were enriched.
pub async fn enrich_all(items: &mut [ObservedItem], source: &dyn MetadataSource) -> usize {
    let mut enriched = 0usize;
    for item in items.iter_mut() {
        let Some(doi) = item.doi.clone() else {
            continue;
        };
        match source.lookup(&doi).await {
            Ok(Some(meta)) => {
                enrich(item, meta);
                enriched += 1;
            }
            Ok(None) => {
                tracing::debug!(%doi, provider = source.name(), "no metadata for doi");
            }
            Err(e) => {
                tracing::warn!(%doi, provider = source.name(), error = %format!("{e:#}"), "metadata lookup failed");
                counter!("metadata_lookup_errors_total").increment(1);
            }
        }
    }
    enriched
}
