// src/render/rss.rs
//! RSS 2.0 document for one feed's display list.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::collections::BTreeSet;

use super::rss_date;
use crate::fingerprint::Fingerprint;
use crate::item::{RetainedItem, NOT_AVAILABLE};

pub const NEW_MARKER: &str = "🆕";
const SITE_LINK: &str = "https://ooir.org";
const MAX_AUTHORS_SHOWN: usize = 3;

/// Everything the renderer needs for one feed.
#[derive(Debug, Clone, Copy)]
pub struct FeedDocument<'a> {
    pub identifier: &'a str,
    pub display_name: &'a str,
    pub items: &'a [RetainedItem],
    /// Papers to flag as new in this run.
    pub new_fingerprints: &'a BTreeSet<Fingerprint>,
}

/// Permanent per-feed id of an entry.
pub fn item_guid(identifier: &str, fp: &Fingerprint) -> String {
    format!("ooir-{identifier}-{fp}")
}

pub fn render_rss(doc: &FeedDocument<'_>, now: DateTime<Utc>) -> Result<String> {
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    w.write_event(Event::Start(
        BytesStart::new("rss").with_attributes([("version", "2.0")]),
    ))?;
    w.write_event(Event::Start(BytesStart::new("channel")))?;

    let built = rss_date(now);
    text_element(&mut w, "title", &format!("OOIR Trends: {}", doc.display_name))?;
    text_element(
        &mut w,
        "description",
        &format!(
            "Trending papers in {} from OOIR (new and recently added papers only)",
            doc.display_name
        ),
    )?;
    text_element(&mut w, "link", SITE_LINK)?;
    text_element(&mut w, "language", "en-us")?;
    text_element(&mut w, "pubDate", &built)?;
    text_element(&mut w, "lastBuildDate", &built)?;

    for it in doc.items {
        let is_new = doc.new_fingerprints.contains(&it.fingerprint);
        write_item(&mut w, doc.identifier, it, is_new, now)?;
    }

    w.write_event(Event::End(BytesEnd::new("channel")))?;
    w.write_event(Event::End(BytesEnd::new("rss")))?;

    let mut out = String::from_utf8(w.into_inner()).context("rss output is not utf-8")?;
    out.push('\n');
    Ok(out)
}

fn write_item(
    w: &mut Writer<Vec<u8>>,
    identifier: &str,
    it: &RetainedItem,
    is_new: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let paper = &it.item;
    let title = if paper.title.is_empty() {
        NOT_AVAILABLE
    } else {
        paper.title.as_str()
    };
    let title = if is_new {
        format!("{NEW_MARKER} {title}")
    } else {
        title.to_string()
    };

    w.write_event(Event::Start(BytesStart::new("item")))?;
    text_element(w, "title", &title)?;
    text_element(w, "description", &describe(it, is_new))?;
    text_element(w, "link", paper.url.as_deref().unwrap_or(SITE_LINK))?;
    w.write_event(Event::Start(
        BytesStart::new("guid").with_attributes([("isPermaLink", "false")]),
    ))?;
    w.write_event(Event::Text(BytesText::new(&item_guid(identifier, &it.fingerprint))))?;
    w.write_event(Event::End(BytesEnd::new("guid")))?;
    text_element(w, "pubDate", &rss_date(it.first_seen.unwrap_or(now)))?;
    w.write_event(Event::End(BytesEnd::new("item")))?;
    Ok(())
}

fn describe(it: &RetainedItem, is_new: bool) -> String {
    let paper = &it.item;
    let mut authors = if paper.authors.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        paper
            .authors
            .iter()
            .take(MAX_AUTHORS_SHOWN)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };
    if paper.authors.len() > MAX_AUTHORS_SHOWN {
        authors.push_str("...");
    }

    let mut desc = format!(
        "Authors: {authors} | Citations: {} | Altmetric Score: {}",
        paper.citations, paper.altmetric_score
    );
    if let Some(j) = &paper.journal {
        desc.push_str(&format!(" | Journal: {j}"));
    }
    if is_new {
        desc.push_str(&format!(" | {NEW_MARKER} NEW"));
    } else if let Some(ts) = it.first_seen {
        desc.push_str(&format!(" | Added: {}", ts.format("%d.%m.%Y")));
    } else {
        desc.push_str(" | Added: date unknown");
    }
    desc
}

fn text_element(w: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint_title_authors;
    use crate::item::ObservedItem;
    use chrono::TimeZone;

    fn retained(title: &str, authors: &[&str], first_seen: Option<DateTime<Utc>>) -> RetainedItem {
        RetainedItem {
            fingerprint: fingerprint_title_authors(title, authors),
            first_seen,
            currently_trending: true,
            item: ObservedItem {
                title: title.into(),
                authors: authors.iter().map(|a| a.to_string()).collect(),
                citations: 4,
                altmetric_score: 12.5,
                ..ObservedItem::default()
            },
        }
    }

    #[test]
    fn renders_items_in_order_with_markers() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2025, 6, 10, 8, 0, 0).unwrap();
        let fresh = retained("Cats & <dogs>", &["A", "B", "C", "D"], Some(now));
        let old = retained("Older paper", &["Z"], Some(earlier));
        let items = vec![fresh.clone(), old.clone()];
        let new_fps = BTreeSet::from([fresh.fingerprint.clone()]);
        let doc = FeedDocument {
            identifier: "computer_science",
            display_name: "Computer Science",
            items: &items,
            new_fingerprints: &new_fps,
        };

        let xml = render_rss(&doc, now).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<title>OOIR Trends: Computer Science</title>"));
        assert!(xml.contains("<title>🆕 Cats &amp; &lt;dogs&gt;</title>"));
        assert!(xml.contains("Authors: A, B, C... | Citations: 4 | Altmetric Score: 12.5 | 🆕 NEW"));
        assert!(xml.contains("Added: 10.06.2025"));
        assert!(xml.contains(&format!(
            "<guid isPermaLink=\"false\">ooir-computer_science-{}</guid>",
            old.fingerprint
        )));
        assert!(xml.contains("<pubDate>Tue, 10 Jun 2025 08:00:00 GMT</pubDate>"));
        let first = xml.find("Cats").unwrap();
        let second = xml.find("Older paper").unwrap();
        assert!(first < second);
        assert_eq!(xml.matches("<item>").count(), 2);
    }

    #[test]
    fn empty_title_uses_placeholder() {
        let now = Utc::now();
        let items = vec![retained("", &[], None)];
        let none = BTreeSet::new();
        let doc = FeedDocument {
            identifier: "x",
            display_name: "X",
            items: &items,
            new_fingerprints: &none,
        };
        let xml = render_rss(&doc, now).unwrap();
        assert!(xml.contains("<title>N/A</title>"));
        assert!(xml.contains("Authors: N/A"));
        assert!(xml.contains("Added: date unknown"));
    }
}
