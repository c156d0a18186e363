// src/render/index.rs
//! HTML overview page linking every configured feed.

use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use std::fmt::Write as _;

use crate::runner::{FeedOutcome, FeedReport};

const STYLE: &str = r#"        body { font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; }
        h1 { color: #333; }
        .feed-list { list-style-type: none; padding: 0; }
        .feed-item { background: #f5f5f5; margin: 10px 0; padding: 15px; border-radius: 5px; border-left: 4px solid #007cba; }
        .feed-link { text-decoration: none; color: #007cba; font-weight: bold; }
        .feed-link:hover { text-decoration: underline; }
        .timestamp { color: #666; font-size: 0.9em; }
        .error { border-left-color: #dc3545; }
        .error small { color: #dc3545; }"#;

pub fn render_index(reports: &[FeedReport], public_base_url: &str, now: DateTime<Utc>) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>OOIR Trend Monitoring - RSS Feeds</title>
    <style>
{STYLE}
    </style>
</head>
<body>
    <h1>OOIR Trend Monitoring - RSS Feeds</h1>
    <p>Automatically generated RSS feeds for trending papers per field and category.</p>
    <p class="timestamp">Last updated: {} UTC</p>

    <ul class="feed-list">
"#,
        now.format("%d.%m.%Y %H:%M:%S")
    );

    for r in reports {
        let name = r.feed.display_name();
        let file = format!("{}.xml", r.identifier);
        match &r.outcome {
            FeedOutcome::Published {
                new_items,
                total_items,
                ..
            } => {
                let _ = write!(
                    html,
                    r#"        <li class="feed-item">
            <a href="{}" class="feed-link">{}</a>
            <br><small>{} papers, {} new</small>
        </li>
"#,
                    attr(&file),
                    text(&name),
                    total_items,
                    new_items
                );
            }
            FeedOutcome::Failed { error, previous } => {
                let head = match previous {
                    Some(_) => format!(
                        r#"<a href="{}" class="feed-link">{}</a>"#,
                        attr(&file),
                        text(&name)
                    ),
                    None => format!(r#"<span class="feed-link">{}</span>"#, text(&name)),
                };
                let note = if previous.is_some() {
                    " (showing previous version)"
                } else {
                    ""
                };
                let _ = write!(
                    html,
                    r#"        <li class="feed-item error">
            {head}
            <br><small>Not refreshed{}: {}</small>
        </li>
"#,
                    note,
                    text(error)
                );
            }
        }
    }

    html.push_str(
        r#"    </ul>

    <h2>Usage</h2>
    <p>Copy a feed URL into your RSS reader:</p>
    <ul>
"#,
    );
    let base = public_base_url.trim_end_matches('/');
    for r in reports.iter().filter(|r| r.has_feed_file()) {
        let _ = writeln!(
            html,
            "        <li><code>{}/{}.xml</code></li>",
            text(base),
            text(&r.identifier)
        );
    }
    html.push_str("    </ul>\n</body>\n</html>\n");
    html
}
