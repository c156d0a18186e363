// src/render/mod.rs
pub mod index;
pub mod rss;

use chrono::{DateTime, Utc};

pub use index::render_index;
pub use rss::{render_rss, FeedDocument};

/// RFC 822 style date as used by RSS 2.0, always in GMT.
pub fn rss_date(ts: DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
