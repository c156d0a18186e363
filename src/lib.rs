// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod config;
pub mod fingerprint;
pub mod history;
pub mod item;
pub mod manage;
pub mod merge;
pub mod persist;
pub mod render;
pub mod runner;
pub mod sources;

// ---- Re-exports for stable public API ----
pub use crate::config::{AppConfig, FeedSpec};
pub use crate::fingerprint::{fingerprint, Fingerprint, FingerprintMode};
pub use crate::history::{HistoryRecord, HistoryStore};
pub use crate::item::{ObservedItem, RetainedItem};
pub use crate::merge::{merge, MergeOutcome, MergeParams};
pub use crate::runner::{FeedOutcome, FeedReport, FeedRunner, RunReport};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
/// `RUST_LOG` picks the filter (default `info`); `OOIR_LOG_FORMAT=json`
/// switches to JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("OOIR_LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    // A subscriber may already be set (tests, embedding); keep it.
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}
