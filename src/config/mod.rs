// src/config/mod.rs
pub mod app;
pub mod feeds;

pub use app::AppConfig;
pub use feeds::FeedSpec;
