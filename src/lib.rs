//! Saved-article store and full-text enrichment pipeline.
//!
//! - [`storage`]: SQLite table of saved articles keyed by URL, with schema
//!   versioning and a lazily opened [`storage::StoreHandle`]
//! - [`content`]: scrape-API client that swaps short bodies for full text
//! - [`notify`]: fixed-channel notification emitter
//! - [`config`]: optional TOML configuration

pub mod config;
pub mod content;
pub mod notify;
pub mod storage;
pub mod util;
