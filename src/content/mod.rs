//! Full-text enrichment of saved articles.
//!
//! [`ContentEnricher`] asks a scrape API for the main content of an
//! article's page and swaps it in when the stored body is short or missing.
//! Every failure degrades to "keep the original"; the [`Enrichment`] value
//! records which path was taken.

mod clean;
mod enricher;

pub use clean::{clean_content, TRUNCATION_MARKER};
pub use enricher::{
    ContentEnricher, ContentError, Enrichment, EnrichmentSettings, SkipReason, API_KEY_ENV,
    DEFAULT_BASE_URL,
};
