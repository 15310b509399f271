use crate::storage::Article;
use crate::util::{validate_url, UrlValidationError};
use futures::future::join_all;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::clean::clean_content;

/// Environment variable holding the scrape API key
pub const API_KEY_ENV: &str = "FIRECRAWL_API_KEY";

pub const DEFAULT_BASE_URL: &str = "https://api.firecrawl.dev/v1";

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

// ============================================================================
// Errors and Outcomes
// ============================================================================

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Scrape response contained no content")]
    EmptyContent,
    #[error("Malformed scrape response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Invalid article URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
}

/// Why an article came back from enrichment untouched
#[derive(Debug)]
pub enum SkipReason {
    /// No API key; no request was made
    NotConfigured,
    /// The article already had a full body; no request was made
    ContentSufficient,
    /// A request was attempted and failed
    Failed(ContentError),
}

/// Result of enriching one article.
///
/// Enrichment never fails from the caller's point of view: either variant
/// yields a usable article through [`Enrichment::into_article`].
#[derive(Debug)]
pub enum Enrichment {
    Enriched(Article),
    Unchanged { article: Article, reason: SkipReason },
}

impl Enrichment {
    fn unchanged(article: &Article, reason: SkipReason) -> Self {
        Enrichment::Unchanged {
            article: article.clone(),
            reason,
        }
    }

    pub fn article(&self) -> &Article {
        match self {
            Enrichment::Enriched(article) | Enrichment::Unchanged { article, .. } => article,
        }
    }

    pub fn into_article(self) -> Article {
        match self {
            Enrichment::Enriched(article) | Enrichment::Unchanged { article, .. } => article,
        }
    }

    pub fn is_enriched(&self) -> bool {
        matches!(self, Enrichment::Enriched(_))
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            Enrichment::Enriched(_) => None,
            Enrichment::Unchanged { reason, .. } => Some(reason),
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Tunables for [`ContentEnricher`]
#[derive(Debug, Clone)]
pub struct EnrichmentSettings {
    /// API root; `/scrape` is appended
    pub base_url: String,
    /// Requests issued concurrently per batch (0 is treated as 1)
    pub batch_size: usize,
    /// Pause between consecutive batches
    pub batch_delay: Duration,
    /// Deadline for one scrape request, including reading the body
    pub request_timeout: Duration,
    /// Articles whose body is longer than this many chars are left alone
    pub min_content_len: usize,
    /// Cleaned content is truncated beyond this many chars
    pub max_content_len: usize,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            batch_size: 3,
            batch_delay: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
            min_content_len: 500,
            max_content_len: 25_000,
        }
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'static str; 1],
    #[serde(rename = "onlyMainContent")]
    only_main_content: bool,
    #[serde(rename = "removeBase64Images")]
    remove_base64_images: bool,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    success: Option<bool>,
    data: Option<ScrapeData>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    markdown: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

/// Replaces short article bodies with full text from a scrape API.
pub struct ContentEnricher {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    settings: EnrichmentSettings,
}

impl ContentEnricher {
    /// Build an enricher. A blank `api_key` counts as absent.
    pub fn new(
        client: reqwest::Client,
        api_key: Option<String>,
        settings: EnrichmentSettings,
    ) -> Self {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);
        Self {
            client,
            api_key,
            settings,
        }
    }

    /// Whether an API key is present. Informational only: `extract_one`
    /// performs its own check.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn settings(&self) -> &EnrichmentSettings {
        &self.settings
    }

    /// Enrich a single article.
    ///
    /// No request is made when no key is configured or when the article's
    /// body is already longer than `min_content_len` characters. Every
    /// failure leaves the article unchanged.
    pub async fn extract_one(&self, article: &Article) -> Enrichment {
        let Some(key) = &self.api_key else {
            return Enrichment::unchanged(article, SkipReason::NotConfigured);
        };

        if article.content_len() > self.settings.min_content_len {
            tracing::trace!(url = %article.url, "Article already has full content");
            return Enrichment::unchanged(article, SkipReason::ContentSufficient);
        }

        let timeout = self.settings.request_timeout;
        let scraped = match tokio::time::timeout(timeout, self.scrape(key, &article.url)).await {
            Ok(result) => result,
            Err(_) => Err(ContentError::Timeout(timeout)),
        };

        match scraped {
            Ok(content) => {
                tracing::debug!(
                    url = %article.url,
                    chars = content.chars().count(),
                    "Enriched article content"
                );
                Enrichment::Enriched(article.with_content(content))
            }
            Err(e) => {
                tracing::warn!(url = %article.url, error = %e, "Content extraction failed, keeping original");
                Enrichment::unchanged(article, SkipReason::Failed(e))
            }
        }
    }

    /// Enrich articles in batches of `settings.batch_size`.
    pub async fn extract_batch(&self, articles: &[Article]) -> Vec<Enrichment> {
        self.extract_batch_with_size(articles, self.settings.batch_size)
            .await
    }

    /// Enrich articles in consecutive chunks of `batch_size`.
    ///
    /// Requests within a chunk run concurrently and all complete before the
    /// next chunk starts; `batch_delay` separates chunks (none after the
    /// last). Results are in input order.
    pub async fn extract_batch_with_size(
        &self,
        articles: &[Article],
        batch_size: usize,
    ) -> Vec<Enrichment> {
        let batch_size = batch_size.max(1);
        let mut results = Vec::with_capacity(articles.len());

        for (index, chunk) in articles.chunks(batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settings.batch_delay).await;
            }

            let enriched = join_all(chunk.iter().map(|article| self.extract_one(article))).await;
            tracing::debug!(
                batch = index,
                size = chunk.len(),
                enriched = enriched.iter().filter(|e| e.is_enriched()).count(),
                "Finished enrichment batch"
            );
            results.extend(enriched);
        }

        results
    }

    async fn scrape(&self, key: &SecretString, article_url: &str) -> Result<String, ContentError> {
        // The service gets the URL exactly as saved, not its normalized form
        validate_url(article_url)?;
        let endpoint = self.scrape_endpoint()?;

        let body = ScrapeRequest {
            url: article_url,
            formats: ["markdown"],
            only_main_content: true,
            remove_base64_images: true,
        };

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ContentError::HttpStatus(status.as_u16()));
        }

        let text = read_limited_text(response, MAX_RESPONSE_SIZE).await?;
        let parsed: ScrapeResponse = serde_json::from_str(&text)?;
        if parsed.success == Some(false) {
            tracing::debug!(url = %article_url, "Scrape API reported success=false");
        }

        let markdown = parsed
            .data
            .and_then(|data| data.markdown)
            .filter(|markdown| !markdown.trim().is_empty())
            .ok_or(ContentError::EmptyContent)?;

        let cleaned = clean_content(&markdown, self.settings.max_content_len);
        if cleaned.is_empty() {
            return Err(ContentError::EmptyContent);
        }
        Ok(cleaned)
    }

    /// `{base_url}/scrape`, refusing plain HTTP except for local test servers
    /// so the bearer token never crosses the network unencrypted.
    fn scrape_endpoint(&self) -> Result<String, ContentError> {
        let base = self.settings.base_url.trim_end_matches('/');
        if !base.starts_with("https://") {
            let is_localhost =
                base.starts_with("http://127.0.0.1") || base.starts_with("http://localhost");
            if !is_localhost {
                tracing::error!(base_url = %base, "Rejecting non-HTTPS scrape API base URL");
                return Err(ContentError::InsecureBaseUrl);
            }
        }
        Ok(format!("{base}/scrape"))
    }
}

async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, ContentError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| ContentError::InvalidUtf8)
}
