//! Page fetching for crawl jobs
//!
//! The engine only sees the [`PageFetcher`] and [`FetcherLauncher`] traits.
//! A launcher creates one fetcher per job run; the fetcher turns a URL into
//! [`PageContent`] or a [`FetchError`], and is closed when the run ends.
//!
//! [`HttpLauncher`] is the bundled implementation (reqwest + scraper).

mod http;
mod page;
mod parser;

pub use http::{build_http_client, HttpFetcher, HttpLauncher};
pub use page::{PageContent, PageLink};
pub use parser::{compile_selectors, parse_page, CompiledSelector, ParsedPage};

use crate::job::CrawlOptions;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while launching a fetcher or fetching a page
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Request timeout after {secs}s for {url}")]
    Timeout { url: String, secs: u64 },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Unsupported content type '{content_type}' for {url}")]
    UnsupportedContentType { url: String, content_type: String },

    #[error("Request failed for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Invalid selector for field '{name}': {message}")]
    InvalidSelector { name: String, message: String },

    #[error("Invalid request header '{name}': {message}")]
    InvalidHeader { name: String, message: String },

    #[error("Fetcher has been closed")]
    Closed,

    #[error("Failed to launch fetcher: {0}")]
    Launch(String),
}

/// Fetches and parses pages for a single job run
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url` and extracts its content
    ///
    /// Implementations must classify each link as internal or external
    /// relative to the fetched page's origin, and must fail (rather than
    /// return partial content) on a non-2xx status or a non-HTML body.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<PageContent, FetchError>;

    /// Releases the underlying resource
    ///
    /// Idempotent. Fetches started afterwards fail with `FetchError::Closed`.
    async fn close(&self);
}

/// Creates the fetcher resource for a job run
#[async_trait]
pub trait FetcherLauncher: Send + Sync {
    async fn launch(&self, options: &CrawlOptions) -> Result<Arc<dyn PageFetcher>, FetchError>;
}
