//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests with a per-page timeout
//! - Status and Content-Type checks
//! - Error classification

use crate::config::UserAgentConfig;
use crate::fetcher::parser::{compile_selectors, parse_page, CompiledSelector};
use crate::fetcher::{FetchError, FetcherLauncher, PageContent, PageFetcher};
use crate::job::CrawlOptions;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{redirect::Policy, Client};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Maximum redirect hops followed per request
const MAX_REDIRECTS: usize = 10;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The User-Agent header value
/// * `headers` - Extra headers sent with every request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(user_agent: &str, headers: HeaderMap) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Launches one [`HttpFetcher`] per job run
#[derive(Debug, Clone)]
pub struct HttpLauncher {
    user_agent: String,
}

impl HttpLauncher {
    /// Creates a launcher identifying itself as `Name/Version (+ContactURL; ContactEmail)`
    pub fn new(config: &UserAgentConfig) -> Self {
        Self {
            user_agent: config.header_value(),
        }
    }
}

#[async_trait]
impl FetcherLauncher for HttpLauncher {
    async fn launch(&self, options: &CrawlOptions) -> Result<Arc<dyn PageFetcher>, FetchError> {
        let selectors = compile_selectors(&options.selectors)?;
        let headers = build_header_map(&options.headers)?;
        let client = build_http_client(&self.user_agent, headers)
            .map_err(|e| FetchError::Launch(e.to_string()))?;

        tracing::debug!(
            "Launched HTTP fetcher with {} field selectors",
            selectors.len()
        );

        Ok(Arc::new(HttpFetcher {
            client: RwLock::new(Some(client)),
            selectors,
        }))
    }
}

fn build_header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, FetchError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let invalid = |message: String| FetchError::InvalidHeader {
            name: name.clone(),
            message,
        };
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

/// Fetches pages over HTTP and parses them with scraper
pub struct HttpFetcher {
    /// `None` once closed
    client: RwLock<Option<Client>>,
    selectors: Vec<CompiledSelector>,
}

impl HttpFetcher {
    fn client(&self) -> Result<Client, FetchError> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(FetchError::Closed)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    /// Fetches a URL with full error classification
    ///
    /// | Condition | Result |
    /// |-----------|--------|
    /// | Non-2xx status | `HttpStatus` |
    /// | Content-Type not `text/html` | `UnsupportedContentType` |
    /// | Timeout | `Timeout` |
    /// | Connection or body error | `Network` |
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<PageContent, FetchError> {
        let client = self.client()?;

        let response = client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_error(url, e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !is_html(&content_type) {
            return Err(FetchError::UnsupportedContentType {
                url: url.to_string(),
                content_type,
            });
        }

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let Ok(value) = value.to_str() else {
                continue;
            };
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        // Links are classified against the page actually served, after redirects
        let final_url = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| classify_error(url, e, timeout))?;

        let parsed = parse_page(&html, &final_url, &self.selectors);

        Ok(PageContent {
            title: parsed.title,
            text: parsed.text,
            html: Some(html),
            metadata: parsed.metadata,
            links: parsed.links,
            data: parsed.data,
            status_code: status.as_u16(),
            content_type,
            headers,
        })
    }

    async fn close(&self) {
        let client = self
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if client.is_some() {
            tracing::debug!("HTTP fetcher closed");
        }
    }
}

/// Media types are case-insensitive, so `Text/HTML` counts
fn is_html(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("text/html")
}

fn classify_error(url: &str, error: reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            secs: timeout.as_secs(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
