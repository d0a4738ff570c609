use crate::engine::EngineSettings;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for crawl-engine
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Depth used when a job does not specify one
    #[serde(rename = "default-max-depth", default = "default_max_depth")]
    pub default_max_depth: u32,

    /// Page limit used when a job does not specify one
    #[serde(rename = "default-max-pages", default = "default_max_pages")]
    pub default_max_pages: u32,

    /// Per-page fetch timeout (seconds)
    #[serde(rename = "page-timeout", default = "default_page_timeout")]
    pub page_timeout: u64,
}

fn default_max_depth() -> u32 {
    2
}

fn default_max_pages() -> u32 {
    100
}

fn default_page_timeout() -> u64 {
    30
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Config {
    /// Builds the engine settings derived from this configuration
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            page_timeout: Duration::from_secs(self.crawler.page_timeout),
        }
    }
}
