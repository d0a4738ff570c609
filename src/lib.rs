//! crawl-engine: bounded breadth-first crawl jobs
//!
//! This crate runs crawl jobs: starting from a seed URL it walks a site
//! breadth-first up to a depth and page limit, recording one result per
//! attempted page, with cooperative cancellation and progress tracking.

pub mod config;
pub mod engine;
pub mod fetcher;
pub mod job;
pub mod storage;

use thiserror::Error;

/// Main error type for crawl-engine operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job {job_id} is {status}, expected pending")]
    InvalidState {
        job_id: job::JobId,
        status: job::JobStatus,
    },

    #[error("Job {job_id} has already been started")]
    AlreadyStarted { job_id: job::JobId },

    #[error("Job not found: {0}")]
    NotFound(job::JobId),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: job::JobStatus,
        to: job::JobStatus,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetcher error: {0}")]
    Fetch(#[from] fetcher::FetchError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for crawl-engine operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use engine::{CrawlEngine, CrawlSupervisor, EngineSettings};
pub use job::{CrawlJob, CrawlResult, JobId, JobStatus};
