//! Crawl job records
//!
//! A `CrawlJob` is one crawl request (seed URL plus bounds) together with the
//! status and progress counters its engine maintains while running.

use crate::job::JobStatus;
use crate::CrawlError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Opaque job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generates a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extraction rule applied to every fetched page
///
/// Results land in the page's `data` map under the rule's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelector {
    /// CSS selector
    pub selector: String,

    /// Attribute to read instead of the element text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    /// Collect every match instead of the first one
    #[serde(default)]
    pub multiple: bool,
}

/// Selector and request options passed through to the fetcher untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlOptions {
    #[serde(default)]
    pub selectors: BTreeMap<String, FieldSelector>,

    /// Extra request headers sent with every fetch
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Page counters maintained by the engine while a job runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobProgress {
    pub pages_processed: u32,
    pub pages_successful: u32,
    pub pages_failed: u32,
}

/// A crawl job record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlJob {
    pub id: JobId,
    pub seed_url: String,
    /// 0 means seed page only
    pub max_depth: u32,
    pub max_pages: u32,
    pub options: CrawlOptions,
    pub status: JobStatus,
    pub progress: JobProgress,
    /// Number of stored results; set when the job becomes terminal
    pub result_count: Option<u64>,
    /// Set only when the job failed
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CrawlJob {
    /// Creates a new pending job with a generated ID
    ///
    /// # Errors
    ///
    /// * `CrawlError::UrlParse` - the seed is not an absolute URL
    /// * `CrawlError::InvalidJob` - non-HTTP(S) seed or a zero page limit
    pub fn new(
        seed_url: &str,
        max_depth: u32,
        max_pages: u32,
        options: CrawlOptions,
    ) -> Result<Self, CrawlError> {
        let seed = Url::parse(seed_url)?;
        if seed.scheme() != "http" && seed.scheme() != "https" {
            return Err(CrawlError::InvalidJob(format!(
                "seed URL '{}' must use http or https",
                seed_url
            )));
        }

        if max_pages < 1 {
            return Err(CrawlError::InvalidJob(
                "max_pages must be >= 1".to_string(),
            ));
        }

        Ok(Self {
            id: JobId::generate(),
            seed_url: seed.to_string(),
            max_depth,
            max_pages,
            options,
            status: JobStatus::Pending,
            progress: JobProgress::default(),
            result_count: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        })
    }

    /// Moves the job to `next`, rejecting illegal transitions
    pub fn transition(&mut self, next: JobStatus) -> Result<(), CrawlError> {
        if !self.status.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        match next {
            JobStatus::Running => self.started_at = Some(now),
            s if s.is_terminal() => self.finished_at = Some(now),
            _ => {}
        }
        self.status = next;
        Ok(())
    }

    /// Marks the job failed with a human-readable message
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), CrawlError> {
        self.transition(JobStatus::Failed)?;
        self.error_message = Some(message.into());
        Ok(())
    }
}
