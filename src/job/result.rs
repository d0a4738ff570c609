//! Per-page crawl results

use crate::fetcher::PageContent;
use crate::job::JobId;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What happened when a page was attempted
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PageOutcome {
    Success(PageContent),
    Failure { error: String },
}

/// One attempted URL of a job
///
/// Created right after the attempt finishes and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlResult {
    pub job_id: JobId,
    pub url: String,
    /// Depth at which the URL was discovered (0 for the seed)
    pub depth: u32,
    /// Page the URL was found on (None for the seed)
    pub parent_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub outcome: PageOutcome,
}

impl CrawlResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PageOutcome::Success(_))
    }

    /// The page content, if the attempt succeeded
    pub fn content(&self) -> Option<&PageContent> {
        match &self.outcome {
            PageOutcome::Success(content) => Some(content),
            PageOutcome::Failure { .. } => None,
        }
    }

    /// The error message, if the attempt failed
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            PageOutcome::Success(_) => None,
            PageOutcome::Failure { error } => Some(error),
        }
    }
}
