//! Storage traits and error types
//!
//! This module defines the job and result store interfaces the engine is
//! written against, and the associated error type.

use crate::job::{CrawlJob, CrawlResult, JobId, JobStatus};
use crate::storage::{Projection, ResultPage};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable job records
///
/// Implementations must be safe to share between concurrently running jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Gets a job by ID
    async fn get_job(&self, job_id: &JobId) -> StorageResult<Option<CrawlJob>>;

    /// Inserts the job, or overwrites the stored record with the same ID
    async fn save_job(&self, job: &CrawlJob) -> StorageResult<()>;

    /// Most recently created jobs first, optionally only those in `status`
    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: u32,
    ) -> StorageResult<Vec<CrawlJob>>;
}

/// Durable per-page results
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Appends a result; results of a job are kept in insertion order
    async fn save_result(&self, result: &CrawlResult) -> StorageResult<()>;

    /// Counts the results stored for a job
    async fn count_by_job(&self, job_id: &JobId) -> StorageResult<u64>;

    /// Gets one page of a job's results
    ///
    /// # Arguments
    ///
    /// * `page` - 1-based page number; 0 is treated as 1
    /// * `page_size` - clamped to `1..=MAX_PAGE_SIZE`
    /// * `projection` - which fields to load
    async fn page_by_job(
        &self,
        job_id: &JobId,
        page: u32,
        page_size: u32,
        projection: Projection,
    ) -> StorageResult<ResultPage>;
}
