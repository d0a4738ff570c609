//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of both `JobStore`
//! and `ResultStore`.

use crate::fetcher::PageContent;
use crate::job::{CrawlJob, CrawlResult, JobId, JobProgress, JobStatus, PageOutcome};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{JobStore, ResultStore, StorageError, StorageResult};
use crate::storage::{Pagination, Projection, ResultPage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

const JOB_COLUMNS: &str = "id, seed_url, max_depth, max_pages, options, status, \
     pages_processed, pages_successful, pages_failed, result_count, error_message, \
     created_at, started_at, finished_at";

/// SQLite storage backend
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for tests and throwaway runs)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn get_job(&self, job_id: &JobId) -> StorageResult<Option<CrawlJob>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                params![job_id.as_str()],
                JobRow::from_row,
            )
            .optional()?;

        row.map(JobRow::into_job).transpose()
    }

    async fn save_job(&self, job: &CrawlJob) -> StorageResult<()> {
        let options = serde_json::to_string(&job.options)?;
        let result_count = job.result_count.map(to_sql_int).transpose()?;

        self.conn().execute(
            &format!(
                "INSERT INTO jobs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    pages_processed = excluded.pages_processed,
                    pages_successful = excluded.pages_successful,
                    pages_failed = excluded.pages_failed,
                    result_count = excluded.result_count,
                    error_message = excluded.error_message,
                    started_at = excluded.started_at,
                    finished_at = excluded.finished_at",
                JOB_COLUMNS
            ),
            params![
                job.id.as_str(),
                job.seed_url,
                job.max_depth,
                job.max_pages,
                options,
                job.status.to_db_string(),
                job.progress.pages_processed,
                job.progress.pages_successful,
                job.progress.pages_failed,
                result_count,
                job.error_message,
                job.created_at.to_rfc3339(),
                job.started_at.map(|t| t.to_rfc3339()),
                job.finished_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: u32,
    ) -> StorageResult<Vec<CrawlJob>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM jobs
             WHERE ?1 IS NULL OR status = ?1
             ORDER BY created_at DESC LIMIT ?2",
            JOB_COLUMNS
        ))?;

        let status = status.as_ref().map(JobStatus::to_db_string);
        let rows = stmt
            .query_map(params![status, limit], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(JobRow::into_job).collect()
    }
}

#[async_trait]
impl ResultStore for SqliteStore {
    async fn save_result(&self, result: &CrawlResult) -> StorageResult<()> {
        let base = (
            result.job_id.as_str(),
            result.url.as_str(),
            result.depth,
            result.parent_url.as_deref(),
            result.fetched_at.to_rfc3339(),
            to_sql_int(result.duration_ms)?,
        );

        match &result.outcome {
            PageOutcome::Success(content) => {
                self.conn().execute(
                    "INSERT INTO crawl_results (job_id, url, depth, parent_url, fetched_at, duration_ms,
                        succeeded, title, text_content, html, metadata, links, data,
                        status_code, content_type, headers)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    params![
                        base.0,
                        base.1,
                        base.2,
                        base.3,
                        base.4,
                        base.5,
                        content.title,
                        content.text,
                        content.html,
                        serde_json::to_string(&content.metadata)?,
                        serde_json::to_string(&content.links)?,
                        serde_json::to_string(&content.data)?,
                        content.status_code,
                        content.content_type,
                        serde_json::to_string(&content.headers)?,
                    ],
                )?;
            }
            PageOutcome::Failure { error } => {
                self.conn().execute(
                    "INSERT INTO crawl_results (job_id, url, depth, parent_url, fetched_at, duration_ms,
                        succeeded, error_message)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                    params![base.0, base.1, base.2, base.3, base.4, base.5, error],
                )?;
            }
        }

        Ok(())
    }

    async fn count_by_job(&self, job_id: &JobId) -> StorageResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM crawl_results WHERE job_id = ?1",
            params![job_id.as_str()],
            |row| row.get(0),
        )?;
        from_sql_int(count)
    }

    async fn page_by_job(
        &self,
        job_id: &JobId,
        page: u32,
        page_size: u32,
        projection: Projection,
    ) -> StorageResult<ResultPage> {
        let conn = self.conn();

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM crawl_results WHERE job_id = ?1",
            params![job_id.as_str()],
            |row| row.get(0),
        )?;
        let pagination = Pagination::new(from_sql_int(total)?, page, page_size);

        let html_column = match projection {
            Projection::Full => "html",
            Projection::Summary => "NULL AS html",
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT job_id, url, depth, parent_url, fetched_at, duration_ms, succeeded,
                title, text_content, {}, metadata, links, data, status_code, content_type,
                headers, error_message
             FROM crawl_results WHERE job_id = ?1
             ORDER BY id ASC LIMIT ?2 OFFSET ?3",
            html_column
        ))?;

        let rows = stmt
            .query_map(
                params![
                    job_id.as_str(),
                    pagination.limit,
                    to_sql_int(pagination.offset())?
                ],
                ResultRow::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let results = rows
            .into_iter()
            .map(ResultRow::into_result)
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(ResultPage {
            results,
            pagination,
        })
    }
}

/// Raw `jobs` row, decoded into a `CrawlJob` outside the rusqlite callback
struct JobRow {
    id: String,
    seed_url: String,
    max_depth: u32,
    max_pages: u32,
    options: String,
    status: String,
    pages_processed: u32,
    pages_successful: u32,
    pages_failed: u32,
    result_count: Option<i64>,
    error_message: Option<String>,
    created_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            seed_url: row.get(1)?,
            max_depth: row.get(2)?,
            max_pages: row.get(3)?,
            options: row.get(4)?,
            status: row.get(5)?,
            pages_processed: row.get(6)?,
            pages_successful: row.get(7)?,
            pages_failed: row.get(8)?,
            result_count: row.get(9)?,
            error_message: row.get(10)?,
            created_at: row.get(11)?,
            started_at: row.get(12)?,
            finished_at: row.get(13)?,
        })
    }

    fn into_job(self) -> StorageResult<CrawlJob> {
        let status = JobStatus::from_db_string(&self.status).ok_or_else(|| {
            StorageError::Serialization(format!("Unknown job status '{}'", self.status))
        })?;

        Ok(CrawlJob {
            id: JobId::from(self.id),
            seed_url: self.seed_url,
            max_depth: self.max_depth,
            max_pages: self.max_pages,
            options: serde_json::from_str(&self.options)?,
            status,
            progress: JobProgress {
                pages_processed: self.pages_processed,
                pages_successful: self.pages_successful,
                pages_failed: self.pages_failed,
            },
            result_count: self.result_count.map(from_sql_int).transpose()?,
            error_message: self.error_message,
            created_at: parse_timestamp(&self.created_at)?,
            started_at: self.started_at.as_deref().map(parse_timestamp).transpose()?,
            finished_at: self.finished_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

/// Raw `crawl_results` row
struct ResultRow {
    job_id: String,
    url: String,
    depth: u32,
    parent_url: Option<String>,
    fetched_at: String,
    duration_ms: i64,
    succeeded: bool,
    title: Option<String>,
    text_content: Option<String>,
    html: Option<String>,
    metadata: Option<String>,
    links: Option<String>,
    data: Option<String>,
    status_code: Option<u16>,
    content_type: Option<String>,
    headers: Option<String>,
    error_message: Option<String>,
}

impl ResultRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            job_id: row.get(0)?,
            url: row.get(1)?,
            depth: row.get(2)?,
            parent_url: row.get(3)?,
            fetched_at: row.get(4)?,
            duration_ms: row.get(5)?,
            succeeded: row.get(6)?,
            title: row.get(7)?,
            text_content: row.get(8)?,
            html: row.get(9)?,
            metadata: row.get(10)?,
            links: row.get(11)?,
            data: row.get(12)?,
            status_code: row.get(13)?,
            content_type: row.get(14)?,
            headers: row.get(15)?,
            error_message: row.get(16)?,
        })
    }

    fn into_result(self) -> StorageResult<CrawlResult> {
        let outcome = if self.succeeded {
            PageOutcome::Success(PageContent {
                title: self.title,
                text: self.text_content.unwrap_or_default(),
                html: self.html,
                metadata: decode_json(self.metadata)?,
                links: decode_json(self.links)?,
                data: decode_json(self.data)?,
                status_code: self.status_code.unwrap_or_default(),
                content_type: self.content_type.unwrap_or_default(),
                headers: decode_json(self.headers)?,
            })
        } else {
            PageOutcome::Failure {
                error: self.error_message.unwrap_or_default(),
            }
        };

        Ok(CrawlResult {
            job_id: JobId::from(self.job_id),
            url: self.url,
            depth: self.depth,
            parent_url: self.parent_url,
            fetched_at: parse_timestamp(&self.fetched_at)?,
            duration_ms: from_sql_int(self.duration_ms)?,
            outcome,
        })
    }
}

/// Decodes an optional JSON column, treating NULL as the type's default
fn decode_json<T>(raw: Option<String>) -> StorageResult<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match raw {
        Some(s) => Ok(serde_json::from_str(&s)?),
        None => Ok(T::default()),
    }
}

fn parse_timestamp(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("Invalid timestamp '{}': {}", s, e)))
}

fn to_sql_int(value: u64) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::Database(format!("Value {} does not fit in INTEGER", value)))
}

fn from_sql_int(value: i64) -> StorageResult<u64> {
    u64::try_from(value)
        .map_err(|_| StorageError::Database(format!("Unexpected negative value {}", value)))
}
