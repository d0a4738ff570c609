//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the crawl-engine database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Crawl jobs and their progress
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    seed_url TEXT NOT NULL,
    max_depth INTEGER NOT NULL,
    max_pages INTEGER NOT NULL,
    options TEXT NOT NULL,
    status TEXT NOT NULL,
    pages_processed INTEGER NOT NULL DEFAULT 0,
    pages_successful INTEGER NOT NULL DEFAULT 0,
    pages_failed INTEGER NOT NULL DEFAULT 0,
    result_count INTEGER,
    error_message TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    finished_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_created ON jobs(created_at);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

-- One row per attempted page, in attempt order
CREATE TABLE IF NOT EXISTS crawl_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL REFERENCES jobs(id),
    url TEXT NOT NULL,
    depth INTEGER NOT NULL,
    parent_url TEXT,
    succeeded INTEGER NOT NULL,
    title TEXT,
    text_content TEXT,
    html TEXT,
    metadata TEXT,
    links TEXT,
    data TEXT,
    status_code INTEGER,
    content_type TEXT,
    headers TEXT,
    error_message TEXT,
    fetched_at TEXT NOT NULL,
    duration_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_results_job ON crawl_results(job_id, id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
