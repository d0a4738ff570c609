//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Job record persistence (status, progress, final counts)
//! - Per-page result persistence and paginated retrieval

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{JobStore, ResultStore, StorageError, StorageResult};

use crate::job::CrawlResult;
use serde::Serialize;

/// Largest page size served by `ResultStore::page_by_job`
pub const MAX_PAGE_SIZE: u32 = 100;

/// Which result fields to load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Every field, including the raw HTML
    Full,
    /// Everything except the raw HTML
    Summary,
}

/// Page metadata for a paginated listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u64,
}

impl Pagination {
    /// Normalizes the requested page/limit and computes the page count
    pub fn new(total: u64, page: u32, limit: u32) -> Self {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        Self {
            total,
            page,
            limit,
            pages: total.div_ceil(u64::from(limit)),
        }
    }

    /// Number of rows to skip before this page
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

/// One page of a job's results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultPage {
    pub results: Vec<CrawlResult>,
    pub pagination: Pagination,
}
