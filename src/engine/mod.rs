//! Crawl engine module
//!
//! This module contains the crawl orchestration logic:
//! - The breadth-first frontier (queue plus visited set)
//! - `CrawlEngine`, which runs a single job from pending to a terminal state
//! - `CrawlSupervisor`, which tracks running engines by job ID

mod crawl_engine;
mod frontier;
mod supervisor;

pub use crawl_engine::CrawlEngine;
pub use frontier::{Frontier, QueuedUrl};
pub use supervisor::CrawlSupervisor;

use crate::fetcher::FetcherLauncher;
use crate::storage::{JobStore, ResultStore};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on a single page fetch when no configuration is loaded
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime knobs shared by every engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Time allowed for one page fetch, including body download and parsing
    pub page_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            page_timeout: DEFAULT_PAGE_TIMEOUT,
        }
    }
}

/// Collaborators an engine needs to run a job
#[derive(Clone)]
pub struct CrawlContext {
    pub job_store: Arc<dyn JobStore>,
    pub result_store: Arc<dyn ResultStore>,
    pub launcher: Arc<dyn FetcherLauncher>,
    pub settings: EngineSettings,
}

impl CrawlContext {
    /// Builds a context where one backend serves both jobs and results
    pub fn new<S>(store: Arc<S>, launcher: Arc<dyn FetcherLauncher>, settings: EngineSettings) -> Self
    where
        S: JobStore + ResultStore + 'static,
    {
        Self {
            job_store: store.clone(),
            result_store: store,
            launcher,
            settings,
        }
    }
}
