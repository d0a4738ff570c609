//! Shared fixtures for the integration tests
//!
//! `FakeSite` scripts what each URL returns so engine behavior can be
//! checked without a network. Gated URLs block mid-fetch until the test
//! releases them.

#![allow(dead_code)]

use async_trait::async_trait;
use crawl_engine::engine::{CrawlContext, EngineSettings};
use crawl_engine::fetcher::{FetchError, FetcherLauncher, PageContent, PageFetcher, PageLink};
use crawl_engine::job::{CrawlJob, CrawlOptions, JobId};
use crawl_engine::storage::{JobStore, SqliteStore, StorageError, StorageResult};
use crawl_engine::JobStatus;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Blocks a fetch until released
#[derive(Default)]
pub struct Gate {
    pub reached: Notify,
    pub release: Notify,
}

/// Scripted responses keyed by URL
#[derive(Default)]
pub struct FakeSite {
    responses: Mutex<HashMap<String, Result<PageContent, FetchError>>>,
    gates: Mutex<HashMap<String, Arc<Gate>>>,
    hung: Mutex<Vec<String>>,
    fetched: Mutex<Vec<String>>,
    launch_error: Mutex<Option<FetchError>>,
    launches: AtomicUsize,
    closes: AtomicUsize,
}

impl FakeSite {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serves an HTML page with the given `(url, is_internal)` links
    pub fn page(&self, url: &str, links: &[(&str, bool)]) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(html_page(links)));
    }

    pub fn error(&self, url: &str, error: FetchError) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(error));
    }

    /// Makes fetches of `url` wait on the returned gate
    pub fn gate(&self, url: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates
            .lock()
            .unwrap()
            .insert(url.to_string(), Arc::clone(&gate));
        gate
    }

    /// Makes fetches of `url` never return
    pub fn hang(&self, url: &str) {
        self.hung.lock().unwrap().push(url.to_string());
    }

    pub fn fail_launch(&self, error: FetchError) {
        *self.launch_error.lock().unwrap() = Some(error);
    }

    /// URLs in the order they were fetched
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn launcher(self: &Arc<Self>) -> Arc<dyn FetcherLauncher> {
        Arc::new(FakeLauncher {
            site: Arc::clone(self),
        })
    }
}

pub fn html_page(links: &[(&str, bool)]) -> PageContent {
    PageContent {
        title: Some("Test page".to_string()),
        text: "Hello".to_string(),
        html: Some("<html><body>Hello</body></html>".to_string()),
        metadata: BTreeMap::new(),
        links: links
            .iter()
            .map(|(url, is_internal)| PageLink {
                url: url.to_string(),
                text: String::new(),
                is_internal: *is_internal,
            })
            .collect(),
        data: BTreeMap::new(),
        status_code: 200,
        content_type: "text/html; charset=utf-8".to_string(),
        headers: BTreeMap::new(),
    }
}

struct FakeLauncher {
    site: Arc<FakeSite>,
}

#[async_trait]
impl FetcherLauncher for FakeLauncher {
    async fn launch(&self, _options: &CrawlOptions) -> Result<Arc<dyn PageFetcher>, FetchError> {
        self.site.launches.fetch_add(1, Ordering::SeqCst);
        let launch_error = self.site.launch_error.lock().unwrap().clone();
        if let Some(error) = launch_error {
            return Err(error);
        }
        Ok(Arc::new(FakeFetcher {
            site: Arc::clone(&self.site),
            closed: AtomicBool::new(false),
        }))
    }
}

struct FakeFetcher {
    site: Arc<FakeSite>,
    closed: AtomicBool,
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<PageContent, FetchError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FetchError::Closed);
        }
        self.site.fetched.lock().unwrap().push(url.to_string());

        let gate = self.site.gates.lock().unwrap().get(url).cloned();
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }

        let hung = self.site.hung.lock().unwrap().iter().any(|u| u == url);
        if hung {
            std::future::pending::<()>().await;
        }

        let response = self.site.responses.lock().unwrap().get(url).cloned();
        response.unwrap_or_else(|| {
            Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })
        })
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.site.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Job store that rejects progress writes but accepts every other save
///
/// Progress writes are the saves of a running job that has processed at
/// least one page.
pub struct ProgressRejectingStore {
    pub inner: Arc<SqliteStore>,
    pub rejected: AtomicUsize,
}

#[async_trait]
impl JobStore for ProgressRejectingStore {
    async fn get_job(&self, job_id: &JobId) -> StorageResult<Option<CrawlJob>> {
        self.inner.get_job(job_id).await
    }

    async fn save_job(&self, job: &CrawlJob) -> StorageResult<()> {
        if job.status == JobStatus::Running && job.progress.pages_processed > 0 {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::Database("disk full".to_string()));
        }
        self.inner.save_job(job).await
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: u32,
    ) -> StorageResult<Vec<CrawlJob>> {
        self.inner.list_jobs(status, limit).await
    }
}

/// Job store that rejects every terminal save
pub struct TerminalRejectingStore {
    pub inner: Arc<SqliteStore>,
}

#[async_trait]
impl JobStore for TerminalRejectingStore {
    async fn get_job(&self, job_id: &JobId) -> StorageResult<Option<CrawlJob>> {
        self.inner.get_job(job_id).await
    }

    async fn save_job(&self, job: &CrawlJob) -> StorageResult<()> {
        if job.status.is_terminal() {
            return Err(StorageError::Database("database is locked".to_string()));
        }
        self.inner.save_job(job).await
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: u32,
    ) -> StorageResult<Vec<CrawlJob>> {
        self.inner.list_jobs(status, limit).await
    }
}

pub fn settings() -> EngineSettings {
    EngineSettings {
        page_timeout: Duration::from_secs(5),
    }
}

pub fn context(store: &Arc<SqliteStore>, site: &Arc<FakeSite>) -> CrawlContext {
    CrawlContext::new(Arc::clone(store), site.launcher(), settings())
}

pub fn memory_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::new_in_memory().unwrap())
}

/// Polls the store until the job reaches a terminal status
pub async fn wait_for_terminal(store: &SqliteStore, job_id: &JobId) -> CrawlJob {
    for _ in 0..500 {
        if let Some(job) = store.get_job(job_id).await.unwrap() {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish in time", job_id);
}
