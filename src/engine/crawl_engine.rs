//! Single-job crawl engine
//!
//! A `CrawlEngine` owns one job for the duration of one run. `start` drives
//! the job through pending -> running -> {completed, failed, cancelled} and
//! always persists the final state before returning. `stop` may be called
//! from any task at any time; the crawl loop checks the stop flag before
//! every dequeue, so a fetch already in flight is allowed to finish and
//! its result is still recorded.

use crate::engine::frontier::{Frontier, QueuedUrl};
use crate::engine::CrawlContext;
use crate::fetcher::{FetchError, PageFetcher};
use crate::job::{CrawlJob, CrawlResult, JobId, JobStatus, PageOutcome};
use crate::CrawlError;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Runs one crawl job
pub struct CrawlEngine {
    job_id: JobId,
    /// Taken by `start`; a second `start` finds it empty
    job: Mutex<Option<CrawlJob>>,
    ctx: CrawlContext,
    running: AtomicBool,
    stop_requested: AtomicBool,
    /// The fetcher of the current run, held so `stop` can close it
    fetcher: Mutex<Option<Arc<dyn PageFetcher>>>,
}

impl CrawlEngine {
    pub fn new(job: CrawlJob, ctx: CrawlContext) -> Self {
        Self {
            job_id: job.id.clone(),
            job: Mutex::new(Some(job)),
            ctx,
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            fetcher: Mutex::new(None),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// True between the start of a run and its end or a stop request
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Runs the job to a terminal state
    ///
    /// # Returns
    ///
    /// * `Ok(JobStatus)` - The terminal status, already persisted
    /// * `Err(CrawlError::InvalidState)` - The job or its stored record was not pending; nothing changed
    /// * `Err(CrawlError::AlreadyStarted)` - `start` was already called on this engine
    /// * `Err(CrawlError::Storage)` - The terminal state could not be persisted
    pub async fn start(&self) -> Result<JobStatus, CrawlError> {
        let Some(mut job) = self.take_job() else {
            tracing::warn!("Job {} has already been started", self.job_id);
            return Err(CrawlError::AlreadyStarted {
                job_id: self.job_id.clone(),
            });
        };

        if job.status != JobStatus::Pending {
            tracing::warn!("Refusing to start job {}: status is {}", job.id, job.status);
            return Err(CrawlError::InvalidState {
                job_id: job.id,
                status: job.status,
            });
        }

        // A stale pending copy must not rerun a job the store has moved on
        if let Some(stored) = self.ctx.job_store.get_job(&job.id).await? {
            if stored.status != JobStatus::Pending {
                tracing::warn!(
                    "Refusing to start job {}: stored status is {}",
                    stored.id,
                    stored.status
                );
                return Err(CrawlError::InvalidState {
                    job_id: stored.id,
                    status: stored.status,
                });
            }
        }

        job.transition(JobStatus::Running)?;
        self.running.store(true, Ordering::SeqCst);

        tracing::info!(
            "Starting crawl job {} from {} (max depth {}, max pages {})",
            job.id,
            job.seed_url,
            job.max_depth,
            job.max_pages
        );
        let start_time = Instant::now();

        let outcome = self.run(&mut job).await;

        self.release_fetcher().await;
        self.running.store(false, Ordering::SeqCst);

        let outcome = match outcome {
            Ok(()) => self
                .ctx
                .result_store
                .count_by_job(&job.id)
                .await
                .map_err(CrawlError::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(count) => {
                job.result_count = Some(count);
                let next = if self.is_stop_requested() {
                    JobStatus::Cancelled
                } else {
                    JobStatus::Completed
                };
                job.transition(next)?;
            }
            Err(e) => {
                tracing::error!("Crawl job {} failed: {}", job.id, e);
                job.result_count = self.ctx.result_store.count_by_job(&job.id).await.ok();
                job.fail(e.to_string())?;
            }
        }

        self.ctx.job_store.save_job(&job).await?;

        tracing::info!(
            "Crawl job {} {}: {} pages processed ({} successful, {} failed) in {:?}",
            job.id,
            job.status,
            job.progress.pages_processed,
            job.progress.pages_successful,
            job.progress.pages_failed,
            start_time.elapsed()
        );

        Ok(job.status)
    }

    /// Requests cancellation
    ///
    /// Clears the running flag and closes the fetcher if one is live. The
    /// crawl loop stops before its next dequeue and the job ends as
    /// cancelled. Calling this again, or on an engine that never started,
    /// is harmless.
    pub async fn stop(&self) {
        let already_requested = self.stop_requested.swap(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);

        if !already_requested {
            tracing::info!("Stop requested for job {}", self.job_id);
        }

        self.release_fetcher().await;
    }

    async fn run(&self, job: &mut CrawlJob) -> Result<(), CrawlError> {
        self.ctx.job_store.save_job(job).await?;

        let fetcher = self.ctx.launcher.launch(&job.options).await?;
        *self.fetcher_slot() = Some(Arc::clone(&fetcher));

        let mut frontier = Frontier::new(&job.seed_url);

        while !self.is_stop_requested() && job.progress.pages_processed < job.max_pages {
            let Some(entry) = frontier.pop() else {
                tracing::debug!("Frontier is empty for job {}", job.id);
                break;
            };

            if !frontier.mark_visited(&entry.url) {
                tracing::trace!("Skipping already visited {}", entry.url);
                continue;
            }

            job.progress.pages_processed += 1;
            tracing::debug!("Processing {} at depth {}", entry.url, entry.depth);

            match self.fetch_and_record(&*fetcher, &job.id, &entry).await? {
                Some(internal_links) => {
                    job.progress.pages_successful += 1;
                    if entry.depth < job.max_depth {
                        let queued =
                            frontier.enqueue_links(internal_links, entry.depth + 1, &entry.url);
                        tracing::debug!("Queued {} links from {}", queued, entry.url);
                    }
                }
                None => job.progress.pages_failed += 1,
            }

            self.persist_progress(job).await;
        }

        if self.is_stop_requested() {
            tracing::info!(
                "Job {} stopped with {} URLs still queued",
                job.id,
                frontier.len()
            );
        } else if !frontier.is_empty() {
            tracing::info!(
                "Job {} reached its page limit with {} URLs still queued",
                job.id,
                frontier.len()
            );
        }

        Ok(())
    }

    /// Fetches one page and persists exactly one result for it
    ///
    /// Returns the page's internal link URLs on success and `None` when the
    /// fetch failed. Only a storage failure is an error.
    async fn fetch_and_record(
        &self,
        fetcher: &dyn PageFetcher,
        job_id: &JobId,
        entry: &QueuedUrl,
    ) -> Result<Option<Vec<String>>, CrawlError> {
        let timeout = self.ctx.settings.page_timeout;
        let fetched_at = Utc::now();
        let start_time = Instant::now();

        let fetched = match tokio::time::timeout(timeout, fetcher.fetch(&entry.url, timeout)).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: entry.url.clone(),
                secs: timeout.as_secs(),
            }),
        };
        let duration_ms = u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (outcome, links) = match fetched {
            Ok(content) => {
                let links = content.internal_links().map(|l| l.url.clone()).collect();
                (PageOutcome::Success(content), Some(links))
            }
            Err(e) => {
                tracing::warn!("Failed to crawl {}: {}", entry.url, e);
                (
                    PageOutcome::Failure {
                        error: e.to_string(),
                    },
                    None,
                )
            }
        };

        let result = CrawlResult {
            job_id: job_id.clone(),
            url: entry.url.clone(),
            depth: entry.depth,
            parent_url: entry.parent_url.clone(),
            fetched_at,
            duration_ms,
            outcome,
        };
        self.ctx.result_store.save_result(&result).await?;

        Ok(links)
    }

    /// Saves progress counters; a failure here never fails the job
    async fn persist_progress(&self, job: &CrawlJob) {
        if let Err(e) = self.ctx.job_store.save_job(job).await {
            tracing::warn!("Failed to persist progress for job {}: {}", job.id, e);
        }
    }

    async fn release_fetcher(&self) {
        let fetcher = self.fetcher_slot().take();
        if let Some(fetcher) = fetcher {
            fetcher.close().await;
        }
    }

    fn take_job(&self) -> Option<CrawlJob> {
        self.job.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn fetcher_slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn PageFetcher>>> {
        self.fetcher.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
