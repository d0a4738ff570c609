//! Job supervisor
//!
//! Tracks the engines of running jobs by ID. Each submitted job gets its own
//! engine on its own Tokio task; the supervisor only holds a handle so the
//! job can be cancelled, and the task removes that handle when it ends.
//! A cancelled engine stays registered as stopping until its task ends, so
//! its ID cannot be resubmitted while the old run is still finishing.

use crate::engine::{CrawlContext, CrawlEngine};
use crate::job::{CrawlJob, JobId, JobStatus};
use crate::storage::{Projection, ResultPage};
use crate::CrawlError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct EngineRegistry {
    /// Engines that can still be cancelled
    running: HashMap<JobId, Arc<CrawlEngine>>,
    /// Cancelled engines whose task has not ended yet
    stopping: HashMap<JobId, Arc<CrawlEngine>>,
}

impl EngineRegistry {
    fn contains(&self, job_id: &JobId) -> bool {
        self.running.contains_key(job_id) || self.stopping.contains_key(job_id)
    }

    /// Drops `engine` from whichever map still holds it
    fn release(&mut self, job_id: &JobId, engine: &Arc<CrawlEngine>) {
        for map in [&mut self.running, &mut self.stopping] {
            if map
                .get(job_id)
                .is_some_and(|live| Arc::ptr_eq(live, engine))
            {
                map.remove(job_id);
            }
        }
    }
}

/// Starts, cancels and queries crawl jobs
pub struct CrawlSupervisor {
    ctx: CrawlContext,
    engines: Arc<Mutex<EngineRegistry>>,
}

impl CrawlSupervisor {
    pub fn new(ctx: CrawlContext) -> Self {
        Self {
            ctx,
            engines: Arc::new(Mutex::new(EngineRegistry::default())),
        }
    }

    /// Starts a pending job on a background task
    ///
    /// Must be called from within a Tokio runtime. The stored record, when
    /// there is one, must be pending as well as `job` itself; a stale copy of
    /// a job that already ran is refused.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The job was handed to a new engine
    /// * `Err(CrawlError::InvalidState)` - The job or its stored record is not pending
    /// * `Err(CrawlError::AlreadyStarted)` - An engine for this ID is still live
    pub async fn submit(&self, job: CrawlJob) -> Result<(), CrawlError> {
        if job.status != JobStatus::Pending {
            return Err(CrawlError::InvalidState {
                job_id: job.id,
                status: job.status,
            });
        }

        if let Some(stored) = self.ctx.job_store.get_job(&job.id).await? {
            if stored.status != JobStatus::Pending {
                tracing::warn!(
                    "Refusing to submit job {}: stored status is {}",
                    stored.id,
                    stored.status
                );
                return Err(CrawlError::InvalidState {
                    job_id: stored.id,
                    status: stored.status,
                });
            }
        }

        let job_id = job.id.clone();
        let engine = {
            let mut engines = lock(&self.engines);
            if engines.contains(&job_id) {
                return Err(CrawlError::AlreadyStarted { job_id });
            }
            let engine = Arc::new(CrawlEngine::new(job, self.ctx.clone()));
            engines.running.insert(job_id.clone(), Arc::clone(&engine));
            engine
        };

        tracing::info!("Submitted crawl job {}", job_id);

        let registry = Arc::clone(&self.engines);
        tokio::spawn(async move {
            match engine.start().await {
                Ok(status) => tracing::debug!("Crawl job {} finished as {}", job_id, status),
                Err(e) => tracing::error!("Crawl job {} could not be finalized: {}", job_id, e),
            }

            lock(&registry).release(&job_id, &engine);
        });

        Ok(())
    }

    /// Stops a running job
    ///
    /// Unknown or already finished job IDs are ignored. The job record and
    /// its results are left to the engine, which ends the run as cancelled.
    pub async fn cancel(&self, job_id: &JobId) {
        let engine = {
            let mut engines = lock(&self.engines);
            let engine = engines.running.remove(job_id);
            if let Some(engine) = &engine {
                engines
                    .stopping
                    .insert(job_id.clone(), Arc::clone(engine));
            }
            engine
        };
        match engine {
            Some(engine) => engine.stop().await,
            None => tracing::debug!("Cancel ignored: job {} is not running", job_id),
        }
    }

    /// Loads a job record
    pub async fn job(&self, job_id: &JobId) -> Result<CrawlJob, CrawlError> {
        self.ctx
            .job_store
            .get_job(job_id)
            .await?
            .ok_or_else(|| CrawlError::NotFound(job_id.clone()))
    }

    /// Lists a job's results without their raw HTML
    ///
    /// `page` is 1-based and `page_size` is clamped to `1..=MAX_PAGE_SIZE`.
    pub async fn results_page(
        &self,
        job_id: &JobId,
        page: u32,
        page_size: u32,
    ) -> Result<ResultPage, CrawlError> {
        self.job(job_id).await?;

        let results = self
            .ctx
            .result_store
            .page_by_job(job_id, page, page_size, Projection::Summary)
            .await?;
        Ok(results)
    }

    /// IDs of jobs with a live engine, sorted
    pub fn active_jobs(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = lock(&self.engines).running.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// True while the job has an engine that can still be cancelled
    pub fn is_active(&self, job_id: &JobId) -> bool {
        lock(&self.engines).running.contains_key(job_id)
    }

    /// True until the job's task has ended, including while a cancelled
    /// engine is still finishing
    ///
    /// Once this is false the engine has written whatever final state it
    /// could. A job that is untracked yet not terminal had its final save
    /// fail.
    pub fn is_tracked(&self, job_id: &JobId) -> bool {
        lock(&self.engines).contains(job_id)
    }

    /// Stops every live engine
    pub async fn shutdown(&self) {
        let engines: Vec<Arc<CrawlEngine>> = {
            let mut registry = lock(&self.engines);
            let drained: Vec<_> = registry.running.drain().collect();
            for (job_id, engine) in &drained {
                registry.stopping.insert(job_id.clone(), Arc::clone(engine));
            }
            drained.into_iter().map(|(_, engine)| engine).collect()
        };

        if !engines.is_empty() {
            tracing::info!("Stopping {} running crawl jobs", engines.len());
        }
        for engine in engines {
            engine.stop().await;
        }
    }
}

fn lock(engines: &Mutex<EngineRegistry>) -> MutexGuard<'_, EngineRegistry> {
    engines.lock().unwrap_or_else(PoisonError::into_inner)
}
