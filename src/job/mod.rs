//! Job module: crawl requests, their lifecycle, and per-page results
//!
//! # Components
//!
//! - `CrawlJob`: a crawl request with its status and progress counters
//! - `JobStatus`: the job state machine
//! - `CrawlResult`: the record stored for each attempted page

mod record;
mod result;
mod status;

pub use record::{CrawlJob, CrawlOptions, FieldSelector, JobId, JobProgress};
pub use result::{CrawlResult, PageOutcome};
pub use status::JobStatus;
