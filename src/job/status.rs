/// Job status definitions for tracking a crawl job's lifecycle
///
/// A job moves `pending -> running -> {completed, failed, cancelled}` and
/// never leaves a terminal status.
use serde::Serialize;
use std::fmt;

/// Represents the current status of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job has been created but not yet started
    Pending,

    /// Job is being crawled by an engine
    Running,

    // ===== Terminal States =====
    /// Traversal ended because the frontier emptied or the page limit was hit
    Completed,

    /// An unrecoverable error ended the job
    Failed,

    /// The job was stopped externally
    Cancelled,
}

impl JobStatus {
    /// Returns true if this is a terminal status (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if `next` is a legal successor of this status
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns all possible job statuses
    pub fn all_statuses() -> [Self; 5] {
        [
            Self::Pending,
            Self::Running,
            Self::Completed,
            Self::Failed,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
