use crate::metadata::FileStats;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "succeeded" => Some(JobStatus::Succeeded),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// One duplicate group attached to a succeeded job. Immutable once attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupResult {
    /// 1-based id, assigned in deterministic cluster order.
    pub id: i64,
    /// Canonical paths, sorted. Always at least two members.
    pub files: Vec<String>,
    /// Suggested keeper; always one of `files`.
    pub suggested: String,
    /// Stats per member path.
    pub stats: HashMap<String, FileStats>,
}

#[derive(Debug, Clone)]
pub struct ScanJob {
    pub id: String,
    /// Canonicalized, order-preserving deduplicated scan roots.
    pub directories: Vec<PathBuf>,
    pub primary_dir: Option<PathBuf>,
    pub algorithm: String,
    /// Bound on concurrent group enrichment tasks.
    pub workers: usize,
    pub use_sharpness: bool,
    pub status: JobStatus,
    pub message: String,
    pub created_at: i64,
    /// Set exactly once, together with the terminal status.
    pub finished_at: Option<i64>,
    /// Level-triggered cancellation request, observed at checkpoints.
    pub cancel_requested: bool,
    pub groups: Vec<GroupResult>,
}

impl ScanJob {
    pub fn new(
        directories: Vec<PathBuf>,
        primary_dir: Option<PathBuf>,
        algorithm: String,
        workers: usize,
        use_sharpness: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            directories,
            primary_dir,
            algorithm,
            workers,
            use_sharpness,
            status: JobStatus::Pending,
            message: String::new(),
            created_at: chrono::Utc::now().timestamp(),
            finished_at: None,
            cancel_requested: false,
            groups: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_strings() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("nonsense"), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn new_jobs_start_pending_and_unfinished() {
        let job = ScanJob::new(
            vec![PathBuf::from("/photos")],
            None,
            "sha256".to_string(),
            4,
            false,
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.finished_at.is_none());
        assert!(!job.cancel_requested);
        assert!(job.groups.is_empty());
        assert!(job.created_at > 0);
    }
}
