//! Durable scan storage.
//!
//! The SQLite store is a checkpoint, not a runtime read path: it is written
//! on every job transition and read back in full exactly once, at startup,
//! to rebuild the in-memory index.

mod sqlite_scan_store;

pub use sqlite_scan_store::SqliteScanStore;

use crate::scan_jobs::{GroupResult, JobStatus, ScanJob};
use anyhow::Result;
use tracing::warn;

pub trait ScanStore: Send + Sync {
    fn upsert_job(&self, job: &ScanJob) -> Result<()>;

    /// Replace the persisted groups of a job wholesale.
    fn replace_groups(&self, job_id: &str, groups: &[GroupResult]) -> Result<()>;

    /// Load every job with its groups reattached, sorted by group id.
    fn load_jobs(&self) -> Result<Vec<ScanJob>>;

    /// Remove a job; its groups go with it (cascade). Returns whether a row
    /// was deleted.
    fn delete_job(&self, job_id: &str) -> Result<bool>;

    /// Drop and recreate all persisted state.
    fn rebuild(&self) -> Result<()>;
}

/// Startup sweep: a job persisted as pending/running was interrupted by a
/// process death and no worker exists for it anymore. Finalize it as failed
/// so nothing appears stuck in a live state.
pub fn sweep_interrupted_jobs(store: &dyn ScanStore, jobs: &mut [ScanJob]) {
    for job in jobs.iter_mut() {
        if job.status.is_terminal() {
            continue;
        }
        warn!(
            "job {} was {} at shutdown, marking failed",
            job.id,
            job.status.as_str()
        );
        job.status = JobStatus::Failed;
        job.message = "scan interrupted by server restart".to_string();
        job.finished_at = Some(chrono::Utc::now().timestamp());
        if let Err(e) = store.upsert_job(job) {
            warn!("failed to persist interrupted job {}: {:#}", job.id, e);
        }
    }
}
