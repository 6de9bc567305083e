//! In-memory job index.
//!
//! The single source of truth while the process is alive; the durable store
//! is only read back at startup. One lock, held only around map access,
//! never across I/O.

use super::models::{JobStatus, ScanJob};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

#[derive(Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<String, ScanJob>>,
}

impl JobStore {
    pub fn new(initial: Vec<ScanJob>) -> Self {
        Self {
            jobs: Mutex::new(initial.into_iter().map(|job| (job.id.clone(), job)).collect()),
        }
    }

    pub fn insert(&self, job: ScanJob) {
        self.jobs.lock().unwrap().insert(job.id.clone(), job);
    }

    pub fn get(&self, job_id: &str) -> Option<ScanJob> {
        self.jobs.lock().unwrap().get(job_id).cloned()
    }

    /// Replace a job's state. A job already in a terminal state is immutable;
    /// attempts to overwrite it are dropped. The cancellation flag is
    /// level-triggered and merged, so a worker snapshot taken before a cancel
    /// request cannot un-set it.
    pub fn update(&self, mut job: ScanJob) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(existing) = jobs.get(&job.id) {
            if existing.status.is_terminal() {
                warn!(
                    "ignoring update to terminal job {} ({})",
                    job.id,
                    existing.status.as_str()
                );
                return;
            }
            job.cancel_requested = job.cancel_requested || existing.cancel_requested;
        }
        jobs.insert(job.id.clone(), job);
    }

    /// Set the cancellation flag. Returns the job's status at the time of the
    /// request, or `None` for an unknown job. The flag is only honored for
    /// non-terminal jobs.
    pub fn request_cancel(&self, job_id: &str) -> Option<JobStatus> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(job_id)?;
        let status = job.status;
        if !status.is_terminal() {
            job.cancel_requested = true;
        }
        Some(status)
    }

    pub fn cancel_requested(&self, job_id: &str) -> bool {
        self.jobs
            .lock()
            .unwrap()
            .get(job_id)
            .map(|job| job.cancel_requested)
            .unwrap_or(false)
    }

    pub fn all(&self) -> Vec<ScanJob> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }

    pub fn reset(&self, initial: Vec<ScanJob>) {
        *self.jobs.lock().unwrap() = initial.into_iter().map(|job| (job.id.clone(), job)).collect();
    }
}
