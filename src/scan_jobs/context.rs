use super::JobStore;
use crate::matcher::SimilarityMatcher;
use crate::metadata::StatsReader;
use crate::scan_store::ScanStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Dependencies shared by HTTP handlers and scan workers.
///
/// Built once at startup; there is no other process-wide mutable state.
#[derive(Clone)]
pub struct ScanContext {
    /// In-memory job index, the sole runtime read path.
    pub job_store: Arc<JobStore>,

    /// Durable checkpoint store, written on every transition.
    pub scan_store: Arc<dyn ScanStore>,

    /// The external matching collaborator.
    pub matcher: Arc<dyn SimilarityMatcher>,

    /// Per-file metadata collaborator.
    pub stats_reader: Arc<dyn StatsReader>,

    /// Process shutdown signal; workers observe it at the same checkpoints
    /// as user cancellation.
    pub shutdown: CancellationToken,

    /// Enrichment concurrency bound when a scan request does not set one.
    pub default_workers: usize,
}

impl ScanContext {
    pub fn new(
        job_store: Arc<JobStore>,
        scan_store: Arc<dyn ScanStore>,
        matcher: Arc<dyn SimilarityMatcher>,
        stats_reader: Arc<dyn StatsReader>,
        shutdown: CancellationToken,
        default_workers: usize,
    ) -> Self {
        Self {
            job_store,
            scan_store,
            matcher,
            stats_reader,
            shutdown,
            default_workers,
        }
    }
}
