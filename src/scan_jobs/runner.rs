//! The per-job scan worker.
//!
//! Each submitted job gets its own spawned task: it drives the matcher,
//! clusters the matches, fans group enrichment out to a bounded pool and
//! finalizes the job state. Cancellation is cooperative: the level-triggered
//! flag (and the process shutdown token) is observed only at the checkpoints
//! marked below, so in-flight work always runs to completion.
//!
//! Every failure resolves to a terminal status; no path leaves a job stuck
//! in `Running`.

use super::models::{GroupResult, JobStatus, ScanJob};
use super::ScanContext;
use crate::cluster::ClusterBuilder;
use crate::matcher::{MatchSet, MatchSettings, MatcherError};
use crate::metadata::{path_key, KeeperPolicy, StatsReader};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

enum ScanFailure {
    Cancelled,
    Failed(String),
}

/// Run a submitted job on its own dedicated worker task.
pub fn spawn_scan(
    ctx: ScanContext,
    job_id: String,
    settings: MatchSettings,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_scan(ctx, job_id, settings))
}

async fn run_scan(ctx: ScanContext, job_id: String, settings: MatchSettings) {
    let Some(mut job) = ctx.job_store.get(&job_id) else {
        error!("scan worker started for unknown job {}", job_id);
        return;
    };
    if job.status.is_terminal() {
        warn!("scan worker started for finished job {}, ignoring", job_id);
        return;
    }

    job.status = JobStatus::Running;
    persist(&ctx, &job);

    match execute(&ctx, &job, &settings).await {
        Ok(groups) => {
            info!("scan {} succeeded with {} groups", job.id, groups.len());
            if let Err(e) = ctx.scan_store.replace_groups(&job.id, &groups) {
                error!("failed to persist groups for job {}: {:#}", job.id, e);
            }
            job.groups = groups;
            job.status = JobStatus::Succeeded;
        }
        Err(ScanFailure::Cancelled) => {
            info!("scan {} cancelled", job.id);
            job.status = JobStatus::Cancelled;
            job.message = "scan cancelled by user".to_string();
        }
        Err(ScanFailure::Failed(message)) => {
            error!("scan {} failed: {}", job.id, message);
            job.status = JobStatus::Failed;
            job.message = message;
        }
    }

    // Terminal status and finish timestamp land in one store update.
    job.cancel_requested = ctx.job_store.cancel_requested(&job.id);
    job.finished_at = Some(chrono::Utc::now().timestamp());
    persist(&ctx, &job);
}

/// In-memory update first, durable write second. A failed durable write
/// leaves the checkpoint one step stale; startup reload is the recovery path.
fn persist(ctx: &ScanContext, job: &ScanJob) {
    ctx.job_store.update(job.clone());
    if let Err(e) = ctx.scan_store.upsert_job(job) {
        error!("durable write for job {} failed: {:#}", job.id, e);
    }
}

fn observed_cancel(ctx: &ScanContext, job_id: &str) -> bool {
    ctx.job_store.cancel_requested(job_id) || ctx.shutdown.is_cancelled()
}

async fn execute(
    ctx: &ScanContext,
    job: &ScanJob,
    settings: &MatchSettings,
) -> Result<Vec<GroupResult>, ScanFailure> {
    // Checkpoint: before invoking the matcher.
    if observed_cancel(ctx, &job.id) {
        return Err(ScanFailure::Cancelled);
    }

    let match_set = run_matcher_with_retry(ctx, job, settings).await?;

    // Checkpoint: immediately after the matcher returns.
    if observed_cancel(ctx, &job.id) {
        return Err(ScanFailure::Cancelled);
    }

    let mut builder = ClusterBuilder::new();
    match &match_set {
        MatchSet::Pairs(pairs) => {
            for (a, b) in pairs {
                builder.add_pair(a, b);
            }
        }
        MatchSet::Groups(groups) => {
            for members in groups {
                builder.add_group(members);
            }
        }
    }
    let groups = builder.into_groups();

    enrich_groups(ctx, job, groups).await
}

/// One automatic retry, only for the stale-cache error class: clear the
/// matcher's cache and invoke it once more. Anything else is terminal.
async fn run_matcher_with_retry(
    ctx: &ScanContext,
    job: &ScanJob,
    settings: &MatchSettings,
) -> Result<MatchSet, ScanFailure> {
    match invoke_matcher(ctx, job, settings).await {
        Ok(matches) => Ok(matches),
        Err(err) if err.is_stale_cache() => {
            warn!("scan {}: {}; clearing cache and retrying once", job.id, err);
            let matcher = ctx.matcher.clone();
            match tokio::task::spawn_blocking(move || matcher.clear_cache()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(ScanFailure::Failed(format!(
                        "failed to reset match cache: {e}"
                    )))
                }
                Err(e) => {
                    return Err(ScanFailure::Failed(format!("cache reset task failed: {e}")))
                }
            }
            invoke_matcher(ctx, job, settings)
                .await
                .map_err(|e| ScanFailure::Failed(format!("matcher failed after cache reset: {e}")))
        }
        Err(err) => Err(ScanFailure::Failed(err.to_string())),
    }
}

async fn invoke_matcher(
    ctx: &ScanContext,
    job: &ScanJob,
    settings: &MatchSettings,
) -> Result<MatchSet, MatcherError> {
    let matcher = ctx.matcher.clone();
    let directories = job.directories.clone();
    let settings = settings.clone();
    match tokio::task::spawn_blocking(move || matcher.find_matches(&directories, &settings)).await {
        Ok(result) => result,
        Err(e) => Err(MatcherError::Failed(format!("matcher task died: {e}"))),
    }
}

/// Groups are independent, so they fan out to at most `workers` concurrent
/// tasks; results are reassembled in ascending group-id order no matter
/// which task finishes first. Fail-fast: a single broken group fails the
/// whole job, never a silent partial success.
async fn enrich_groups(
    ctx: &ScanContext,
    job: &ScanJob,
    groups: Vec<Vec<PathBuf>>,
) -> Result<Vec<GroupResult>, ScanFailure> {
    let workers = if job.workers == 0 {
        ctx.default_workers.max(1)
    } else {
        job.workers
    };
    let semaphore = Arc::new(Semaphore::new(workers));
    let policy = Arc::new(KeeperPolicy::new(
        job.primary_dir.clone(),
        job.use_sharpness,
    ));

    let mut handles = Vec::with_capacity(groups.len());
    let mut cancelled = false;
    for (index, members) in groups.into_iter().enumerate() {
        // Checkpoint: before dispatching each group. Groups already in
        // flight run to completion; nothing new starts past this point.
        if observed_cancel(ctx, &job.id) {
            cancelled = true;
            break;
        }
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return Err(ScanFailure::Failed("enrichment pool closed".to_string())),
        };
        let reader = ctx.stats_reader.clone();
        let policy = policy.clone();
        let use_sharpness = job.use_sharpness;
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            enrich_one(index as i64 + 1, members, reader.as_ref(), &policy, use_sharpness)
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(group) => results.push(group),
            Err(e) => {
                return Err(ScanFailure::Failed(format!("group enrichment failed: {e}")));
            }
        }
        // Checkpoint: between enrichment results.
        if observed_cancel(ctx, &job.id) {
            cancelled = true;
        }
    }

    if cancelled {
        return Err(ScanFailure::Cancelled);
    }
    Ok(results)
}

fn enrich_one(
    id: i64,
    members: Vec<PathBuf>,
    reader: &dyn StatsReader,
    policy: &KeeperPolicy,
    use_sharpness: bool,
) -> GroupResult {
    let mut stats = HashMap::with_capacity(members.len());
    for path in &members {
        stats.insert(path_key(path), reader.stats(path, use_sharpness));
    }
    let suggested = policy
        .suggest(&members, &stats)
        .map(|path| path_key(&path))
        .unwrap_or_default();
    GroupResult {
        id,
        files: members.iter().map(|path| path_key(path)).collect(),
        suggested,
        stats,
    }
}
