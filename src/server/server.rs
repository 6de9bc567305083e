use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::error;

use axum::{
    extract::{Path as UrlPath, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;

use super::{log_requests, state::ServerState, ServerConfig};
use crate::matcher::MatchSettings;
use crate::metadata::KeeperPolicy;
use crate::scan_jobs::{spawn_scan, GroupResult, JobStatus, ScanContext, ScanJob};
use crate::trash::{keep_primary_victims, move_to_trash, MoveOutcome, TrashOptions};

const DEFAULT_GROUPS_PAGE_SIZE: usize = 50;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: &'static str,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize, Debug)]
struct ScanRequest {
    pub directories: Vec<PathBuf>,
    pub primary_dir: Option<PathBuf>,
    pub workers: Option<usize>,
    pub algorithm: Option<String>,
    pub exclude_patterns: Option<Vec<String>>,
    pub enable_sharpness_check: Option<bool>,
}

#[derive(Serialize)]
struct ScanResponse {
    job_id: String,
    status: JobStatus,
}

#[derive(Serialize)]
struct JobStatusResponse {
    job_id: String,
    status: JobStatus,
    message: String,
    groups: usize,
}

#[derive(Serialize)]
struct JobSummary {
    job_id: String,
    status: JobStatus,
    message: String,
    groups: usize,
    created_at: i64,
    finished_at: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct GroupsQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Serialize)]
struct GroupsResponse {
    job_id: String,
    total_groups: usize,
    groups: Vec<GroupResult>,
    directories: Vec<String>,
}

#[derive(Serialize)]
struct LatestJobResponse {
    job_id: Option<String>,
    status: String,
    groups: usize,
}

#[derive(Deserialize, Debug)]
struct TrashRequest {
    pub job_id: String,
    pub paths: Vec<PathBuf>,
    pub destination: Option<PathBuf>,
    pub recreate_paths: Option<bool>,
}

#[derive(Deserialize, Debug)]
struct TrashKeepPrimaryRequest {
    pub job_id: String,
    pub primary_dir: Option<PathBuf>,
    pub destination: Option<PathBuf>,
    pub recreate_paths: Option<bool>,
}

#[derive(Serialize)]
struct TrashResponse {
    status: &'static str,
    outcomes: Vec<MoveOutcome>,
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("CARGO_PKG_VERSION"),
    };
    Json(stats)
}

/// Canonicalize, validate and order-preserving-dedupe the scan roots.
fn validate_directories(directories: &[PathBuf]) -> Result<Vec<PathBuf>, String> {
    let mut resolved = Vec::with_capacity(directories.len());
    for dir in directories {
        if !dir.is_dir() {
            return Err(format!("directory not found: {}", dir.display()));
        }
        let canonical = dir
            .canonicalize()
            .map_err(|e| format!("cannot resolve directory {}: {e}", dir.display()))?;
        if !resolved.contains(&canonical) {
            resolved.push(canonical);
        }
    }
    Ok(resolved)
}

async fn submit_scan(State(state): State<ServerState>, Json(body): Json<ScanRequest>) -> Response {
    let directories = match validate_directories(&body.directories) {
        Ok(directories) => directories,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };

    let primary_dir = match &body.primary_dir {
        Some(dir) => {
            if !dir.is_dir() {
                return (
                    StatusCode::BAD_REQUEST,
                    format!("primary directory not found: {}", dir.display()),
                )
                    .into_response();
            }
            Some(dir.canonicalize().unwrap_or_else(|_| dir.clone()))
        }
        None => None,
    };

    let job = ScanJob::new(
        directories,
        primary_dir,
        body.algorithm.unwrap_or_else(|| "sha256".to_string()),
        // 0 means "use the server default", resolved by the worker.
        body.workers.unwrap_or(0),
        body.enable_sharpness_check.unwrap_or(false),
    );

    state.ctx.job_store.insert(job.clone());
    if let Err(e) = state.ctx.scan_store.upsert_job(&job) {
        error!("failed to persist new job {}: {:#}", job.id, e);
    }

    let settings = MatchSettings {
        exclude_patterns: body.exclude_patterns.unwrap_or_default(),
    };
    spawn_scan(state.ctx.clone(), job.id.clone(), settings);

    Json(ScanResponse {
        job_id: job.id,
        status: JobStatus::Pending,
    })
    .into_response()
}

async fn get_job_status(
    State(ctx): State<ScanContext>,
    UrlPath(job_id): UrlPath<String>,
) -> Response {
    match ctx.job_store.get(&job_id) {
        Some(job) => Json(JobStatusResponse {
            job_id: job.id,
            status: job.status,
            message: job.message,
            groups: job.groups.len(),
        })
        .into_response(),
        None => (StatusCode::NOT_FOUND, "job not found").into_response(),
    }
}

async fn cancel_scan(
    State(state): State<ServerState>,
    UrlPath(job_id): UrlPath<String>,
) -> Response {
    match state.ctx.job_store.request_cancel(&job_id) {
        None => (StatusCode::NOT_FOUND, "job not found").into_response(),
        Some(status) if status.is_terminal() => (
            StatusCode::BAD_REQUEST,
            format!("cannot cancel job with status: {}", status.as_str()),
        )
            .into_response(),
        Some(_) => {
            if let Some(job) = state.ctx.job_store.get(&job_id) {
                if let Err(e) = state.ctx.scan_store.upsert_job(&job) {
                    error!("failed to persist cancel flag for {}: {:#}", job_id, e);
                }
            }
            Json(serde_json::json!({
                "status": "ok",
                "message": "cancellation requested",
            }))
            .into_response()
        }
    }
}

/// Groups as they stand on disk right now: members that vanished are dropped,
/// groups reduced below two members are omitted, and the keeper is re-derived
/// when the original suggestion no longer exists.
fn filter_groups(job: &ScanJob) -> Vec<GroupResult> {
    let policy = KeeperPolicy::new(job.primary_dir.clone(), job.use_sharpness);
    let mut filtered = Vec::new();
    for group in &job.groups {
        let existing: Vec<String> = group
            .files
            .iter()
            .filter(|file| Path::new(file).exists())
            .cloned()
            .collect();
        if existing.len() < 2 {
            continue;
        }
        let suggested = if existing.contains(&group.suggested) {
            group.suggested.clone()
        } else {
            let members: Vec<PathBuf> = existing.iter().map(PathBuf::from).collect();
            policy
                .suggest(&members, &group.stats)
                .map(|path| path.to_string_lossy().into_owned())
                .unwrap_or_else(|| existing[0].clone())
        };
        filtered.push(GroupResult {
            id: group.id,
            files: existing,
            suggested,
            stats: group.stats.clone(),
        });
    }
    filtered
}

async fn list_groups(
    State(ctx): State<ScanContext>,
    UrlPath(job_id): UrlPath<String>,
    Query(query): Query<GroupsQuery>,
) -> Response {
    let Some(job) = ctx.job_store.get(&job_id) else {
        return (StatusCode::NOT_FOUND, "job not found").into_response();
    };

    let filtered = filter_groups(&job);
    let total_groups = filtered.len();
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_GROUPS_PAGE_SIZE);
    let groups: Vec<GroupResult> = filtered.into_iter().skip(offset).take(limit).collect();

    Json(GroupsResponse {
        job_id: job.id,
        total_groups,
        groups,
        directories: job
            .directories
            .iter()
            .map(|dir| dir.to_string_lossy().into_owned())
            .collect(),
    })
    .into_response()
}

async fn list_jobs(State(ctx): State<ScanContext>) -> Json<Vec<JobSummary>> {
    let mut jobs = ctx.job_store.all();
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(
        jobs.into_iter()
            .map(|job| JobSummary {
                job_id: job.id,
                status: job.status,
                message: job.message,
                groups: job.groups.len(),
                created_at: job.created_at,
                finished_at: job.finished_at,
            })
            .collect(),
    )
}

async fn latest_job(State(ctx): State<ScanContext>) -> Json<LatestJobResponse> {
    let mut jobs: Vec<ScanJob> = ctx
        .job_store
        .all()
        .into_iter()
        .filter(|job| {
            matches!(
                job.status,
                JobStatus::Pending | JobStatus::Running | JobStatus::Succeeded
            )
        })
        .collect();
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    // Prefer the newest job that is actually reviewable.
    if let Some(reviewable) = jobs
        .iter()
        .find(|job| job.status == JobStatus::Succeeded && !job.groups.is_empty())
    {
        return Json(LatestJobResponse {
            job_id: Some(reviewable.id.clone()),
            status: reviewable.status.as_str().to_string(),
            groups: reviewable.groups.len(),
        });
    }

    match jobs.first() {
        Some(latest) => Json(LatestJobResponse {
            // A running job id keeps the client polling; anything else has
            // nothing to review.
            job_id: (latest.status == JobStatus::Running).then(|| latest.id.clone()),
            status: latest.status.as_str().to_string(),
            groups: latest.groups.len(),
        }),
        None => Json(LatestJobResponse {
            job_id: None,
            status: "none".to_string(),
            groups: 0,
        }),
    }
}

async fn run_trash_batch(paths: Vec<PathBuf>, options: TrashOptions) -> Result<Vec<MoveOutcome>> {
    Ok(tokio::task::spawn_blocking(move || move_to_trash(&paths, &options)).await?)
}

async fn trash_files(State(state): State<ServerState>, Json(body): Json<TrashRequest>) -> Response {
    if state.ctx.job_store.get(&body.job_id).is_none() {
        return (StatusCode::NOT_FOUND, "job not found").into_response();
    }

    let options = TrashOptions {
        destination: body.destination.or_else(|| state.config.trash_dir.clone()),
        recreate_paths: body.recreate_paths.unwrap_or(false),
    };
    match run_trash_batch(body.paths, options).await {
        Ok(outcomes) => Json(TrashResponse {
            status: "ok",
            outcomes,
        })
        .into_response(),
        Err(e) => {
            error!("trash batch failed: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn trash_keep_primary(
    State(state): State<ServerState>,
    Json(body): Json<TrashKeepPrimaryRequest>,
) -> Response {
    let Some(job) = state.ctx.job_store.get(&body.job_id) else {
        return (StatusCode::NOT_FOUND, "job not found").into_response();
    };

    // Full validation and the complete victim set come first; a rejection
    // reaches no file.
    let victims = match keep_primary_victims(&job, body.primary_dir.as_deref()) {
        Ok(victims) => victims,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let options = TrashOptions {
        destination: body.destination.or_else(|| state.config.trash_dir.clone()),
        recreate_paths: body.recreate_paths.unwrap_or(false),
    };
    match run_trash_batch(victims, options).await {
        Ok(outcomes) => Json(TrashResponse {
            status: "ok",
            outcomes,
        })
        .into_response(),
        Err(e) => {
            error!("keep-primary trash batch failed: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn rebuild_db(State(ctx): State<ScanContext>) -> Response {
    match ctx.scan_store.rebuild() {
        Ok(()) => {
            ctx.job_store.reset(Vec::new());
            Json(serde_json::json!({
                "status": "ok",
                "message": "scan database rebuilt",
            }))
            .into_response()
        }
        Err(e) => {
            error!("database rebuild failed: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn make_app(config: ServerConfig, ctx: ScanContext) -> Router {
    let state = ServerState {
        config: config.clone(),
        start_time: Instant::now(),
        ctx,
    };

    let scan_routes: Router = Router::new()
        .route("/scan", post(submit_scan))
        .route("/scan/{id}", get(get_job_status))
        .route("/scan/{id}/cancel", post(cancel_scan))
        .route("/scan/{id}/groups", get(list_groups))
        .route("/scans", get(list_jobs))
        .route("/scans/latest", get(latest_job))
        .with_state(state.clone());

    let action_routes: Router = Router::new()
        .route("/actions/trash", post(trash_files))
        .route("/actions/trash-keep-primary", post(trash_keep_primary))
        .route("/admin/rebuild-db", post(rebuild_db))
        .with_state(state.clone());

    let home_router: Router = match &config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new().route("/", get(home)).with_state(state.clone()),
    };

    home_router
        .nest("/v1", scan_routes.merge(action_routes))
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server(config: ServerConfig, ctx: ScanContext) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", config.port)).await?;
    let app = make_app(config, ctx);
    Ok(axum::serve(listener, app).await?)
}
