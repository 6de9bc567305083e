//! SQLite-backed scan store implementation.

use super::ScanStore;
use crate::metadata::FileStats;
use crate::scan_jobs::{GroupResult, JobStatus, ScanJob};
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE jobs (
    id TEXT PRIMARY KEY,
    directories TEXT NOT NULL,
    primary_dir TEXT,
    algorithm TEXT NOT NULL,
    workers INTEGER NOT NULL,
    use_sharpness INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    message TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL,
    finished_at INTEGER,
    cancel_requested INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    group_index INTEGER NOT NULL,
    files TEXT NOT NULL,
    suggested TEXT NOT NULL,
    stats TEXT NOT NULL
);

CREATE INDEX idx_groups_job_id ON groups(job_id);
";

pub struct SqliteScanStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteScanStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let conn = Connection::open(path).context("Failed to open scan database")?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        if is_new_db {
            info!("Creating new scan database at {:?}", path);
            Self::create_schema(&conn)?;
        } else {
            let db_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
            if db_version != SCHEMA_VERSION {
                anyhow::bail!(
                    "Scan database version {} is not supported (expected {})",
                    db_version,
                    SCHEMA_VERSION
                );
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create scan database schema")?;
        conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;
        Ok(())
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<ScanJob> {
        let directories_json: String = row.get("directories")?;
        let directories: Vec<PathBuf> = serde_json::from_str::<Vec<String>>(&directories_json)
            .unwrap_or_else(|e| {
                warn!("malformed directories column: {}", e);
                Vec::new()
            })
            .into_iter()
            .map(PathBuf::from)
            .collect();

        let status_str: String = row.get("status")?;
        // An unparseable status is treated as failed rather than resurrected.
        let status = JobStatus::parse(&status_str).unwrap_or(JobStatus::Failed);

        let primary_dir: Option<String> = row.get("primary_dir")?;
        let workers: i64 = row.get("workers")?;
        let use_sharpness: i64 = row.get("use_sharpness")?;
        let cancel_requested: i64 = row.get("cancel_requested")?;

        Ok(ScanJob {
            id: row.get("id")?,
            directories,
            primary_dir: primary_dir.map(PathBuf::from),
            algorithm: row.get("algorithm")?,
            workers: workers.max(0) as usize,
            use_sharpness: use_sharpness != 0,
            status,
            message: row.get("message")?,
            created_at: row.get("created_at")?,
            finished_at: row.get("finished_at")?,
            cancel_requested: cancel_requested != 0,
            groups: Vec::new(),
        })
    }

    fn row_to_group(row: &rusqlite::Row) -> rusqlite::Result<(String, GroupResult)> {
        let job_id: String = row.get("job_id")?;
        let files_json: String = row.get("files")?;
        let stats_json: String = row.get("stats")?;

        let files: Vec<String> = serde_json::from_str(&files_json).unwrap_or_else(|e| {
            warn!("malformed files column for job {}: {}", job_id, e);
            Vec::new()
        });
        let stats: HashMap<String, FileStats> =
            serde_json::from_str(&stats_json).unwrap_or_else(|e| {
                warn!("malformed stats column for job {}: {}", job_id, e);
                HashMap::new()
            });

        Ok((
            job_id,
            GroupResult {
                id: row.get("group_index")?,
                files,
                suggested: row.get("suggested")?,
                stats,
            },
        ))
    }
}

impl ScanStore for SqliteScanStore {
    fn upsert_job(&self, job: &ScanJob) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let directories: Vec<String> = job
            .directories
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();

        conn.execute(
            "INSERT INTO jobs (id, directories, primary_dir, algorithm, workers, use_sharpness,
                               status, message, created_at, finished_at, cancel_requested)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                 directories = excluded.directories,
                 primary_dir = excluded.primary_dir,
                 algorithm = excluded.algorithm,
                 workers = excluded.workers,
                 use_sharpness = excluded.use_sharpness,
                 status = excluded.status,
                 message = excluded.message,
                 created_at = excluded.created_at,
                 finished_at = excluded.finished_at,
                 cancel_requested = excluded.cancel_requested",
            params![
                job.id,
                serde_json::to_string(&directories)?,
                job.primary_dir
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
                job.algorithm,
                job.workers as i64,
                job.use_sharpness as i64,
                job.status.as_str(),
                job.message,
                job.created_at,
                job.finished_at,
                job.cancel_requested as i64,
            ],
        )?;
        Ok(())
    }

    fn replace_groups(&self, job_id: &str, groups: &[GroupResult]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM groups WHERE job_id = ?1", params![job_id])?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO groups (job_id, group_index, files, suggested, stats)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for group in groups {
                stmt.execute(params![
                    job_id,
                    group.id,
                    serde_json::to_string(&group.files)?,
                    group.suggested,
                    serde_json::to_string(&group.stats)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_jobs(&self) -> Result<Vec<ScanJob>> {
        let conn = self.conn.lock().unwrap();

        let mut group_map: HashMap<String, Vec<GroupResult>> = HashMap::new();
        {
            let mut stmt = conn
                .prepare("SELECT job_id, group_index, files, suggested, stats FROM groups")?;
            let rows = stmt
                .query_map([], Self::row_to_group)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for (job_id, group) in rows {
                group_map.entry(job_id).or_default().push(group);
            }
        }

        let mut stmt = conn.prepare(
            "SELECT id, directories, primary_dir, algorithm, workers, use_sharpness,
                    status, message, created_at, finished_at, cancel_requested
             FROM jobs",
        )?;
        let mut jobs = stmt
            .query_map([], Self::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for job in &mut jobs {
            if let Some(mut groups) = group_map.remove(&job.id) {
                groups.sort_by_key(|g| g.id);
                job.groups = groups;
            }
        }
        Ok(jobs)
    }

    fn delete_job(&self, job_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM jobs WHERE id = ?1", params![job_id])?;
        Ok(deleted > 0)
    }

    fn rebuild(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("DROP TABLE IF EXISTS groups; DROP TABLE IF EXISTS jobs;")
            .context("Failed to drop scan tables")?;
        Self::create_schema(&conn)?;
        info!("Scan database rebuilt");
        Ok(())
    }
}
