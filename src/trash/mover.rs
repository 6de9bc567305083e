//! File moving. Per-file best effort: a failed or missing file is logged and
//! reported in its outcome, never raised to the caller.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct TrashOptions {
    /// Where victims go. `None` means the system trash.
    pub destination: Option<PathBuf>,
    /// Recreate the source directory structure under the destination.
    pub recreate_paths: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveResult {
    Trashed,
    Missing,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveOutcome {
    pub path: String,
    pub result: MoveResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Move every path to the trash. Missing files are skipped, failures are
/// recorded per file; the batch always runs to the end.
pub fn move_to_trash(paths: &[PathBuf], options: &TrashOptions) -> Vec<MoveOutcome> {
    let mut outcomes = Vec::with_capacity(paths.len());
    for src in paths {
        let outcome = if !src.exists() {
            warn!("file not found, skipping: {:?}", src);
            MoveOutcome {
                path: src.to_string_lossy().into_owned(),
                result: MoveResult::Missing,
                detail: None,
            }
        } else {
            match move_one(src, options) {
                Ok(()) => MoveOutcome {
                    path: src.to_string_lossy().into_owned(),
                    result: MoveResult::Trashed,
                    detail: None,
                },
                Err(detail) => {
                    warn!("failed to move {:?}: {}", src, detail);
                    MoveOutcome {
                        path: src.to_string_lossy().into_owned(),
                        result: MoveResult::Failed,
                        detail: Some(detail),
                    }
                }
            }
        };
        outcomes.push(outcome);
    }
    let trashed = outcomes
        .iter()
        .filter(|o| o.result == MoveResult::Trashed)
        .count();
    info!("trash batch done: {}/{} files moved", trashed, paths.len());
    outcomes
}

fn move_one(src: &Path, options: &TrashOptions) -> Result<(), String> {
    match &options.destination {
        Some(dest_dir) => {
            let relative = if options.recreate_paths {
                strip_root(src)
            } else {
                PathBuf::from(src.file_name().ok_or("source has no file name")?)
            };
            let target = unique_destination(dest_dir.join(relative));
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("failed to create {parent:?}: {e}"))?;
            }
            info!("moving {:?} -> {:?}", src, target);
            rename_or_copy(src, &target)
        }
        None => {
            info!("sending to system trash: {:?}", src);
            trash::delete(src).map_err(|e| e.to_string())
        }
    }
}

/// `fs::rename` cannot cross filesystems; fall back to copy + remove.
fn rename_or_copy(src: &Path, target: &Path) -> Result<(), String> {
    if std::fs::rename(src, target).is_ok() {
        return Ok(());
    }
    std::fs::copy(src, target).map_err(|e| format!("copy failed: {e}"))?;
    std::fs::remove_file(src).map_err(|e| format!("source removal failed: {e}"))
}

fn strip_root(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| {
            matches!(
                c,
                std::path::Component::Normal(_) | std::path::Component::CurDir
            )
        })
        .collect()
}

/// Append a short random suffix when the destination already exists.
fn unique_destination(dest: PathBuf) -> PathBuf {
    if !dest.exists() {
        return dest;
    }
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = dest
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let id = uuid::Uuid::new_v4().simple().to_string();
    let tag = &id[..6];
    dest.with_file_name(format!("{stem}-{tag}{suffix}"))
}
