//! Validation guarding the "keep primary directory" bulk deletion.
//!
//! Every check runs, and the complete victim set is computed, before any
//! filesystem mutation. A rejection has zero side effects.

use crate::scan_jobs::ScanJob;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrashValidationError {
    #[error("keep-primary deletion requires a scan over more than one directory")]
    SingleDirectoryScan,

    #[error("no primary directory designated for this job")]
    NoPrimaryDirectory,

    #[error("primary directory {0} was not part of the scan")]
    PrimaryNotScanned(String),
}

/// Validate a keep-primary request and compute its victims.
///
/// `requested_primary` overrides the primary directory recorded on the job;
/// either may supply it. Checks, in order: the job scanned more than one
/// directory; a primary directory is designated; the primary, canonicalized,
/// is literally one of the scanned directories.
///
/// Victims: in each group with at least one member under the primary, every
/// member not under the primary. Members under the primary are spared, and
/// groups with no primary member are ambiguous and left untouched.
pub fn keep_primary_victims(
    job: &ScanJob,
    requested_primary: Option<&Path>,
) -> Result<Vec<PathBuf>, TrashValidationError> {
    if job.directories.len() <= 1 {
        return Err(TrashValidationError::SingleDirectoryScan);
    }

    let primary = requested_primary
        .map(Path::to_path_buf)
        .or_else(|| job.primary_dir.clone())
        .ok_or(TrashValidationError::NoPrimaryDirectory)?;
    let primary = primary.canonicalize().unwrap_or(primary);

    if !job.directories.iter().any(|dir| dir == &primary) {
        return Err(TrashValidationError::PrimaryNotScanned(
            primary.to_string_lossy().into_owned(),
        ));
    }

    let mut victims = Vec::new();
    for group in &job.groups {
        let members: Vec<PathBuf> = group.files.iter().map(PathBuf::from).collect();
        let has_primary_member = members.iter().any(|path| is_under(path, &primary));
        if !has_primary_member {
            continue;
        }
        victims.extend(
            members
                .into_iter()
                .filter(|path| !is_under(path, &primary)),
        );
    }
    Ok(victims)
}

fn is_under(path: &Path, dir: &Path) -> bool {
    path != dir && path.starts_with(dir)
}
