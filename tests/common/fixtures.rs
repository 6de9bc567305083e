//! Filesystem fixtures for end-to-end tests.
//!
//! The default matcher groups byte-identical files, so fixtures only need
//! to write the same bytes under different names to manufacture duplicates.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub fn write_bytes(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, bytes).unwrap();
    path.canonicalize().unwrap()
}

/// Two scan roots with duplicates spread across them:
/// - `shared.png` exists in both roots (a cross-directory duplicate group)
/// - `backup_only*.png` are duplicates living only in the backup root
/// - `unique.png` has no duplicate anywhere
pub struct DupTree {
    pub primary: PathBuf,
    pub backup: PathBuf,
    pub primary_shared: PathBuf,
    pub backup_shared: PathBuf,
    pub backup_only_a: PathBuf,
    pub backup_only_b: PathBuf,
    _root: TempDir,
}

impl DupTree {
    pub fn create() -> Self {
        let root = TempDir::new().unwrap();
        let primary = root.path().join("primary");
        let backup = root.path().join("backup");
        std::fs::create_dir_all(&primary).unwrap();
        std::fs::create_dir_all(&backup).unwrap();

        let primary_shared = write_bytes(&primary, "shared.png", b"shared-image-bytes");
        let backup_shared = write_bytes(&backup, "shared.png", b"shared-image-bytes");
        let backup_only_a = write_bytes(&backup, "backup_only_a.png", b"backup-only-bytes");
        let backup_only_b = write_bytes(&backup, "backup_only_b.png", b"backup-only-bytes");
        write_bytes(&primary, "unique.png", b"one-of-a-kind");

        Self {
            primary: primary.canonicalize().unwrap(),
            backup: backup.canonicalize().unwrap(),
            primary_shared,
            backup_shared,
            backup_only_a,
            backup_only_b,
            _root: root,
        }
    }
}
