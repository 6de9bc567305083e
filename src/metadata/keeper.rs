//! Keeper selection.
//!
//! A deterministic total order over a group's files; the highest-ranked file
//! is the suggested keeper. The sharpness key is structural: it participates
//! in every comparison of a policy built with it, and in none of a policy
//! built without it.

use super::FileStats;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Comparator selecting which file of a duplicate group to keep.
///
/// Keys, most significant first:
/// 1. inside the primary directory,
/// 2. sharpness (only when enabled for the job),
/// 3. pixel count,
/// 4. embedded metadata field count,
/// 5. modification time (newer wins),
/// 6. path length (shorter wins), then path bytes — so two distinct paths
///    never compare equal and the selection is reproducible.
#[derive(Debug, Clone)]
pub struct KeeperPolicy {
    primary_dir: Option<PathBuf>,
    use_sharpness: bool,
}

impl KeeperPolicy {
    pub fn new(primary_dir: Option<PathBuf>, use_sharpness: bool) -> Self {
        Self {
            primary_dir,
            use_sharpness,
        }
    }

    fn in_primary(&self, path: &Path) -> bool {
        self.primary_dir
            .as_deref()
            .map(|primary| path != primary && path.starts_with(primary))
            .unwrap_or(false)
    }

    /// `Ordering::Greater` means `a` makes the better keeper.
    pub fn compare(&self, a: &Path, b: &Path, stats: &HashMap<String, FileStats>) -> Ordering {
        let default = FileStats::default();
        let sa = stats.get(&path_key(a)).unwrap_or(&default);
        let sb = stats.get(&path_key(b)).unwrap_or(&default);

        let mut order = self.in_primary(a).cmp(&self.in_primary(b));
        if self.use_sharpness {
            order = order.then_with(|| {
                sa.sharpness
                    .unwrap_or(0.0)
                    .total_cmp(&sb.sharpness.unwrap_or(0.0))
            });
        }
        order
            .then_with(|| sa.pixels.cmp(&sb.pixels))
            .then_with(|| sa.metadata_fields.cmp(&sb.metadata_fields))
            .then_with(|| sa.modified.cmp(&sb.modified))
            // Shorter path ranks higher, so compare lengths reversed.
            .then_with(|| {
                b.as_os_str()
                    .len()
                    .cmp(&a.as_os_str().len())
                    .then_with(|| b.cmp(a))
            })
    }

    /// Pick the keeper among `files`. `None` only for an empty slice.
    pub fn suggest(
        &self,
        files: &[PathBuf],
        stats: &HashMap<String, FileStats>,
    ) -> Option<PathBuf> {
        files
            .iter()
            .max_by(|a, b| self.compare(a, b, stats))
            .cloned()
    }
}

pub(crate) fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_map(entries: &[(&str, FileStats)]) -> HashMap<String, FileStats> {
        entries
            .iter()
            .map(|(path, stats)| (path.to_string(), stats.clone()))
            .collect()
    }

    fn with_pixels(pixels: u64) -> FileStats {
        FileStats {
            pixels,
            ..FileStats::default()
        }
    }

    #[test]
    fn always_returns_a_member() {
        let files = vec![PathBuf::from("/a/1.png"), PathBuf::from("/b/2.png")];
        let policy = KeeperPolicy::new(None, false);
        let keeper = policy.suggest(&files, &HashMap::new()).unwrap();
        assert!(files.contains(&keeper));
    }

    #[test]
    fn empty_group_has_no_keeper() {
        let policy = KeeperPolicy::new(None, false);
        assert!(policy.suggest(&[], &HashMap::new()).is_none());
    }

    #[test]
    fn primary_directory_membership_dominates() {
        let files = vec![
            PathBuf::from("/other/huge.png"),
            PathBuf::from("/primary/small.png"),
        ];
        let stats = stats_map(&[
            ("/other/huge.png", with_pixels(10_000_000)),
            ("/primary/small.png", with_pixels(100)),
        ]);
        let policy = KeeperPolicy::new(Some(PathBuf::from("/primary")), false);
        assert_eq!(
            policy.suggest(&files, &stats).unwrap(),
            PathBuf::from("/primary/small.png")
        );
    }

    #[test]
    fn higher_pixel_count_wins() {
        let files = vec![PathBuf::from("/x/a.png"), PathBuf::from("/x/b.png")];
        let stats = stats_map(&[
            ("/x/a.png", with_pixels(100)),
            ("/x/b.png", with_pixels(200)),
        ]);
        let policy = KeeperPolicy::new(None, false);
        assert_eq!(
            policy.suggest(&files, &stats).unwrap(),
            PathBuf::from("/x/b.png")
        );
    }

    #[test]
    fn metadata_count_breaks_pixel_ties() {
        let files = vec![PathBuf::from("/x/a.png"), PathBuf::from("/x/b.png")];
        let stats = stats_map(&[
            (
                "/x/a.png",
                FileStats {
                    pixels: 100,
                    metadata_fields: 12,
                    ..FileStats::default()
                },
            ),
            (
                "/x/b.png",
                FileStats {
                    pixels: 100,
                    metadata_fields: 3,
                    ..FileStats::default()
                },
            ),
        ]);
        let policy = KeeperPolicy::new(None, false);
        assert_eq!(
            policy.suggest(&files, &stats).unwrap(),
            PathBuf::from("/x/a.png")
        );
    }

    #[test]
    fn newer_mtime_breaks_remaining_ties() {
        let files = vec![PathBuf::from("/x/a.png"), PathBuf::from("/x/b.png")];
        let stats = stats_map(&[
            (
                "/x/a.png",
                FileStats {
                    modified: 1_000,
                    ..FileStats::default()
                },
            ),
            (
                "/x/b.png",
                FileStats {
                    modified: 2_000,
                    ..FileStats::default()
                },
            ),
        ]);
        let policy = KeeperPolicy::new(None, false);
        assert_eq!(
            policy.suggest(&files, &stats).unwrap(),
            PathBuf::from("/x/b.png")
        );
    }

    #[test]
    fn shorter_path_wins_when_all_keys_tie() {
        let files = vec![
            PathBuf::from("/x/copy-of-image.png"),
            PathBuf::from("/x/image.png"),
        ];
        let policy = KeeperPolicy::new(None, false);
        // No stats at all: every metadata key ties, path length decides.
        assert_eq!(
            policy.suggest(&files, &HashMap::new()).unwrap(),
            PathBuf::from("/x/image.png")
        );
        // And the choice is stable regardless of member order.
        let reversed: Vec<PathBuf> = files.iter().rev().cloned().collect();
        assert_eq!(
            policy.suggest(&reversed, &HashMap::new()).unwrap(),
            PathBuf::from("/x/image.png")
        );
    }

    #[test]
    fn equal_length_paths_resolve_by_byte_order() {
        let files = vec![PathBuf::from("/x/b.png"), PathBuf::from("/x/a.png")];
        let policy = KeeperPolicy::new(None, false);
        assert_eq!(
            policy.suggest(&files, &HashMap::new()).unwrap(),
            PathBuf::from("/x/a.png")
        );
    }

    #[test]
    fn sharpness_only_considered_when_enabled() {
        let files = vec![PathBuf::from("/x/sharp.png"), PathBuf::from("/x/big.png")];
        let stats = stats_map(&[
            (
                "/x/sharp.png",
                FileStats {
                    pixels: 100,
                    sharpness: Some(500.0),
                    ..FileStats::default()
                },
            ),
            (
                "/x/big.png",
                FileStats {
                    pixels: 200,
                    sharpness: Some(1.0),
                    ..FileStats::default()
                },
            ),
        ]);

        let with_sharpness = KeeperPolicy::new(None, true);
        assert_eq!(
            with_sharpness.suggest(&files, &stats).unwrap(),
            PathBuf::from("/x/sharp.png")
        );

        let without_sharpness = KeeperPolicy::new(None, false);
        assert_eq!(
            without_sharpness.suggest(&files, &stats).unwrap(),
            PathBuf::from("/x/big.png")
        );
    }

    #[test]
    fn primary_dir_itself_is_not_inside_primary() {
        let policy = KeeperPolicy::new(Some(PathBuf::from("/primary")), false);
        assert!(policy.in_primary(Path::new("/primary/img.png")));
        assert!(policy.in_primary(Path::new("/primary/sub/img.png")));
        assert!(!policy.in_primary(Path::new("/primary")));
        assert!(!policy.in_primary(Path::new("/elsewhere/img.png")));
    }
}
