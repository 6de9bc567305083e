//! Similarity matcher seam.
//!
//! The matching algorithm itself is a pluggable collaborator behind the
//! [`SimilarityMatcher`] trait: it receives the scan directories and reports
//! either raw pairwise matches or clusters it already grouped internally.
//! The one failure class the scan runner treats as recoverable is
//! [`MatcherError::StaleCache`].

mod content_hash;

pub use content_hash::ContentHashMatcher;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatcherError {
    /// The persisted match cache no longer fits the matcher (format or
    /// algorithm changed, or the file is unreadable). The runner clears the
    /// cache and retries exactly once.
    #[error("stale match cache: {0}")]
    StaleCache(String),

    #[error("matcher failed: {0}")]
    Failed(String),
}

impl MatcherError {
    pub fn is_stale_cache(&self) -> bool {
        matches!(self, MatcherError::StaleCache(_))
    }
}

/// What a matcher reports back, depending on how it is configured.
#[derive(Debug, Clone)]
pub enum MatchSet {
    /// Unordered pairwise matches.
    Pairs(Vec<(PathBuf, PathBuf)>),
    /// Clusters the matcher grouped internally.
    Groups(Vec<Vec<PathBuf>>),
}

impl MatchSet {
    pub fn is_empty(&self) -> bool {
        match self {
            MatchSet::Pairs(pairs) => pairs.is_empty(),
            MatchSet::Groups(groups) => groups.is_empty(),
        }
    }
}

/// Per-scan tuning handed to the matcher.
#[derive(Debug, Clone, Default)]
pub struct MatchSettings {
    /// Regex patterns; any file whose path matches one is skipped.
    pub exclude_patterns: Vec<String>,
}

pub trait SimilarityMatcher: Send + Sync {
    /// Scan the given directories and report matches.
    ///
    /// Blocking; the scan runner calls this through `spawn_blocking`.
    fn find_matches(
        &self,
        directories: &[PathBuf],
        settings: &MatchSettings,
    ) -> Result<MatchSet, MatcherError>;

    /// Drop any cached matcher state. Invoked before the automatic retry
    /// after a stale-cache failure.
    fn clear_cache(&self) -> Result<(), MatcherError>;
}
