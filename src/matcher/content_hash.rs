//! Content-digest matcher.
//!
//! The default [`SimilarityMatcher`]: walks the scan directories, digests
//! every supported file with SHA-256 and groups byte-identical files. A JSON
//! digest cache keyed by (size, mtime) makes rescans of unchanged trees
//! cheap. The cache carries a format version; a mismatch surfaces as
//! [`MatcherError::StaleCache`] so the runner can clear it and retry.

use super::{MatchSet, MatchSettings, MatcherError, SimilarityMatcher};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const CACHE_FORMAT_VERSION: u32 = 2;
const CACHE_ALGORITHM: &str = "sha256";

const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "tif", "tiff", "gif"];

#[derive(Debug, Serialize, Deserialize, Default)]
struct DigestCache {
    version: u32,
    algorithm: String,
    entries: HashMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    size: u64,
    mtime: i64,
    digest: String,
}

pub struct ContentHashMatcher {
    cache_path: Option<PathBuf>,
    /// Emit raw pairwise matches instead of pre-grouped clusters.
    emit_pairs: bool,
    /// Server-wide exclude patterns, applied on top of per-scan ones.
    base_excludes: Vec<String>,
}

impl ContentHashMatcher {
    pub fn new(cache_path: Option<PathBuf>, emit_pairs: bool) -> Self {
        Self {
            cache_path,
            emit_pairs,
            base_excludes: Vec::new(),
        }
    }

    pub fn with_excludes(mut self, patterns: Vec<String>) -> Self {
        self.base_excludes = patterns;
        self
    }

    fn load_cache(&self) -> Result<DigestCache, MatcherError> {
        let Some(path) = &self.cache_path else {
            return Ok(DigestCache::empty());
        };
        if !path.exists() {
            return Ok(DigestCache::empty());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| MatcherError::StaleCache(format!("unreadable digest cache: {e}")))?;
        let cache: DigestCache = serde_json::from_str(&content)
            .map_err(|e| MatcherError::StaleCache(format!("malformed digest cache: {e}")))?;
        if cache.version != CACHE_FORMAT_VERSION {
            return Err(MatcherError::StaleCache(format!(
                "digest cache format v{} does not match expected v{}",
                cache.version, CACHE_FORMAT_VERSION
            )));
        }
        if cache.algorithm != CACHE_ALGORITHM {
            return Err(MatcherError::StaleCache(format!(
                "digest cache built with algorithm {:?}, expected {:?}",
                cache.algorithm, CACHE_ALGORITHM
            )));
        }
        Ok(cache)
    }

    fn save_cache(&self, cache: &DigestCache) {
        let Some(path) = &self.cache_path else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string(cache) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!("failed to write digest cache {:?}: {}", path, e);
                }
            }
            Err(e) => warn!("failed to serialize digest cache: {}", e),
        }
    }

    fn collect_files(
        &self,
        directories: &[PathBuf],
        settings: &MatchSettings,
    ) -> Result<Vec<PathBuf>, MatcherError> {
        let excludes: Vec<Regex> = self
            .base_excludes
            .iter()
            .chain(settings.exclude_patterns.iter())
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| MatcherError::Failed(format!("bad exclude pattern {p:?}: {e}")))
            })
            .collect::<Result<_, _>>()?;

        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut files = Vec::new();
        for dir in directories {
            for entry in WalkDir::new(dir).follow_links(false) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("skipping unreadable entry under {:?}: {}", dir, e);
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                if !has_supported_extension(entry.path()) {
                    continue;
                }
                let path = entry
                    .path()
                    .canonicalize()
                    .unwrap_or_else(|_| entry.path().to_path_buf());
                let display = path.to_string_lossy();
                if excludes.iter().any(|re| re.is_match(&display)) {
                    continue;
                }
                if seen.insert(path.clone()) {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    fn digest_files(
        &self,
        files: &[PathBuf],
        cache: &mut DigestCache,
    ) -> BTreeMap<String, Vec<PathBuf>> {
        let mut by_digest: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        let mut hashed = 0usize;
        for path in files {
            let Ok(meta) = std::fs::metadata(path) else {
                warn!("file vanished during scan, skipping: {:?}", path);
                continue;
            };
            let size = meta.len();
            let mtime = file_mtime(&meta);
            let key = path.to_string_lossy().into_owned();

            let cached = cache
                .entries
                .get(&key)
                .filter(|entry| entry.size == size && entry.mtime == mtime)
                .map(|entry| entry.digest.clone());

            let digest = match cached {
                Some(digest) => digest,
                None => match hash_file(path) {
                    Ok(digest) => {
                        hashed += 1;
                        cache.entries.insert(
                            key,
                            CacheEntry {
                                size,
                                mtime,
                                digest: digest.clone(),
                            },
                        );
                        digest
                    }
                    Err(e) => {
                        warn!("failed to hash {:?}, skipping: {}", path, e);
                        continue;
                    }
                },
            };
            by_digest.entry(digest).or_default().push(path.clone());
        }
        debug!("digested {} files ({} uncached)", files.len(), hashed);
        by_digest
    }
}

impl DigestCache {
    fn empty() -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            algorithm: CACHE_ALGORITHM.to_string(),
            entries: HashMap::new(),
        }
    }
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn file_mtime(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

impl SimilarityMatcher for ContentHashMatcher {
    fn find_matches(
        &self,
        directories: &[PathBuf],
        settings: &MatchSettings,
    ) -> Result<MatchSet, MatcherError> {
        let files = self.collect_files(directories, settings)?;
        let mut cache = self.load_cache()?;
        let by_digest = self.digest_files(&files, &mut cache);
        self.save_cache(&cache);

        let groups: Vec<Vec<PathBuf>> = by_digest
            .into_values()
            .filter(|members| members.len() > 1)
            .collect();
        info!(
            "content-hash matcher: {} files scanned, {} duplicate clusters",
            files.len(),
            groups.len()
        );

        if self.emit_pairs {
            let mut pairs = Vec::new();
            for members in &groups {
                for window in members.windows(2) {
                    pairs.push((window[0].clone(), window[1].clone()));
                }
            }
            Ok(MatchSet::Pairs(pairs))
        } else {
            Ok(MatchSet::Groups(groups))
        }
    }

    fn clear_cache(&self) -> Result<(), MatcherError> {
        let Some(path) = &self.cache_path else {
            return Ok(());
        };
        if path.exists() {
            std::fs::remove_file(path)
                .map_err(|e| MatcherError::Failed(format!("failed to remove digest cache: {e}")))?;
            info!("cleared digest cache at {:?}", path);
        }
        Ok(())
    }
}
