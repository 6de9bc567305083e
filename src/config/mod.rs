mod file_config;

pub use file_config::{FileConfig, MatcherFileConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// CLI arguments that take part in config resolution. Mirrors the fields the
/// TOML file can override.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    pub port: u16,
    pub workers: usize,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub trash_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MatcherSettings {
    /// Digest cache location. `None` disables caching.
    pub cache_path: Option<PathBuf>,
    /// Emit raw pairs instead of pre-grouped clusters.
    pub emit_pairs: bool,
    /// Exclude patterns applied to every scan on top of per-request ones.
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub port: u16,
    /// Default enrichment concurrency for jobs that do not set one.
    pub workers: usize,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    /// Default trash destination; system trash when unset.
    pub trash_dir: Option<PathBuf>,
    pub matcher: MatcherSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file
    /// config. TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .or_else(|| cli.data_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("data_dir must be specified via --data-dir or in config file")
            })?;
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {data_dir:?}"))?;

        let port = file.port.unwrap_or(cli.port);
        let workers = file.workers.unwrap_or(cli.workers).max(1);
        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());
        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());
        let trash_dir = file
            .trash_dir
            .map(PathBuf::from)
            .or_else(|| cli.trash_dir.clone());

        let matcher_file = file.matcher.unwrap_or_default();
        let matcher = MatcherSettings {
            cache_path: Some(
                matcher_file
                    .cache_path
                    .map(PathBuf::from)
                    .unwrap_or_else(|| data_dir.join("hash_cache.json")),
            ),
            emit_pairs: matcher_file.emit_pairs.unwrap_or(false),
            exclude_patterns: matcher_file.exclude_patterns.unwrap_or_default(),
        };

        Ok(Self {
            data_dir,
            port,
            workers,
            logging_level,
            frontend_dir_path,
            trash_dir,
            matcher,
        })
    }

    pub fn scan_db_path(&self) -> PathBuf {
        self.data_dir.join("scans.db")
    }
}

fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    match s.to_ascii_lowercase().as_str() {
        "none" => Some(RequestsLoggingLevel::None),
        "path" => Some(RequestsLoggingLevel::Path),
        "headers" => Some(RequestsLoggingLevel::Headers),
        _ => None,
    }
}
