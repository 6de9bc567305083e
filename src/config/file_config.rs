use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub data_dir: Option<String>,
    pub port: Option<u16>,
    pub workers: Option<usize>,
    pub logging_level: Option<String>,
    pub frontend_dir_path: Option<String>,
    pub trash_dir: Option<String>,

    // Feature configs
    pub matcher: Option<MatcherFileConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct MatcherFileConfig {
    pub cache_path: Option<String>,
    pub emit_pairs: Option<bool>,
    pub exclude_patterns: Option<Vec<String>>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
