use super::RequestsLoggingLevel;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub port: u16,
    pub requests_logging_level: RequestsLoggingLevel,
    /// Path to a frontend build to be statically served.
    pub frontend_dir_path: Option<String>,
    /// Default destination for trash operations; system trash when unset.
    pub trash_dir: Option<PathBuf>,
}
