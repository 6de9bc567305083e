use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dupescan_server::config::{self, AppConfig, CliConfig};
use dupescan_server::scan_store::{sweep_interrupted_jobs, ScanStore};
use dupescan_server::server::{run_server, RequestsLoggingLevel, ServerConfig};
use dupescan_server::{ContentHashMatcher, ImageStatsReader, JobStore, ScanContext, SqliteScanStore};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let resolved = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(e) => {
            if e.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, e));
            }
        }
    };
    if resolved.is_absolute() {
        return Ok(resolved);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(resolved))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the scan database and digest cache. Created if
    /// missing. Can also be specified in the config file.
    #[clap(long, value_parser = parse_path)]
    pub data_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8230)]
    pub port: u16,

    /// Default number of concurrent group-enrichment workers per scan.
    #[clap(long, default_value_t = 4)]
    pub workers: usize,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Directory trashed files are moved into. Falls back to the system
    /// trash when unset.
    #[clap(long, value_parser = parse_path)]
    pub trash_dir: Option<PathBuf>,
}

impl From<&CliArgs> for CliConfig {
    fn from(args: &CliArgs) -> Self {
        CliConfig {
            data_dir: args.data_dir.clone(),
            port: args.port,
            workers: args.workers,
            logging_level: args.logging_level.clone(),
            frontend_dir_path: args.frontend_dir_path.clone(),
            trash_dir: args.trash_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    let cli_config: CliConfig = (&cli_args).into();
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  data_dir: {:?}", app_config.data_dir);
    info!("  port: {}", app_config.port);
    info!("  workers: {}", app_config.workers);

    let scan_db_path = app_config.scan_db_path();
    if !scan_db_path.exists() {
        info!("Creating new scan database at {:?}", scan_db_path);
    }
    let scan_store = Arc::new(SqliteScanStore::new(&scan_db_path)?);

    // Rebuild the in-memory index from the durable checkpoint. Jobs that were
    // live when the last process died are finalized as failed.
    let mut jobs = scan_store.load_jobs()?;
    sweep_interrupted_jobs(scan_store.as_ref() as &dyn ScanStore, &mut jobs);
    info!("Loaded {} persisted scan job(s)", jobs.len());
    let job_store = Arc::new(JobStore::new(jobs));

    let matcher = Arc::new(
        ContentHashMatcher::new(
            app_config.matcher.cache_path.clone(),
            app_config.matcher.emit_pairs,
        )
        .with_excludes(app_config.matcher.exclude_patterns.clone()),
    );

    let shutdown_token = CancellationToken::new();
    let ctx = ScanContext::new(
        job_store,
        scan_store,
        matcher,
        Arc::new(ImageStatsReader),
        shutdown_token.child_token(),
        app_config.workers,
    );

    let server_config = ServerConfig {
        port: app_config.port,
        requests_logging_level: app_config.logging_level.clone(),
        frontend_dir_path: app_config.frontend_dir_path.clone(),
        trash_dir: app_config.trash_dir.clone(),
    };

    info!("Ready to serve at port {}!", app_config.port);

    tokio::select! {
        result = run_server(server_config, ctx) => {
            info!("HTTP server stopped: {:?}", result);
            shutdown_token.cancel();
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            shutdown_token.cancel();
            // Give in-flight scan checkpoints a moment to observe the token.
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }
    }
}
