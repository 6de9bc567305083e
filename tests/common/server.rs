//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own data directory and
//! database. When dropped, the server shuts down and temp resources are
//! cleaned up.

use dupescan_server::scan_jobs::JobStore;
use dupescan_server::scan_store::{sweep_interrupted_jobs, ScanStore};
use dupescan_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use dupescan_server::{ContentHashMatcher, ImageStatsReader, ScanContext, SqliteScanStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const SERVER_READY_TIMEOUT_MS: u64 = 5_000;
const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Context for direct store access in tests.
    pub ctx: ScanContext,

    /// The server's default trash destination.
    pub trash_dir: PathBuf,

    // Private fields - keep resources alive until drop
    _data_dir: Option<TempDir>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawn a server over a fresh temporary data directory.
    pub async fn spawn() -> Self {
        let data_dir = TempDir::new().unwrap();
        let data_path = data_dir.path().to_path_buf();
        Self::spawn_inner(&data_path, Some(data_dir)).await
    }

    /// Spawn a server over an existing data directory. Used to simulate a
    /// process restart against the same persisted state.
    pub async fn spawn_in(data_path: &Path) -> Self {
        Self::spawn_inner(data_path, None).await
    }

    async fn spawn_inner(data_path: &Path, data_dir: Option<TempDir>) -> Self {
        let scan_store =
            Arc::new(SqliteScanStore::new(data_path.join("scans.db")).expect("open scan store"));

        // Same startup path as the binary: reload, then sweep interrupted jobs.
        let mut jobs = scan_store.load_jobs().expect("load persisted jobs");
        sweep_interrupted_jobs(scan_store.as_ref() as &dyn ScanStore, &mut jobs);
        let job_store = Arc::new(JobStore::new(jobs));

        let matcher = Arc::new(ContentHashMatcher::new(
            Some(data_path.join("hash_cache.json")),
            false,
        ));

        let ctx = ScanContext::new(
            job_store,
            scan_store,
            matcher,
            Arc::new(ImageStatsReader),
            CancellationToken::new(),
            2,
        );

        let trash_dir = data_path.join("trash");
        std::fs::create_dir_all(&trash_dir).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener.local_addr().expect("local addr").port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            frontend_dir_path: None,
            trash_dir: Some(trash_dir.clone()),
        };
        let app = make_app(config, ctx.clone());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            ctx,
            trash_dir,
            _data_dir: data_dir,
            _shutdown_tx: Some(shutdown_tx),
        };
        server.wait_for_ready().await;
        server
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!("Server did not become ready within {SERVER_READY_TIMEOUT_MS}ms");
            }
            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
