//! Thin typed client over the scan server's HTTP surface.

use reqwest::{Response, StatusCode};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

const JOB_TERMINAL_TIMEOUT_MS: u64 = 15_000;
const JOB_POLL_INTERVAL_MS: u64 = 25;

pub struct TestClient {
    base_url: String,
    http: reqwest::Client,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    pub async fn submit_scan(&self, body: Value) -> Response {
        self.http
            .post(format!("{}/v1/scan", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("scan request failed")
    }

    /// Submit a scan over `directories` and return the job id.
    pub async fn start_scan(&self, directories: &[&Path], primary_dir: Option<&Path>) -> String {
        let mut body = json!({ "directories": directories });
        if let Some(primary) = primary_dir {
            body["primary_dir"] = json!(primary);
        }
        let response = self.submit_scan(body).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        body["job_id"].as_str().expect("job_id in response").to_string()
    }

    pub async fn job_status(&self, job_id: &str) -> Response {
        self.http
            .get(format!("{}/v1/scan/{}", self.base_url, job_id))
            .send()
            .await
            .expect("status request failed")
    }

    /// Poll until the job reaches a terminal status; returns the final body.
    pub async fn wait_until_terminal(&self, job_id: &str) -> Value {
        let start = std::time::Instant::now();
        loop {
            let response = self.job_status(job_id).await;
            assert_eq!(response.status(), StatusCode::OK);
            let body: Value = response.json().await.unwrap();
            match body["status"].as_str() {
                Some("succeeded") | Some("failed") | Some("cancelled") => return body,
                _ => {}
            }
            if start.elapsed() > Duration::from_millis(JOB_TERMINAL_TIMEOUT_MS) {
                panic!("job {job_id} did not finish in time, last body: {body}");
            }
            tokio::time::sleep(Duration::from_millis(JOB_POLL_INTERVAL_MS)).await;
        }
    }

    pub async fn groups(&self, job_id: &str, limit: Option<usize>, offset: Option<usize>) -> Response {
        let mut url = format!("{}/v1/scan/{}/groups", self.base_url, job_id);
        let mut sep = '?';
        if let Some(limit) = limit {
            url.push_str(&format!("{sep}limit={limit}"));
            sep = '&';
        }
        if let Some(offset) = offset {
            url.push_str(&format!("{sep}offset={offset}"));
        }
        self.http.get(url).send().await.expect("groups request failed")
    }

    pub async fn groups_ok(&self, job_id: &str) -> Value {
        let response = self.groups(job_id, None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        response.json().await.unwrap()
    }

    pub async fn cancel(&self, job_id: &str) -> Response {
        self.http
            .post(format!("{}/v1/scan/{}/cancel", self.base_url, job_id))
            .send()
            .await
            .expect("cancel request failed")
    }

    pub async fn list_jobs(&self) -> Value {
        let response = self
            .http
            .get(format!("{}/v1/scans", self.base_url))
            .send()
            .await
            .expect("list request failed");
        assert_eq!(response.status(), StatusCode::OK);
        response.json().await.unwrap()
    }

    pub async fn latest_job(&self) -> Value {
        let response = self
            .http
            .get(format!("{}/v1/scans/latest", self.base_url))
            .send()
            .await
            .expect("latest request failed");
        assert_eq!(response.status(), StatusCode::OK);
        response.json().await.unwrap()
    }

    pub async fn trash(&self, body: Value) -> Response {
        self.http
            .post(format!("{}/v1/actions/trash", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("trash request failed")
    }

    pub async fn trash_keep_primary(&self, body: Value) -> Response {
        self.http
            .post(format!("{}/v1/actions/trash-keep-primary", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("keep-primary request failed")
    }

    pub async fn rebuild_db(&self) -> Response {
        self.http
            .post(format!("{}/v1/admin/rebuild-db", self.base_url))
            .send()
            .await
            .expect("rebuild request failed")
    }
}
