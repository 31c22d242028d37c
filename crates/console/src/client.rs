//! HTTP side of the debug console.
//!
//! The server answers a job endpoint with `204` while the job runs, so the
//! client re-polls on a fixed interval until it sees a terminal response or
//! its own deadline passes. Every request carries the client's id so the
//! server keeps the result until this client has collected it.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use tokio::time::Instant;

use diag_core::hashing::{md5_hex, sha256_hex};
use diag_core::logging::LoggingCategoriesSnapshot;
use diag_core::types::JobKind;

use crate::error::ConsoleError;

/// Interval between polls of a running job.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Give up on a job after this long.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(120);

/// Header identifying this client to the job endpoints.
pub const CLIENT_HEADER: &str = "x-diag-client";

/// Metadata of a finished report, as advertised by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub file_name: String,
    pub file_size: u64,
    pub md5sum: String,
    /// SHA-256, when the server advertises one.
    #[serde(default)]
    pub checksum: Option<String>,
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Text(String),
    Report(ReportSummary),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct DebugClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    poll_interval: Duration,
    deadline: Duration,
}

impl DebugClient {
    /// `base_url` is the server root, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: uuid::Uuid::new_v4().to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/debug/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start `kind` (or join the running instance) and poll until it settles.
    pub async fn run_job(&self, kind: JobKind) -> Result<JobResult, ConsoleError> {
        let url = self.url(kind.slug());
        let started = Instant::now();
        tracing::info!(job = %kind, %url, "Requesting job");

        loop {
            let response = self
                .http
                .get(&url)
                .header(CLIENT_HEADER, &self.client_id)
                .send()
                .await?;
            match response.status() {
                StatusCode::NO_CONTENT => {
                    let waited = started.elapsed();
                    if waited >= self.deadline {
                        return Err(ConsoleError::Timeout { job: kind, waited });
                    }
                    tracing::debug!(job = %kind, waited_ms = waited.as_millis() as u64, "Job still running");
                    tokio::time::sleep(self.poll_interval).await;
                }
                StatusCode::OK => {
                    let result = if kind == JobKind::ReportGeneration {
                        JobResult::Report(response.json().await?)
                    } else {
                        JobResult::Text(response.text().await?)
                    };
                    tracing::info!(job = %kind, elapsed_ms = started.elapsed().as_millis() as u64, "Job finished");
                    return Ok(result);
                }
                StatusCode::INTERNAL_SERVER_ERROR => {
                    let body = response.text().await?;
                    let message = serde_json::from_str::<ErrorBody>(&body)
                        .map(|e| e.error)
                        .unwrap_or(body);
                    return Err(ConsoleError::JobFailed { job: kind, message });
                }
                status => return Err(unexpected(status, response).await),
            }
        }
    }

    /// Fetch a finished report and verify it against the advertised MD5 sum,
    /// and the SHA-256 checksum when present.
    pub async fn download_report(&self, report: &ReportSummary) -> Result<Vec<u8>, ConsoleError> {
        let response = self
            .http
            .get(self.url("report"))
            .query(&[("filename", report.file_name.as_str())])
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(unexpected(response.status(), response).await);
        }

        let bytes = response.bytes().await?.to_vec();
        verify(&report.md5sum, md5_hex(&bytes))?;
        if let Some(checksum) = &report.checksum {
            verify(checksum, sha256_hex(&bytes))?;
        }
        tracing::info!(file = %report.file_name, size = bytes.len(), "Report downloaded and verified");
        Ok(bytes)
    }

    pub async fn server_info(&self) -> Result<serde_json::Value, ConsoleError> {
        self.get_json("info", &[]).await
    }

    pub async fn logging_categories(&self) -> Result<LoggingCategoriesSnapshot, ConsoleError> {
        self.get_json("logging-categories", &[]).await
    }

    /// Apply a filter token such as `NoDeviceManager`.
    pub async fn apply_logging_filter(
        &self,
        token: &str,
    ) -> Result<LoggingCategoriesSnapshot, ConsoleError> {
        self.get_json("logging-categories", &[("filter", token)]).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ConsoleError> {
        let response = self.http.get(self.url(path)).query(query).send().await?;
        if response.status() != StatusCode::OK {
            return Err(unexpected(response.status(), response).await);
        }
        Ok(response.json().await?)
    }
}

fn verify(expected: &str, actual: String) -> Result<(), ConsoleError> {
    if !expected.eq_ignore_ascii_case(&actual) {
        return Err(ConsoleError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

async fn unexpected(status: StatusCode, response: reqwest::Response) -> ConsoleError {
    let body = response.text().await.unwrap_or_default();
    ConsoleError::UnexpectedStatus {
        status: status.as_u16(),
        body,
    }
}
