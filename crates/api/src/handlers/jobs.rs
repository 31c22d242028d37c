//! Start-or-poll endpoints for report generation and the network tests.
//!
//! Every request first polls the job slot. An idle slot is started and the
//! request answers `204 No Content`; the client re-polls until it gets the
//! terminal `200` or `500`. With `?wait=<secs>` the request is held until the
//! job settles or the (capped) wait elapses.
//!
//! Clients that send an `x-diag-client` id each receive the result once, and
//! every id that polled while the job ran is served before the slot resets.
//! Anonymous requests share a finished result for the configured share
//! window; after that the next anonymous request starts a new run.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use diag_core::jobs::PollOutcome;
use diag_core::types::{JobKind, JobOutput, ReportArtifact};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query params and bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct JobQuery {
    /// Long-poll for up to this many seconds.
    pub wait: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    /// Download a finished bundle instead of starting/polling.
    pub filename: Option<String>,
    pub wait: Option<u64>,
}

/// Body of a finished report generation.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportReady {
    pub file_name: String,
    pub file_size: u64,
    pub md5sum: String,
    /// SHA-256 of the bundle, alongside the MD5 sum.
    pub checksum: String,
}

impl From<ReportArtifact> for ReportReady {
    fn from(artifact: ReportArtifact) -> Self {
        Self {
            file_name: artifact.file_name,
            file_size: artifact.file_size_bytes,
            md5sum: artifact.md5sum,
            checksum: artifact.checksum,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Header carrying an opaque per-client id for result delivery.
pub const CLIENT_HEADER: &str = "x-diag-client";

/// Claim key used for requests without a client id.
const ANONYMOUS_CLIENT: &str = "anonymous";

fn client_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(CLIENT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= 128)
}

/// Poll `kind`, starting it when idle, optionally waiting for it to settle.
async fn start_or_poll(
    state: &AppState,
    kind: JobKind,
    client: Option<&str>,
    wait: Option<u64>,
) -> PollOutcome {
    let jobs = &state.jobs;
    let window = state.config.job_share_window();

    let current = match client {
        Some(client) => match jobs.poll(kind, client) {
            // This client already has the result, others have not claimed it
            // yet. Keep it for them until the share window closes.
            PollOutcome::Idle if is_terminal(&jobs.peek_recent(kind, window)) => {
                return PollOutcome::NotReady;
            }
            outcome => outcome,
        },
        None => jobs.peek_recent(kind, window),
    };
    match current {
        PollOutcome::Idle => {
            let outcome = jobs.start(kind, client.unwrap_or(ANONYMOUS_CLIENT));
            tracing::debug!(job = %kind, ?outcome, client, "Job requested");
        }
        PollOutcome::NotReady => {}
        terminal => return terminal,
    }

    let Some(secs) = wait.filter(|secs| *secs > 0) else {
        return PollOutcome::NotReady;
    };
    let timeout = Duration::from_secs(secs).min(state.config.long_poll_max());
    match client {
        Some(client) => jobs.wait(kind, client, timeout).await,
        None => {
            jobs.wait_settled(kind, timeout).await;
            jobs.peek_recent(kind, window)
        }
    }
}

fn is_terminal(outcome: &PollOutcome) -> bool {
    matches!(outcome, PollOutcome::Ready(_) | PollOutcome::Failed(_))
}

// ---------------------------------------------------------------------------
// GET /debug/report
// ---------------------------------------------------------------------------

/// GET /debug/report
///
/// Start-or-poll report generation, or download a bundle with `?filename=`.
pub async fn report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ReportQuery>,
) -> AppResult<Response> {
    if let Some(file_name) = params.filename {
        return download_report(&state, &file_name).await;
    }

    let client = client_id(&headers);
    match start_or_poll(&state, JobKind::ReportGeneration, client, params.wait)
        .await
        .into_result()?
    {
        JobOutput::Report(artifact) => {
            tracing::info!(file = %artifact.file_name, "Report ready");
            Ok(Json(ReportReady::from(artifact)).into_response())
        }
        JobOutput::Text(_) => Err(AppError::InternalError(
            "report job produced text output".to_string(),
        )),
    }
}

async fn download_report(state: &AppState, file_name: &str) -> AppResult<Response> {
    let bytes = state.reports.read(file_name).await?;
    tracing::debug!(file = %file_name, size = bytes.len(), "Serving report bundle");
    Ok((
        [
            (CONTENT_TYPE, "application/zip".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// GET /debug/ping, /debug/dig, /debug/tracepath
// ---------------------------------------------------------------------------

async fn network_test(
    state: AppState,
    kind: JobKind,
    headers: &HeaderMap,
    wait: Option<u64>,
) -> AppResult<Response> {
    match start_or_poll(&state, kind, client_id(headers), wait)
        .await
        .into_result()?
    {
        JobOutput::Text(output) => Ok((
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            output,
        )
            .into_response()),
        JobOutput::Report(_) => Err(AppError::InternalError(format!(
            "{kind} job produced a report"
        ))),
    }
}

/// GET /debug/ping
pub async fn ping(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<JobQuery>,
) -> AppResult<Response> {
    network_test(state, JobKind::Ping, &headers, params.wait).await
}

/// GET /debug/dig
pub async fn dig(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<JobQuery>,
) -> AppResult<Response> {
    network_test(state, JobKind::DnsLookup, &headers, params.wait).await
}

/// GET /debug/tracepath
pub async fn tracepath(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<JobQuery>,
) -> AppResult<Response> {
    network_test(state, JobKind::TracePath, &headers, params.wait).await
}

// ---------------------------------------------------------------------------
// GET /debug/jobs
// ---------------------------------------------------------------------------

/// GET /debug/jobs
///
/// Snapshot of every job slot. Does not claim any result.
pub async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(DataResponse {
        data: state.jobs.snapshot_all(),
    })
}
