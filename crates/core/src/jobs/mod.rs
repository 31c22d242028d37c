//! Single-flight registry for long-running diagnostic jobs.
//!
//! Every [`JobKind`] owns one slot guarded by its own mutex. A slot moves
//! `Idle -> Running -> {Succeeded, Failed} -> Idle`:
//!
//! - [`JobRegistry::start`] launches the executor on a spawned task when the
//!   slot is not running, or joins the running job otherwise.
//! - [`JobRegistry::poll`] never waits. Polling a running job registers the
//!   client as interested. A terminal outcome is handed out once per client;
//!   after the last interested client has claimed it the slot is `Idle`.
//! - [`JobRegistry::wait`] is the long-poll variant: it parks on the slot's
//!   watch channel until the job settles or the timeout elapses.
//! - [`JobRegistry::peek_recent`] reads a fresh terminal outcome without
//!   claiming it, for callers that cannot identify themselves.
//!
//! Clients are identified by an opaque string. Completion is written by the
//! executing task; pollers only read.

mod executor;

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::CoreError;
use crate::types::{DiagnosticJob, JobKind, JobOutput, JobState, Timestamp};

pub use executor::DiagnosticsExecutor;

/// Runs the collaborator behind a job kind (tool runner or report builder).
#[async_trait]
pub trait JobExecutor: Send + Sync + 'static {
    async fn execute(&self, kind: JobKind) -> Result<JobOutput, CoreError>;
}

/// Result of [`JobRegistry::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    /// A new execution was launched.
    Accepted,
    /// An execution of the same kind is already in flight; keep polling.
    AlreadyRunning,
}

/// Result of [`JobRegistry::poll`] and [`JobRegistry::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing started and nothing to report.
    Idle,
    /// The job is still running.
    NotReady,
    Ready(JobOutput),
    Failed(String),
}

impl PollOutcome {
    /// Terminal output, or the error a caller should surface.
    ///
    /// `Idle` and `NotReady` both map to [`CoreError::NotReadyYet`].
    pub fn into_result(self) -> Result<JobOutput, CoreError> {
        match self {
            PollOutcome::Ready(output) => Ok(output),
            PollOutcome::Failed(message) => Err(CoreError::OperationFailed(message)),
            PollOutcome::Idle | PollOutcome::NotReady => Err(CoreError::NotReadyYet),
        }
    }
}

#[derive(Debug, Clone)]
enum SlotState {
    Idle,
    Running,
    Succeeded(JobOutput),
    Failed(String),
}

impl SlotState {
    fn job_state(&self) -> JobState {
        match self {
            SlotState::Idle => JobState::Idle,
            SlotState::Running => JobState::Running,
            SlotState::Succeeded(_) => JobState::Succeeded,
            SlotState::Failed(_) => JobState::Failed,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, SlotState::Succeeded(_) | SlotState::Failed(_))
    }
}

#[derive(Debug)]
struct JobSlot {
    state: SlotState,
    generation: u64,
    /// Clients that still have to claim the terminal outcome.
    interested: HashSet<String>,
    /// Clients that already claimed the current outcome.
    delivered: HashSet<String>,
    started_at: Option<Timestamp>,
    finished_at: Option<Timestamp>,
    finished_instant: Option<Instant>,
}

impl JobSlot {
    fn new() -> Self {
        Self {
            state: SlotState::Idle,
            generation: 0,
            interested: HashSet::new(),
            delivered: HashSet::new(),
            started_at: None,
            finished_at: None,
            finished_instant: None,
        }
    }

    fn reset(&mut self) {
        self.state = SlotState::Idle;
        self.interested.clear();
        self.delivered.clear();
        self.started_at = None;
        self.finished_at = None;
        self.finished_instant = None;
    }

    /// Record that `client` received the terminal outcome.
    fn claim(&mut self, client: &str) {
        self.interested.remove(client);
        if self.interested.is_empty() {
            self.reset();
        } else {
            self.delivered.insert(client.to_string());
        }
    }
}

struct JobEntry {
    slot: Mutex<JobSlot>,
    /// Carries the generation of the last settled run.
    settled: watch::Sender<u64>,
}

impl JobEntry {
    fn lock(&self) -> MutexGuard<'_, JobSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tracks at most one in-flight instance of each [`JobKind`].
pub struct JobRegistry {
    executor: Arc<dyn JobExecutor>,
    entries: HashMap<JobKind, Arc<JobEntry>>,
}

impl JobRegistry {
    pub fn new(executor: Arc<dyn JobExecutor>) -> Self {
        let entries = JobKind::ALL
            .into_iter()
            .map(|kind| {
                let (settled, _) = watch::channel(0);
                let entry = JobEntry {
                    slot: Mutex::new(JobSlot::new()),
                    settled,
                };
                (kind, Arc::new(entry))
            })
            .collect();
        Self { executor, entries }
    }

    fn entry(&self, kind: JobKind) -> &Arc<JobEntry> {
        &self.entries[&kind]
    }

    /// Start `kind` for `client` unless it is already running, in which case
    /// `client` joins the running job.
    ///
    /// An unclaimed terminal outcome from a previous run is discarded.
    pub fn start(&self, kind: JobKind, client: &str) -> StartOutcome {
        let entry = Arc::clone(self.entry(kind));
        let generation = {
            let mut slot = entry.lock();
            match slot.state {
                SlotState::Running => {
                    slot.interested.insert(client.to_string());
                    tracing::debug!(job = %kind, waiters = slot.interested.len(), "Job already running");
                    return StartOutcome::AlreadyRunning;
                }
                SlotState::Succeeded(_) | SlotState::Failed(_) => {
                    tracing::debug!(job = %kind, "Discarding unclaimed result of previous run");
                }
                SlotState::Idle => {}
            }
            slot.reset();
            slot.generation += 1;
            slot.state = SlotState::Running;
            slot.interested.insert(client.to_string());
            slot.started_at = Some(chrono::Utc::now());
            slot.generation
        };

        tracing::info!(job = %kind, generation, "Job started");

        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            let result = AssertUnwindSafe(executor.execute(kind))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(CoreError::OperationFailed(format!("{kind} job panicked")))
                });
            complete(&entry, kind, generation, result);
        });

        StartOutcome::Accepted
    }

    /// Read the slot for `client` without waiting.
    ///
    /// A running job registers `client` as interested. A terminal outcome is
    /// claimed; a client that already claimed it sees [`PollOutcome::Idle`].
    pub fn poll(&self, kind: JobKind, client: &str) -> PollOutcome {
        let mut slot = self.entry(kind).lock();
        let terminal = match &slot.state {
            SlotState::Idle => return PollOutcome::Idle,
            SlotState::Running => None,
            SlotState::Succeeded(output) => Some(PollOutcome::Ready(output.clone())),
            SlotState::Failed(error) => Some(PollOutcome::Failed(error.clone())),
        };
        let Some(outcome) = terminal else {
            slot.interested.insert(client.to_string());
            return PollOutcome::NotReady;
        };
        if slot.delivered.contains(client) {
            return PollOutcome::Idle;
        }
        slot.claim(client);
        tracing::debug!(job = %kind, client, remaining = slot.interested.len(), "Job result delivered");
        outcome
    }

    /// Long-poll: wait up to `timeout` for the job to settle, then poll.
    ///
    /// Returns [`PollOutcome::NotReady`] if the job is still running when the
    /// timeout elapses.
    pub async fn wait(&self, kind: JobKind, client: &str, timeout: Duration) -> PollOutcome {
        self.wait_settled(kind, timeout).await;
        self.poll(kind, client)
    }

    /// Read the slot without claiming anything.
    ///
    /// A terminal outcome is returned only while it is younger than
    /// `max_age`; an older one reads as [`PollOutcome::Idle`].
    pub fn peek_recent(&self, kind: JobKind, max_age: Duration) -> PollOutcome {
        let slot = self.entry(kind).lock();
        let fresh = slot.finished_instant.is_some_and(|at| at.elapsed() < max_age);
        match &slot.state {
            SlotState::Idle => PollOutcome::Idle,
            SlotState::Running => PollOutcome::NotReady,
            _ if !fresh => PollOutcome::Idle,
            SlotState::Succeeded(output) => PollOutcome::Ready(output.clone()),
            SlotState::Failed(error) => PollOutcome::Failed(error.clone()),
        }
    }

    /// Wait until the slot is no longer running, without claiming anything.
    pub async fn wait_settled(&self, kind: JobKind, timeout: Duration) -> JobState {
        let entry = self.entry(kind);
        let mut settled = entry.settled.subscribe();
        let deadline = Instant::now() + timeout;
        loop {
            let state = entry.lock().state.job_state();
            if state != JobState::Running {
                return state;
            }
            match tokio::time::timeout_at(deadline, settled.changed()).await {
                Ok(Ok(())) => continue,
                _ => return entry.lock().state.job_state(),
            }
        }
    }

    pub fn state(&self, kind: JobKind) -> JobState {
        self.entry(kind).lock().state.job_state()
    }

    /// Point-in-time view of one slot. Does not claim.
    pub fn snapshot(&self, kind: JobKind) -> DiagnosticJob {
        let slot = self.entry(kind).lock();
        let (output, error) = match &slot.state {
            SlotState::Succeeded(output) => (Some(output.clone()), None),
            SlotState::Failed(error) => (None, Some(error.clone())),
            _ => (None, None),
        };
        DiagnosticJob {
            name: kind,
            state: slot.state.job_state(),
            started_at: slot.started_at,
            finished_at: slot.finished_at,
            output,
            error,
        }
    }

    pub fn snapshot_all(&self) -> Vec<DiagnosticJob> {
        JobKind::ALL.into_iter().map(|kind| self.snapshot(kind)).collect()
    }

    /// Reset terminal slots whose outcome has waited longer than `ttl`.
    pub fn purge_expired(&self, ttl: Duration) -> usize {
        let mut purged = 0;
        for (kind, entry) in &self.entries {
            let mut slot = entry.lock();
            let expired = slot.state.is_terminal()
                && slot.finished_instant.is_some_and(|at| at.elapsed() >= ttl);
            if expired {
                tracing::debug!(job = %kind, "Expired unclaimed job result");
                slot.reset();
                purged += 1;
            }
        }
        purged
    }
}

/// Record the outcome of a run and wake long-pollers.
fn complete(
    entry: &JobEntry,
    kind: JobKind,
    generation: u64,
    result: Result<JobOutput, CoreError>,
) {
    {
        let mut slot = entry.lock();
        if slot.generation != generation || !matches!(slot.state, SlotState::Running) {
            tracing::warn!(job = %kind, generation, "Dropping result of a stale job run");
            return;
        }
        slot.state = match result {
            Ok(output) => {
                tracing::info!(job = %kind, generation, "Job succeeded");
                SlotState::Succeeded(output)
            }
            Err(err) => {
                let message = match err {
                    CoreError::OperationFailed(message) => message,
                    other => other.to_string(),
                };
                tracing::warn!(job = %kind, generation, error = %message, "Job failed");
                SlotState::Failed(message)
            }
        };
        slot.finished_at = Some(chrono::Utc::now());
        slot.finished_instant = Some(Instant::now());
    }
    entry.settled.send_replace(generation);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
