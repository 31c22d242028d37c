//! External tool runner for network diagnostics.
//!
//! [`ToolRunner`] spawns one OS utility (ping, dig, tracepath) against the
//! configured target host, captures its output and enforces a timeout.
//! There are no retries: every call to [`ToolRunner::run`] is a single
//! attempt. Single-flight per kind is enforced by the job registry, not
//! here.

use std::collections::HashMap;
use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::types::JobKind;

/// Maximum stdout or stderr size captured per stream (1 MiB).
const MAX_OUTPUT_BYTES: u64 = 1024 * 1024;

/// Number of echo requests sent by the ping test.
pub const PING_ATTEMPTS: u32 = 4;

/// Network tests the runner knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Ping,
    DnsLookup,
    TracePath,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [ToolKind::Ping, ToolKind::DnsLookup, ToolKind::TracePath];

    /// File name used for this tool's output inside a report bundle.
    pub fn report_file_name(self) -> &'static str {
        match self {
            ToolKind::Ping => "ping.txt",
            ToolKind::DnsLookup => "dns-lookup.txt",
            ToolKind::TracePath => "tracepath.txt",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(JobKind::from(*self).slug())
    }
}

impl From<ToolKind> for JobKind {
    fn from(kind: ToolKind) -> Self {
        match kind {
            ToolKind::Ping => JobKind::Ping,
            ToolKind::DnsLookup => JobKind::DnsLookup,
            ToolKind::TracePath => JobKind::TracePath,
        }
    }
}

impl TryFrom<JobKind> for ToolKind {
    type Error = JobKind;

    fn try_from(kind: JobKind) -> Result<Self, Self::Error> {
        match kind {
            JobKind::Ping => Ok(ToolKind::Ping),
            JobKind::DnsLookup => Ok(ToolKind::DnsLookup),
            JobKind::TracePath => Ok(ToolKind::TracePath),
            other => Err(other),
        }
    }
}

/// Program and arguments for one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a tool that ran to completion.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    /// Stdout followed by stderr.
    pub output: String,
    /// `true` when the process exited with status 0.
    pub ok: bool,
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    pub duration_ms: u64,
}

/// Errors that prevent a tool from producing an exit status.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {elapsed_ms}ms")]
    Timeout { program: String, elapsed_ms: u64 },

    #[error("I/O error while waiting for '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs the diagnostic utilities with a per-invocation timeout.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    commands: HashMap<ToolKind, ToolCommand>,
    timeout: Duration,
}

impl ToolRunner {
    /// Build a runner with the standard command table aimed at `target_host`.
    pub fn new(target_host: &str, timeout: Duration) -> Self {
        let attempts = PING_ATTEMPTS.to_string();
        let commands = HashMap::from([
            (
                ToolKind::Ping,
                ToolCommand::new("ping", &["-c", attempts.as_str(), target_host]),
            ),
            (ToolKind::DnsLookup, ToolCommand::new("dig", &[target_host])),
            (
                ToolKind::TracePath,
                ToolCommand::new("tracepath", &[target_host]),
            ),
        ]);
        Self { commands, timeout }
    }

    /// Replace the command used for `kind`.
    pub fn with_command(mut self, kind: ToolKind, command: ToolCommand) -> Self {
        self.commands.insert(kind, command);
        self
    }

    pub fn command(&self, kind: ToolKind) -> &ToolCommand {
        &self.commands[&kind]
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute the tool for `kind` once and capture its output.
    pub async fn run(&self, kind: ToolKind) -> Result<ToolOutput, ToolError> {
        let command = self.command(kind);
        tracing::debug!(tool = %kind, command = %command, "Starting diagnostic tool");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| ToolError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();
        let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
        let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

        // On timeout `child` is dropped and killed via `kill_on_drop`.
        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => {
                return Err(ToolError::Io {
                    program: command.program.clone(),
                    source,
                })
            }
            Err(_elapsed) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                tracing::warn!(tool = %kind, elapsed_ms, "Diagnostic tool timed out");
                return Err(ToolError::Timeout {
                    program: command.program.clone(),
                    elapsed_ms,
                });
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let mut output = String::from_utf8_lossy(&stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&stderr));

        let result = ToolOutput {
            output,
            ok: status.success(),
            exit_code: status.code().unwrap_or(-1),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        tracing::debug!(
            tool = %kind,
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            "Diagnostic tool finished"
        );
        Ok(result)
    }
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h).take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
