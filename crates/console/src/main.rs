//! `diag-console` -- command-line debug console.
//!
//! Runs one diagnostic job against a debug server and prints the result, or
//! streams the live log until interrupted.
//!
//! ```text
//! diag-console <report|ping|dig|tracepath|logs>
//! ```
//!
//! # Environment variables
//!
//! | Variable              | Default                  | Description                    |
//! |-----------------------|--------------------------|--------------------------------|
//! | `DEBUG_SERVER_URL`    | `http://localhost:3000`  | Debug HTTP server root         |
//! | `LIVE_LOG_URL`        | `ws://localhost:2626/`   | Live-log WebSocket endpoint    |
//! | `POLL_INTERVAL_MS`    | `1000`                   | Delay between job polls        |
//! | `REPORT_OUTPUT_DIR`   | `.`                      | Where downloaded reports go    |

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use diag_console::client::{DebugClient, JobResult};
use diag_console::live_log::LiveLogConnection;
use diag_core::types::JobKind;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "diag_console=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let command = std::env::args().nth(1).unwrap_or_default();
    let server_url =
        std::env::var("DEBUG_SERVER_URL").unwrap_or_else(|_| "http://localhost:3000".into());
    let poll_interval = std::env::var("POLL_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(diag_console::client::DEFAULT_POLL_INTERVAL);

    if command == "logs" {
        let url = std::env::var("LIVE_LOG_URL").unwrap_or_else(|_| "ws://localhost:2626/".into());
        return stream_logs(&url).await;
    }

    let kind: JobKind = match command.parse() {
        Ok(kind) => kind,
        Err(_) => bail!("usage: diag-console <report|ping|dig|tracepath|logs>"),
    };

    let client = DebugClient::new(server_url).with_poll_interval(poll_interval);
    match client.run_job(kind).await? {
        JobResult::Text(output) => print!("{output}"),
        JobResult::Report(report) => {
            let bytes = client.download_report(&report).await?;
            let dir = std::env::var("REPORT_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."));
            let path = dir.join(&report.file_name);
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!("{}  {}", report.md5sum, path.display());
        }
    }
    Ok(())
}

/// Print live log lines until Ctrl-C or until the server closes the stream.
async fn stream_logs(url: &str) -> anyhow::Result<()> {
    let mut connection = LiveLogConnection::new(url);
    let mut lines = connection
        .connect()
        .await
        .with_context(|| format!("connecting to {url}"))?;

    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(line) => print!("{line}"),
                None => {
                    tracing::info!("Live log stream ended");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                connection.disconnect().await;
                break;
            }
        }
    }
    Ok(())
}
