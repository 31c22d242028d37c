//! Debug report bundles.
//!
//! [`ReportBuilder`] collects settings files, log files, the process
//! environment, the server information document and the output of the
//! three network tests into a single zip archive stored by [`ReportStore`].
//! The job result only carries the [`ReportArtifact`] metadata; the bytes
//! are fetched later through [`ReportStore::read`].

use std::fs::OpenOptions;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::CoreError;
use crate::files::read_file;
use crate::hashing::{md5_hex, sha256_hex};
use crate::system_info::ServerIdentity;
use crate::tools::{ToolKind, ToolRunner};
use crate::types::{ReportArtifact, Timestamp};

/// Suffix of every generated report file.
pub const REPORT_SUFFIX: &str = "-debug-report.zip";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("I/O error while building report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write report archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to serialize report content: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Report task aborted: {0}")]
    Aborted(String),
}

// ---------------------------------------------------------------------------
// ReportStore
// ---------------------------------------------------------------------------

/// Directory holding generated report bundles.
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a client-supplied report name to a path inside the store.
    ///
    /// Only bare file names ending in `.zip` are accepted.
    pub fn path_for(&self, file_name: &str) -> Result<PathBuf, CoreError> {
        let valid = !file_name.is_empty()
            && !file_name.contains('/')
            && !file_name.contains('\\')
            && !file_name.contains("..")
            && file_name.ends_with(".zip");
        if !valid {
            return Err(CoreError::BadRequest(format!(
                "invalid report file name '{file_name}'"
            )));
        }
        Ok(self.dir.join(file_name))
    }

    /// Read a previously generated report.
    pub async fn read(&self, file_name: &str) -> Result<Vec<u8>, CoreError> {
        let path = self.path_for(file_name)?;
        read_file(&path, file_name).await
    }

    /// Delete report files whose modification time is at least `max_age` ago.
    ///
    /// Returns the number of files removed. A missing store directory is
    /// treated as empty.
    pub async fn cleanup_older_than(&self, max_age: Duration) -> std::io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if !name.to_string_lossy().ends_with(REPORT_SUFFIX) {
                continue;
            }
            let modified = entry.metadata().await?.modified()?;
            let age = modified.elapsed().unwrap_or_default();
            if age >= max_age {
                tokio::fs::remove_file(entry.path()).await?;
                tracing::debug!(file = %entry.path().display(), "Removed expired report");
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// ReportBuilder
// ---------------------------------------------------------------------------

/// Files collected into a report.
#[derive(Debug, Clone, Default)]
pub struct ReportSources {
    /// Settings and database files copied under `config/`.
    pub config_files: Vec<PathBuf>,
    /// Directory scanned for log files copied under `logs/`.
    pub log_dir: PathBuf,
    /// A log file is included when its name starts with one of these.
    pub log_prefixes: Vec<String>,
}

/// Assembles report bundles into a [`ReportStore`].
pub struct ReportBuilder {
    store: ReportStore,
    sources: ReportSources,
    tools: Arc<ToolRunner>,
    identity: ServerIdentity,
}

impl ReportBuilder {
    pub fn new(
        store: ReportStore,
        sources: ReportSources,
        tools: Arc<ToolRunner>,
        identity: ServerIdentity,
    ) -> Self {
        Self {
            store,
            sources,
            tools,
            identity,
        }
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Build a new report and store it.
    pub async fn build(&self) -> Result<ReportArtifact, ReportError> {
        tracing::debug!("Start generating debug report");

        // The network tests run concurrently; failures are recorded in the
        // bundle, not propagated.
        let runs = ToolKind::ALL.map(|kind| {
            let tools = Arc::clone(&self.tools);
            async move {
                let text = match tools.run(kind).await {
                    Ok(out) => out.output,
                    Err(e) => format!("{e}\n"),
                };
                (kind, text)
            }
        });
        let network = futures::future::join_all(runs).await;

        let mut env: Vec<(String, String)> = std::env::vars().collect();
        env.sort();
        let info = serde_json::to_vec_pretty(&self.identity.collect())?;

        let created_at = chrono::Utc::now();
        let file_name = report_file_name(created_at);
        let sources = self.sources.clone();
        let dir = self.store.dir().to_path_buf();
        let path = dir.join(&file_name);

        let bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ReportError> {
            let bytes = write_archive(&sources, &network, &env, &info)?;
            std::fs::create_dir_all(&dir)?;
            // Never replace an advertised bundle.
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)?
                .write_all(&bytes)?;
            Ok(bytes)
        })
        .await
        .map_err(|e| ReportError::Aborted(e.to_string()))??;

        let artifact = ReportArtifact {
            file_name,
            file_size_bytes: bytes.len() as u64,
            md5sum: md5_hex(&bytes),
            checksum: sha256_hex(&bytes),
            created_at,
        };
        tracing::info!(
            file_name = %artifact.file_name,
            size = artifact.file_size_bytes,
            md5sum = %artifact.md5sum,
            "Debug report generated"
        );
        Ok(artifact)
    }
}

/// `<YYYYmmddHHMMSS>-<8 hex>-debug-report.zip`, unique per build.
fn report_file_name(created_at: Timestamp) -> String {
    let tag = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}{REPORT_SUFFIX}",
        created_at.format("%Y%m%d%H%M%S"),
        &tag[..8]
    )
}

fn write_archive(
    sources: &ReportSources,
    network: &[(ToolKind, String)],
    env: &[(String, String)],
    info: &[u8],
) -> Result<Vec<u8>, ReportError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in &sources.config_files {
        add_file(&mut zip, options, path, "config")?;
    }

    for path in log_files(&sources.log_dir, &sources.log_prefixes) {
        add_file(&mut zip, options, &path, "logs")?;
    }

    for (kind, text) in network {
        zip.start_file(format!("network/{}", kind.report_file_name()), options)?;
        zip.write_all(text.as_bytes())?;
    }

    zip.start_file("env.txt", options)?;
    for (key, value) in env {
        writeln!(zip, "{key}={value}")?;
    }

    zip.start_file("system-info.json", options)?;
    zip.write_all(info)?;

    Ok(zip.finish()?.into_inner())
}

/// Copy one file into the archive under `folder/`. Missing files are skipped.
fn add_file(
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    path: &Path,
    folder: &str,
) -> Result<(), ReportError> {
    let Some(name) = path.file_name() else {
        return Ok(());
    };
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "Skipping report file");
            return Ok(());
        }
    };
    zip.start_file(format!("{folder}/{}", name.to_string_lossy()), options)?;
    zip.write_all(&data)?;
    tracing::debug!(file = %path.display(), folder, "Added file to report");
    Ok(())
}

/// Regular files in `dir` whose name starts with one of `prefixes`, sorted.
fn log_files(dir: &Path, prefixes: &[String]) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Could not list log directory");
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            prefixes.iter().any(|p| name.starts_with(p.as_str()))
        })
        .map(|entry| entry.path())
        .collect();
    files.sort();
    files
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::tools::ToolCommand;
    use assert_matches::assert_matches;

    struct Fixture {
        _root: tempfile::TempDir,
        builder: ReportBuilder,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let settings = root.path().join("settings");
        let logs = root.path().join("logs");
        std::fs::create_dir_all(&settings).unwrap();
        std::fs::create_dir_all(&logs).unwrap();

        std::fs::write(settings.join("devices.conf"), "[Devices]\n").unwrap();
        std::fs::write(logs.join("syslog"), "line 1\n").unwrap();
        std::fs::write(logs.join("syslog.1"), "line 0\n").unwrap();
        std::fs::write(logs.join("nymea.log"), "started\n").unwrap();
        std::fs::write(logs.join("kern.log"), "ignored\n").unwrap();

        let tools = ToolRunner::new("example.invalid", Duration::from_secs(5))
            .with_command(ToolKind::Ping, ToolCommand::new("sh", &["-c", "echo pong"]))
            .with_command(ToolKind::DnsLookup, ToolCommand::new("sh", &["-c", "echo dns; exit 1"]))
            .with_command(ToolKind::TracePath, ToolCommand::new("/nonexistent/tracepath", &[]));

        let builder = ReportBuilder::new(
            ReportStore::new(root.path().join("reports")),
            ReportSources {
                config_files: vec![settings.join("devices.conf"), settings.join("missing.conf")],
                log_dir: logs,
                log_prefixes: vec!["syslog".to_string(), "nymea.".to_string()],
            },
            Arc::new(tools),
            ServerIdentity::new("test-server", "0.1.0"),
        );
        Fixture {
            _root: root,
            builder,
        }
    }

    fn entry_names(bytes: &[u8]) -> Vec<String> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    fn entry_text(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut text = String::new();
        file.read_to_string(&mut text).unwrap();
        text
    }

    #[tokio::test]
    async fn build_writes_bundle_with_expected_layout() {
        let fx = fixture();
        let artifact = fx.builder.build().await.unwrap();
        assert!(artifact.file_name.ends_with(REPORT_SUFFIX));

        let bytes = fx.builder.store().read(&artifact.file_name).await.unwrap();
        assert_eq!(
            entry_names(&bytes),
            vec![
                "config/devices.conf",
                "env.txt",
                "logs/nymea.log",
                "logs/syslog",
                "logs/syslog.1",
                "network/dns-lookup.txt",
                "network/ping.txt",
                "network/tracepath.txt",
                "system-info.json",
            ]
        );
        assert_eq!(entry_text(&bytes, "network/ping.txt"), "pong\n");
        assert_eq!(entry_text(&bytes, "network/dns-lookup.txt"), "dns\n");
        assert!(entry_text(&bytes, "network/tracepath.txt").contains("Failed to start"));

        let info: serde_json::Value =
            serde_json::from_str(&entry_text(&bytes, "system-info.json")).unwrap();
        assert_eq!(info["serverName"], "test-server");
    }

    #[tokio::test]
    async fn checksum_matches_stored_bytes() {
        let fx = fixture();
        let artifact = fx.builder.build().await.unwrap();
        let bytes = fx.builder.store().read(&artifact.file_name).await.unwrap();
        assert_eq!(artifact.file_size_bytes, bytes.len() as u64);
        assert_eq!(artifact.md5sum, md5_hex(&bytes));
        assert_eq!(artifact.checksum, sha256_hex(&bytes));
    }

    #[tokio::test]
    async fn back_to_back_builds_keep_both_bundles() {
        let fx = fixture();
        let first = fx.builder.build().await.unwrap();
        let second = fx.builder.build().await.unwrap();
        assert_ne!(first.file_name, second.file_name);

        for artifact in [&first, &second] {
            let bytes = fx.builder.store().read(&artifact.file_name).await.unwrap();
            assert_eq!(artifact.file_size_bytes, bytes.len() as u64);
            assert_eq!(artifact.md5sum, md5_hex(&bytes));
            assert_eq!(artifact.checksum, sha256_hex(&bytes));
        }
    }

    #[test]
    fn file_names_are_unique_within_one_second() {
        let now = chrono::Utc::now();
        let a = report_file_name(now);
        let b = report_file_name(now);
        assert_ne!(a, b);
        assert!(a.starts_with(&now.format("%Y%m%d%H%M%S").to_string()));
        assert!(a.ends_with(REPORT_SUFFIX));
    }

    #[tokio::test]
    async fn read_rejects_traversal_and_reports_missing() {
        let fx = fixture();
        let store = fx.builder.store();
        assert_matches!(store.read("../etc/passwd.zip").await, Err(CoreError::BadRequest(_)));
        assert_matches!(store.read("report.tar.gz").await, Err(CoreError::BadRequest(_)));
        assert_matches!(
            store.read("197001010000-debug-report.zip").await,
            Err(CoreError::ResourceNotFound(_))
        );
    }

    #[tokio::test]
    async fn cleanup_removes_expired_reports_only() {
        let fx = fixture();
        let artifact = fx.builder.build().await.unwrap();
        let store = fx.builder.store();
        std::fs::write(store.dir().join("notes.txt"), "keep").unwrap();

        assert_eq!(store.cleanup_older_than(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(store.cleanup_older_than(Duration::ZERO).await.unwrap(), 1);
        assert_matches!(
            store.read(&artifact.file_name).await,
            Err(CoreError::ResourceNotFound(_))
        );
        assert!(store.dir().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn cleanup_of_missing_directory_is_noop() {
        let store = ReportStore::new("/nonexistent/diag-reports");
        assert_eq!(store.cleanup_older_than(Duration::ZERO).await.unwrap(), 0);
    }
}
