use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use diag_core::report::ReportSources;
use diag_core::types::SettingsRole;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults matching a stock installation; override via
/// environment variables (or a `.env` file).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address for both listeners (default: `0.0.0.0`).
    pub host: String,
    /// Debug HTTP port (default: `3000`).
    pub port: u16,
    /// Dedicated live-log WebSocket port (default: `2626`).
    pub live_log_port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `60`).
    pub request_timeout_secs: u64,
    /// Host the network tests target (default: `nymea.io`).
    pub diag_target_host: String,
    /// Upper bound for a single external tool run (default: `30`).
    pub tool_timeout_secs: u64,
    /// Where report bundles are written.
    pub report_dir: PathBuf,
    /// Reports older than this are deleted by the cleanup task (default: `1800`).
    pub report_retention_secs: u64,
    /// Unclaimed job results are discarded after this (default: `300`).
    pub job_result_ttl_secs: u64,
    /// How long a finished result stays visible to callers without a
    /// client id, and protected from being superseded (default: `10`).
    pub job_share_window_secs: u64,
    /// Cap for `?wait=` long-polls (default: `25`).
    pub long_poll_max_secs: u64,
    /// Per-viewer live log queue size (default: `1024`).
    pub log_queue_capacity: usize,
    pub settings_dir: PathBuf,
    pub log_dir: PathBuf,
    pub syslog_path: PathBuf,
    pub log_db_path: PathBuf,
    pub server_name: String,
    /// Extra logging categories contributed by plugins.
    pub plugin_logging_categories: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                  |
    /// |-----------------------------|--------------------------|
    /// | `HOST`                      | `0.0.0.0`                |
    /// | `PORT`                      | `3000`                   |
    /// | `LIVE_LOG_PORT`             | `2626`                   |
    /// | `CORS_ORIGINS`              | `http://localhost:5173`  |
    /// | `REQUEST_TIMEOUT_SECS`      | `60`                     |
    /// | `DIAG_TARGET_HOST`          | `nymea.io`               |
    /// | `TOOL_TIMEOUT_SECS`         | `30`                     |
    /// | `REPORT_DIR`                | `<tmp>/diag-reports`     |
    /// | `REPORT_RETENTION_SECS`     | `1800`                   |
    /// | `JOB_RESULT_TTL_SECS`       | `300`                    |
    /// | `JOB_SHARE_WINDOW_SECS`     | `10`                     |
    /// | `LONG_POLL_MAX_SECS`        | `25`                     |
    /// | `LOG_QUEUE_CAPACITY`        | `1024`                   |
    /// | `SETTINGS_DIR`              | `/etc/nymea`             |
    /// | `LOG_DIR`                   | `/var/log`               |
    /// | `SYSLOG_PATH`               | `/var/log/syslog`        |
    /// | `LOG_DB_PATH`               | `/var/log/nymead.sqlite` |
    /// | `SERVER_NAME`               | `nymea`                  |
    /// | `PLUGIN_LOGGING_CATEGORIES` | empty                    |
    ///
    /// Panics on malformed numeric values; misconfiguration should fail fast.
    pub fn from_env() -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: parse_env("PORT", 3000),
            live_log_port: parse_env("LIVE_LOG_PORT", 2626),
            cors_origins: split_list(&env_or("CORS_ORIGINS", "http://localhost:5173")),
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 60),
            diag_target_host: env_or("DIAG_TARGET_HOST", "nymea.io"),
            tool_timeout_secs: parse_env("TOOL_TIMEOUT_SECS", 30),
            report_dir: std::env::var("REPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("diag-reports")),
            report_retention_secs: parse_env("REPORT_RETENTION_SECS", 1800),
            job_result_ttl_secs: parse_env("JOB_RESULT_TTL_SECS", 300),
            job_share_window_secs: parse_env("JOB_SHARE_WINDOW_SECS", 10),
            long_poll_max_secs: parse_env("LONG_POLL_MAX_SECS", 25),
            log_queue_capacity: parse_env("LOG_QUEUE_CAPACITY", 1024),
            settings_dir: env_or("SETTINGS_DIR", "/etc/nymea").into(),
            log_dir: env_or("LOG_DIR", "/var/log").into(),
            syslog_path: env_or("SYSLOG_PATH", "/var/log/syslog").into(),
            log_db_path: env_or("LOG_DB_PATH", "/var/log/nymead.sqlite").into(),
            server_name: env_or("SERVER_NAME", "nymea"),
            plugin_logging_categories: split_list(
                &std::env::var("PLUGIN_LOGGING_CATEGORIES").unwrap_or_default(),
            ),
        }
    }

    pub fn settings_path(&self, role: SettingsRole) -> PathBuf {
        self.settings_dir.join(role.file_name())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn long_poll_max(&self) -> Duration {
        Duration::from_secs(self.long_poll_max_secs)
    }

    pub fn job_share_window(&self) -> Duration {
        Duration::from_secs(self.job_share_window_secs)
    }

    /// Inputs collected into report bundles.
    pub fn report_sources(&self) -> ReportSources {
        let mut config_files: Vec<PathBuf> = SettingsRole::ALL
            .into_iter()
            .map(|role| self.settings_path(role))
            .collect();
        config_files.push(self.log_db_path.clone());
        ReportSources {
            config_files,
            log_dir: self.log_dir.clone(),
            log_prefixes: vec!["syslog".to_string(), "nymea".to_string()],
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid number: {e}")),
        Err(_) => default,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
