use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

/// The long-running diagnostic operations tracked by the job registry.
///
/// At most one instance of each kind may be running at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    ReportGeneration,
    Ping,
    DnsLookup,
    TracePath,
}

impl JobKind {
    /// Every job kind, in a stable order.
    pub const ALL: [JobKind; 4] = [
        JobKind::ReportGeneration,
        JobKind::Ping,
        JobKind::DnsLookup,
        JobKind::TracePath,
    ];

    /// URL slug used by the HTTP surface (`/debug/<slug>`).
    pub fn slug(self) -> &'static str {
        match self {
            JobKind::ReportGeneration => "report",
            JobKind::Ping => "ping",
            JobKind::DnsLookup => "dig",
            JobKind::TracePath => "tracepath",
        }
    }

    /// Whether this kind is a network test executed by the tool runner.
    pub fn is_network_test(self) -> bool {
        !matches!(self, JobKind::ReportGeneration)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for JobKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|kind| kind.slug() == s)
            .ok_or_else(|| CoreError::BadRequest(format!("unknown job '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Job state and outputs
// ---------------------------------------------------------------------------

/// Lifecycle state of a job slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Metadata of a generated report bundle.
///
/// The payload itself is fetched by a separate download request carrying
/// `file_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportArtifact {
    pub file_name: String,
    pub file_size_bytes: u64,
    /// Lowercase hex MD5 of the bundle bytes.
    pub md5sum: String,
    /// Lowercase hex SHA-256 of the bundle bytes.
    pub checksum: String,
    pub created_at: Timestamp,
}

/// Terminal output of a successful job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum JobOutput {
    /// Captured output of a network test tool.
    Text(String),
    /// Metadata of a generated report.
    Report(ReportArtifact),
}

/// Point-in-time view of one job slot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticJob {
    pub name: JobKind,
    pub state: JobState,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub output: Option<JobOutput>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// SettingsRole
// ---------------------------------------------------------------------------

/// Settings files the debug interface can hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingsRole {
    Nymead,
    Devices,
    DeviceStates,
    Rules,
    Plugins,
    Tags,
}

impl SettingsRole {
    pub const ALL: [SettingsRole; 6] = [
        SettingsRole::Nymead,
        SettingsRole::Devices,
        SettingsRole::DeviceStates,
        SettingsRole::Rules,
        SettingsRole::Plugins,
        SettingsRole::Tags,
    ];

    /// Path segment used in `/debug/settings/{role}`.
    pub fn slug(self) -> &'static str {
        match self {
            SettingsRole::Nymead => "nymead",
            SettingsRole::Devices => "devices",
            SettingsRole::DeviceStates => "devicestates",
            SettingsRole::Rules => "rules",
            SettingsRole::Plugins => "plugins",
            SettingsRole::Tags => "tags",
        }
    }

    /// File name inside the settings directory.
    pub fn file_name(self) -> &'static str {
        match self {
            SettingsRole::Nymead => "nymead.conf",
            SettingsRole::Devices => "devices.conf",
            SettingsRole::DeviceStates => "devicestates.conf",
            SettingsRole::Rules => "rules.conf",
            SettingsRole::Plugins => "plugins.conf",
            SettingsRole::Tags => "tags.conf",
        }
    }
}

impl FromStr for SettingsRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingsRole::ALL
            .into_iter()
            .find(|role| role.slug() == s)
            .ok_or_else(|| CoreError::ResourceNotFound(format!("settings '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_round_trip_through_from_str() {
        for kind in JobKind::ALL {
            assert_eq!(kind.slug().parse::<JobKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_slug_is_rejected() {
        assert!(matches!(
            "traceroute".parse::<JobKind>(),
            Err(CoreError::BadRequest(_))
        ));
    }

    #[test]
    fn only_report_is_not_a_network_test() {
        assert!(!JobKind::ReportGeneration.is_network_test());
        assert!(JobKind::Ping.is_network_test());
        assert!(JobKind::DnsLookup.is_network_test());
        assert!(JobKind::TracePath.is_network_test());
    }

    #[test]
    fn artifact_serializes_camel_case() {
        let artifact = ReportArtifact {
            file_name: "202601010000-debug-report.zip".to_string(),
            file_size_bytes: 42,
            md5sum: "def".to_string(),
            checksum: "abc".to_string(),
            created_at: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["fileName"], "202601010000-debug-report.zip");
        assert_eq!(json["fileSizeBytes"], 42);
        assert_eq!(json["md5sum"], "def");
        assert_eq!(json["checksum"], "abc");
    }

    #[test]
    fn settings_roles_map_to_conf_files() {
        let role: SettingsRole = "devicestates".parse().unwrap();
        assert_eq!(role, SettingsRole::DeviceStates);
        assert_eq!(role.file_name(), "devicestates.conf");
        assert!(matches!(
            "passwords".parse::<SettingsRole>(),
            Err(CoreError::ResourceNotFound(_))
        ));
    }
}
