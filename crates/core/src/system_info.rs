//! Server information document shown by the debug interface and embedded in
//! every report bundle.

use serde::Serialize;

use crate::types::Timestamp;

/// Snap packaging details, present only when running inside a snap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapInfo {
    pub name: String,
    pub version: String,
    pub directory: String,
    pub app_data: String,
    pub user_data: String,
    pub common_data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub user: String,
    pub command: String,
    pub server_name: String,
    pub server_version: String,
    pub hostname: String,
    pub time_zone: String,
    pub started_at: Timestamp,
    pub uptime_secs: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snap: Option<SnapInfo>,
}

impl ServerInfo {
    /// Collect server information from the live process environment.
    pub fn collect(server_name: &str, server_version: &str, started_at: Timestamp) -> Self {
        let command = std::env::args().collect::<Vec<_>>().join(" ");
        Self::from_lookup(
            |key| std::env::var(key).ok(),
            command,
            server_name,
            server_version,
            started_at,
        )
    }

    /// Build server information from an arbitrary environment lookup.
    pub fn from_lookup<F>(
        lookup: F,
        command: String,
        server_name: &str,
        server_version: &str,
        started_at: Timestamp,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).unwrap_or_default();

        let snap = lookup("SNAP").filter(|s| !s.is_empty()).map(|directory| SnapInfo {
            name: var("SNAP_NAME"),
            version: var("SNAP_VERSION"),
            directory,
            app_data: var("SNAP_DATA"),
            user_data: var("SNAP_USER_DATA"),
            common_data: var("SNAP_COMMON"),
        });

        let hostname = lookup("HOSTNAME")
            .or_else(|| read_trimmed("/etc/hostname"))
            .unwrap_or_else(|| "unknown".to_string());

        let time_zone = lookup("TZ")
            .or_else(|| read_trimmed("/etc/timezone"))
            .unwrap_or_else(|| "UTC".to_string());

        let uptime_secs = (chrono::Utc::now() - started_at).num_seconds().max(0);

        Self {
            user: var("USER"),
            command,
            server_name: server_name.to_string(),
            server_version: server_version.to_string(),
            hostname,
            time_zone,
            started_at,
            uptime_secs,
            snap,
        }
    }
}

/// Static identity of the running server, fixed at startup.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub name: String,
    pub version: String,
    pub started_at: Timestamp,
}

impl ServerIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            started_at: chrono::Utc::now(),
        }
    }

    pub fn collect(&self) -> ServerInfo {
        ServerInfo::collect(&self.name, &self.version, self.started_at)
    }
}

fn read_trimmed(path: &str) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn snap_block_absent_outside_snap() {
        let info = ServerInfo::from_lookup(
            lookup_from(&[("USER", "nymea"), ("HOSTNAME", "box"), ("TZ", "Europe/Vienna")]),
            "diag-api".to_string(),
            "living-room",
            "0.1.0",
            chrono::Utc::now(),
        );
        assert!(info.snap.is_none());
        assert_eq!(info.user, "nymea");
        assert_eq!(info.hostname, "box");
        assert_eq!(info.time_zone, "Europe/Vienna");

        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("snap").is_none());
        assert_eq!(json["serverName"], "living-room");
    }

    #[test]
    fn snap_block_present_inside_snap() {
        let info = ServerInfo::from_lookup(
            lookup_from(&[
                ("SNAP", "/snap/nymea/12"),
                ("SNAP_NAME", "nymea"),
                ("SNAP_VERSION", "1.2"),
                ("HOSTNAME", "box"),
            ]),
            String::new(),
            "srv",
            "0.1.0",
            chrono::Utc::now(),
        );
        let snap = info.snap.expect("snap info expected");
        assert_eq!(snap.directory, "/snap/nymea/12");
        assert_eq!(snap.name, "nymea");
        assert_eq!(snap.version, "1.2");
        assert_eq!(snap.common_data, "");
    }

    #[test]
    fn uptime_is_never_negative() {
        let future = chrono::Utc::now() + chrono::Duration::hours(1);
        let info = ServerInfo::from_lookup(
            lookup_from(&[("HOSTNAME", "box")]),
            String::new(),
            "srv",
            "0.1.0",
            future,
        );
        assert_eq!(info.uptime_secs, 0);
    }
}
