//! Per-category logging verbosity.
//!
//! Each category carries three independent sub-level flags (debug, info,
//! warning). The effective [`LoggingLevel`] is the most verbose enabled
//! flag, or [`LoggingLevel::Off`] when none is set.
//!
//! Categories can be changed either by level (`set_level`) or by a filter
//! token using the daemon's command-line grammar:
//!
//! | Token                  | Effect                          |
//! |------------------------|---------------------------------|
//! | `<Category>`           | enable debug                    |
//! | `No<Category>`         | disable every sub-level         |
//! | `<Category>Warnings`   | enable the warning sub-level    |
//! | `<Category>Info`       | enable the info sub-level       |

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Built-in categories and the `tracing` target each one controls.
pub const SYSTEM_CATEGORIES: &[(&str, &str)] = &[
    ("Application", "diag_api"),
    ("WebServer", "tower_http"),
    ("DebugServer", "diag_api::handlers"),
    ("LiveLog", "diag_api::ws"),
    ("JobRegistry", "diag_core::jobs"),
    ("ToolRunner", "diag_core::tools"),
    ("ReportBuilder", "diag_core::report"),
    ("LogHub", "diag_events"),
    ("DeviceManager", "DeviceManager"),
    ("RuleEngine", "RuleEngine"),
];

const DISABLE_PREFIX: &str = "No";
const WARNINGS_SUFFIX: &str = "Warnings";
const INFO_SUFFIX: &str = "Info";

/// Effective verbosity of a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Debug,
    Info,
    Warning,
    Off,
}

impl LoggingLevel {
    /// `EnvFilter` level name.
    pub fn directive(self) -> &'static str {
        match self {
            LoggingLevel::Debug => "debug",
            LoggingLevel::Info => "info",
            LoggingLevel::Warning => "warn",
            LoggingLevel::Off => "off",
        }
    }
}

impl fmt::Display for LoggingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoggingLevel::Debug => "debug",
            LoggingLevel::Info => "info",
            LoggingLevel::Warning => "warning",
            LoggingLevel::Off => "off",
        };
        f.write_str(name)
    }
}

impl FromStr for LoggingLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LoggingLevel::Debug),
            "info" => Ok(LoggingLevel::Info),
            "warning" | "warnings" | "warn" => Ok(LoggingLevel::Warning),
            "off" | "none" => Ok(LoggingLevel::Off),
            _ => Err(CoreError::InvalidLevel(s.to_string())),
        }
    }
}

/// Whether a category belongs to the server itself or to a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    System,
    Plugin,
}

/// Sub-level switches of one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryFlags {
    pub debug: bool,
    pub info: bool,
    pub warning: bool,
}

impl Default for CategoryFlags {
    /// Warnings on, everything else off.
    fn default() -> Self {
        Self {
            debug: false,
            info: false,
            warning: true,
        }
    }
}

impl CategoryFlags {
    pub fn level(&self) -> LoggingLevel {
        if self.debug {
            LoggingLevel::Debug
        } else if self.info {
            LoggingLevel::Info
        } else if self.warning {
            LoggingLevel::Warning
        } else {
            LoggingLevel::Off
        }
    }

    pub fn from_level(level: LoggingLevel) -> Self {
        match level {
            LoggingLevel::Debug => Self {
                debug: true,
                info: true,
                warning: true,
            },
            LoggingLevel::Info => Self {
                debug: false,
                info: true,
                warning: true,
            },
            LoggingLevel::Warning => Self::default(),
            LoggingLevel::Off => Self {
                debug: false,
                info: false,
                warning: false,
            },
        }
    }
}

/// Change requested by one filter token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    EnableDebug,
    EnableInfo,
    EnableWarnings,
    Disable,
}

/// A parsed filter token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingFilter {
    pub category: String,
    pub action: FilterAction,
}

#[derive(Debug, Clone)]
struct CategoryEntry {
    kind: CategoryType,
    target: String,
    flags: CategoryFlags,
}

/// Read view returned by the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingCategoriesSnapshot {
    pub logging_categories: BTreeMap<String, LoggingLevel>,
    pub logging_categories_plugins: BTreeMap<String, LoggingLevel>,
}

/// Mapping from category name to its verbosity flags.
#[derive(Debug, Clone)]
pub struct LoggingCategoryConfig {
    categories: BTreeMap<String, CategoryEntry>,
}

impl LoggingCategoryConfig {
    /// Build a config with the built-in system categories plus `plugins`.
    ///
    /// Plugin categories use their own name as `tracing` target.
    pub fn new<I, S>(plugins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut categories = BTreeMap::new();
        for (name, target) in SYSTEM_CATEGORIES {
            categories.insert(
                name.to_string(),
                CategoryEntry {
                    kind: CategoryType::System,
                    target: target.to_string(),
                    flags: CategoryFlags::default(),
                },
            );
        }
        for plugin in plugins {
            let name: String = plugin.into();
            categories.entry(name.clone()).or_insert(CategoryEntry {
                kind: CategoryType::Plugin,
                target: name,
                flags: CategoryFlags::default(),
            });
        }
        Self { categories }
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }

    pub fn flags(&self, category: &str) -> Result<CategoryFlags, CoreError> {
        self.entry(category).map(|e| e.flags)
    }

    pub fn level(&self, category: &str) -> Result<LoggingLevel, CoreError> {
        self.flags(category).map(|f| f.level())
    }

    pub fn category_type(&self, category: &str) -> Result<CategoryType, CoreError> {
        self.entry(category).map(|e| e.kind)
    }

    /// Set the flags of `category` so its effective level equals `level`.
    pub fn set_level(&mut self, category: &str, level: LoggingLevel) -> Result<(), CoreError> {
        let entry = self.entry_mut(category)?;
        entry.flags = CategoryFlags::from_level(level);
        Ok(())
    }

    /// Parse a filter token against the known categories.
    ///
    /// An exact category name wins over the prefix/suffix forms, so a
    /// category whose name happens to start with `No` is still addressable.
    pub fn parse_filter(&self, token: &str) -> Result<LoggingFilter, CoreError> {
        let token = token.trim();
        let filter = |category: &str, action| LoggingFilter {
            category: category.to_string(),
            action,
        };

        if self.contains(token) {
            return Ok(filter(token, FilterAction::EnableDebug));
        }
        if let Some(rest) = token.strip_prefix(DISABLE_PREFIX) {
            if self.contains(rest) {
                return Ok(filter(rest, FilterAction::Disable));
            }
        }
        if let Some(rest) = token.strip_suffix(WARNINGS_SUFFIX) {
            if self.contains(rest) {
                return Ok(filter(rest, FilterAction::EnableWarnings));
            }
        }
        if let Some(rest) = token.strip_suffix(INFO_SUFFIX) {
            if self.contains(rest) {
                return Ok(filter(rest, FilterAction::EnableInfo));
            }
        }
        Err(CoreError::UnknownCategory(token.to_string()))
    }

    /// Apply a parsed filter. Only the sub-level named by the action changes,
    /// except `Disable` which clears all of them.
    pub fn apply_filter(&mut self, filter: &LoggingFilter) -> Result<(), CoreError> {
        let flags = &mut self.entry_mut(&filter.category)?.flags;
        match filter.action {
            FilterAction::EnableDebug => flags.debug = true,
            FilterAction::EnableInfo => flags.info = true,
            FilterAction::EnableWarnings => flags.warning = true,
            FilterAction::Disable => {
                flags.debug = false;
                flags.info = false;
                flags.warning = false;
            }
        }
        Ok(())
    }

    /// Parse and apply a filter token in one step.
    pub fn apply_token(&mut self, token: &str) -> Result<LoggingFilter, CoreError> {
        let filter = self.parse_filter(token)?;
        self.apply_filter(&filter)?;
        Ok(filter)
    }

    pub fn snapshot(&self) -> LoggingCategoriesSnapshot {
        let mut snapshot = LoggingCategoriesSnapshot {
            logging_categories: BTreeMap::new(),
            logging_categories_plugins: BTreeMap::new(),
        };
        for (name, entry) in &self.categories {
            let map = match entry.kind {
                CategoryType::System => &mut snapshot.logging_categories,
                CategoryType::Plugin => &mut snapshot.logging_categories_plugins,
            };
            map.insert(name.clone(), entry.flags.level());
        }
        snapshot
    }

    /// Take initial levels from `EnvFilter`-style directives.
    ///
    /// Every `target=level` directive whose target belongs to a category sets
    /// that category's level; `trace` counts as debug and `error` as warning.
    /// Other directives are ignored.
    pub fn seed_from_directives(&mut self, directives: &str) {
        for (target, level) in split_directives(directives).filter_map(|d| d.split_once('=')) {
            let level = match level.trim().to_ascii_lowercase().as_str() {
                "trace" => LoggingLevel::Debug,
                "error" => LoggingLevel::Warning,
                other => match other.parse() {
                    Ok(level) => level,
                    Err(_) => continue,
                },
            };
            let target = target.trim();
            for entry in self.categories.values_mut().filter(|e| e.target == target) {
                entry.flags = CategoryFlags::from_level(level);
            }
        }
    }

    /// Render the config as `EnvFilter` directives appended to `base`.
    ///
    /// `base` carries the global default (e.g. `info`) and any directives
    /// that are not category-controlled; base directives naming a category
    /// target are replaced by the category's own level.
    pub fn to_env_filter_directives(&self, base: &str) -> String {
        let controlled = |directive: &str| {
            directive
                .split_once('=')
                .is_some_and(|(target, _)| self.categories.values().any(|e| e.target == target.trim()))
        };
        let mut directives: Vec<String> = split_directives(base)
            .filter(|d| !controlled(d))
            .map(str::to_string)
            .collect();
        for entry in self.categories.values() {
            directives.push(format!("{}={}", entry.target, entry.flags.level().directive()));
        }
        directives.join(",")
    }

    fn entry(&self, category: &str) -> Result<&CategoryEntry, CoreError> {
        self.categories
            .get(category)
            .ok_or_else(|| CoreError::UnknownCategory(category.to_string()))
    }

    fn entry_mut(&mut self, category: &str) -> Result<&mut CategoryEntry, CoreError> {
        self.categories
            .get_mut(category)
            .ok_or_else(|| CoreError::UnknownCategory(category.to_string()))
    }
}

fn split_directives(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|d| !d.is_empty())
}

impl Default for LoggingCategoryConfig {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
