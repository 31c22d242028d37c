//! Runtime control over logging categories.
//!
//! [`LoggingControl`] owns the [`LoggingCategoryConfig`] and pushes every
//! change into the process-wide `EnvFilter` through a reload hook, so log
//! call sites see the new levels at emission time.

use std::sync::{PoisonError, RwLock};

use diag_core::error::CoreError;
use diag_core::logging::{LoggingCategoriesSnapshot, LoggingCategoryConfig, LoggingLevel};
use tracing_subscriber::reload;
use tracing_subscriber::{EnvFilter, Registry};

/// Default directives used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVES: &str = "diag_api=debug,tower_http=debug";

/// One requested change to the category levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryChange {
    Level {
        category: String,
        level: LoggingLevel,
    },
    /// A filter token such as `NoDeviceManager` or `RuleEngineInfo`.
    Filter(String),
}

impl CategoryChange {
    pub fn level(category: impl Into<String>, level: LoggingLevel) -> Self {
        Self::Level {
            category: category.into(),
            level,
        }
    }
}

/// Applies a rendered directive string to the active filter.
pub type ReloadFn = Box<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

pub struct LoggingControl {
    config: RwLock<LoggingCategoryConfig>,
    base_directives: String,
    reload: Option<ReloadFn>,
}

impl LoggingControl {
    /// A control without a filter to drive. Used by tests and tools.
    pub fn detached(config: LoggingCategoryConfig) -> Self {
        Self {
            config: RwLock::new(config),
            base_directives: DEFAULT_DIRECTIVES.to_string(),
            reload: None,
        }
    }

    /// A control bound to the reloadable filter layer installed at startup.
    pub fn with_reload_handle(
        config: LoggingCategoryConfig,
        base_directives: impl Into<String>,
        handle: reload::Handle<EnvFilter, Registry>,
    ) -> Self {
        let reload: ReloadFn = Box::new(move |directives: &str| {
            let filter = EnvFilter::try_new(directives).map_err(|e| e.to_string())?;
            handle.reload(filter).map_err(|e| e.to_string())
        });
        Self {
            config: RwLock::new(config),
            base_directives: base_directives.into(),
            reload: Some(reload),
        }
    }

    /// Filter string for the current category levels.
    pub fn directives(&self) -> String {
        self.read(|config| config.to_env_filter_directives(&self.base_directives))
    }

    pub fn snapshot(&self) -> LoggingCategoriesSnapshot {
        self.read(LoggingCategoryConfig::snapshot)
    }

    /// Apply a batch of changes atomically.
    ///
    /// Either every change is valid and the filter reloads once, or the
    /// config is left exactly as it was.
    pub fn apply_changes(
        &self,
        changes: &[CategoryChange],
    ) -> Result<LoggingCategoriesSnapshot, CoreError> {
        let snapshot = self.update(|config| {
            for change in changes {
                match change {
                    CategoryChange::Level { category, level } => {
                        config.set_level(category, *level)?;
                    }
                    CategoryChange::Filter(token) => {
                        config.apply_token(token)?;
                    }
                }
            }
            Ok(config.snapshot())
        })?;
        tracing::info!(?changes, "Logging categories updated");
        Ok(snapshot)
    }

    fn read<T>(&self, f: impl FnOnce(&LoggingCategoryConfig) -> T) -> T {
        let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
        f(&config)
    }

    /// Run `f` on a copy and swap it in only after the filter accepted it.
    fn update<T>(
        &self,
        f: impl FnOnce(&mut LoggingCategoryConfig) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        let mut candidate = config.clone();
        let result = f(&mut candidate)?;
        self.reload_with(&candidate)?;
        *config = candidate;
        Ok(result)
    }

    fn reload_with(&self, config: &LoggingCategoryConfig) -> Result<(), CoreError> {
        let Some(reload) = &self.reload else {
            return Ok(());
        };
        let directives = config.to_env_filter_directives(&self.base_directives);
        reload(&directives).map_err(|e| {
            CoreError::OperationFailed(format!("failed to reload log filter: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use assert_matches::assert_matches;

    use super::*;

    fn recording(base: &str) -> (LoggingControl, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let control = LoggingControl {
            config: RwLock::new(LoggingCategoryConfig::default()),
            base_directives: base.to_string(),
            reload: Some(Box::new(move |d: &str| {
                sink.lock().unwrap().push(d.to_string());
                Ok(())
            })),
        };
        (control, seen)
    }

    #[test]
    fn token_changes_snapshot() {
        let control = LoggingControl::detached(LoggingCategoryConfig::default());
        let snapshot = control
            .apply_changes(&[CategoryChange::Filter("NoDeviceManager".into())])
            .unwrap();
        assert_eq!(
            snapshot.logging_categories["DeviceManager"],
            LoggingLevel::Off
        );
    }

    #[test]
    fn unknown_category_leaves_config_untouched() {
        let control = LoggingControl::detached(LoggingCategoryConfig::default());
        let before = control.directives();
        assert_matches!(
            control.apply_changes(&[CategoryChange::level("Frobnicator", LoggingLevel::Debug)]),
            Err(CoreError::UnknownCategory(_))
        );
        assert_eq!(control.directives(), before);
    }

    #[test]
    fn rejected_batch_applies_none_of_its_changes() {
        let (control, seen) = recording("info");
        let before = control.snapshot();

        let batch = [
            CategoryChange::level("Application", LoggingLevel::Debug),
            CategoryChange::Filter("NoDeviceManager".into()),
            CategoryChange::level("Zzz", LoggingLevel::Warning),
        ];
        assert_matches!(control.apply_changes(&batch), Err(CoreError::UnknownCategory(c)) if c == "Zzz");

        assert_eq!(control.snapshot(), before);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn batch_reloads_the_filter_once() {
        let (control, seen) = recording("info");

        let snapshot = control
            .apply_changes(&[
                CategoryChange::level("RuleEngine", LoggingLevel::Debug),
                CategoryChange::Filter("NoDeviceManager".into()),
            ])
            .unwrap();
        assert_eq!(snapshot.logging_categories["RuleEngine"], LoggingLevel::Debug);
        assert_eq!(snapshot.logging_categories["DeviceManager"], LoggingLevel::Off);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with("info,"));
        assert_eq!(seen[0], control.directives());
    }

    #[test]
    fn reload_failure_keeps_the_previous_levels() {
        let control = LoggingControl {
            config: RwLock::new(LoggingCategoryConfig::default()),
            base_directives: String::new(),
            reload: Some(Box::new(|_: &str| Err("subscriber gone".to_string()))),
        };
        let before = control.snapshot();
        assert_matches!(
            control.apply_changes(&[CategoryChange::level("RuleEngine", LoggingLevel::Debug)]),
            Err(CoreError::OperationFailed(msg)) if msg.contains("subscriber gone")
        );
        assert_eq!(control.snapshot(), before);
    }
}
