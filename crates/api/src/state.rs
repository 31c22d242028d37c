use std::sync::Arc;

use diag_core::jobs::{DiagnosticsExecutor, JobRegistry};
use diag_core::report::{ReportBuilder, ReportStore};
use diag_core::system_info::ServerIdentity;
use diag_core::tools::ToolRunner;
use diag_events::LogHub;

use crate::config::ServerConfig;
use crate::logging::LoggingControl;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Single-flight slots for report generation and the network tests.
    pub jobs: Arc<JobRegistry>,
    /// Where finished report bundles are fetched from.
    pub reports: ReportStore,
    pub logging: Arc<LoggingControl>,
    /// Live log fan-out.
    pub log_hub: Arc<LogHub>,
    /// Live-log WebSocket connections (both listeners).
    pub ws_manager: Arc<WsManager>,
    pub identity: Arc<ServerIdentity>,
}

impl AppState {
    /// Wire the production collaborators: real tool runner, report builder
    /// and job registry.
    pub fn from_config(config: ServerConfig, logging: LoggingControl, log_hub: Arc<LogHub>) -> Self {
        let tools = ToolRunner::new(&config.diag_target_host, config.tool_timeout());
        Self::with_tools(config, tools, logging, log_hub)
    }

    /// Like [`AppState::from_config`] with a caller-supplied tool runner.
    pub fn with_tools(
        config: ServerConfig,
        tools: ToolRunner,
        logging: LoggingControl,
        log_hub: Arc<LogHub>,
    ) -> Self {
        let identity = ServerIdentity::new(config.server_name.clone(), env!("CARGO_PKG_VERSION"));
        let reports = ReportStore::new(config.report_dir.clone());
        let tools = Arc::new(tools);
        let builder = ReportBuilder::new(
            reports.clone(),
            config.report_sources(),
            Arc::clone(&tools),
            identity.clone(),
        );
        let executor = DiagnosticsExecutor::new(tools, Arc::new(builder));

        Self {
            config: Arc::new(config),
            jobs: Arc::new(JobRegistry::new(Arc::new(executor))),
            reports,
            logging: Arc::new(logging),
            log_hub,
            ws_manager: Arc::new(WsManager::new()),
            identity: Arc::new(identity),
        }
    }
}
