use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::report::ReportBuilder;
use crate::tools::{ToolKind, ToolRunner};
use crate::types::{JobKind, JobOutput};

use super::JobExecutor;

/// Production executor: network tests go to the [`ToolRunner`], report
/// generation to the [`ReportBuilder`].
pub struct DiagnosticsExecutor {
    tools: Arc<ToolRunner>,
    reports: Arc<ReportBuilder>,
}

impl DiagnosticsExecutor {
    pub fn new(tools: Arc<ToolRunner>, reports: Arc<ReportBuilder>) -> Self {
        Self { tools, reports }
    }
}

#[async_trait]
impl JobExecutor for DiagnosticsExecutor {
    async fn execute(&self, kind: JobKind) -> Result<JobOutput, CoreError> {
        let tool = match ToolKind::try_from(kind) {
            Ok(tool) => tool,
            Err(_) => {
                return self
                    .reports
                    .build()
                    .await
                    .map(JobOutput::Report)
                    .map_err(|e| CoreError::OperationFailed(e.to_string()));
            }
        };

        match self.tools.run(tool).await {
            Ok(out) if out.ok => Ok(JobOutput::Text(out.output)),
            Ok(out) => Err(CoreError::OperationFailed(format!(
                "'{}' exited with code {}\n{}",
                self.tools.command(tool),
                out.exit_code,
                out.output
            ))),
            Err(e) => Err(CoreError::OperationFailed(e.to_string())),
        }
    }
}
