//! Dev-server tools — start and stop the supervised background process.

use crate::supervisor::{ProcessSupervisor, StartStatus};
use async_trait::async_trait;
use devloop_core::error::ToolError;
use devloop_core::tool::{Arguments, ParamKind, Parameter, Tool, ToolContext, ToolResult, int_arg, str_arg};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub struct StartDevServerTool {
    supervisor: Arc<ProcessSupervisor>,
    default_monitor: Duration,
}

impl StartDevServerTool {
    pub fn new(supervisor: Arc<ProcessSupervisor>, default_monitor: Duration) -> Self {
        Self { supervisor, default_monitor }
    }
}

#[async_trait]
impl Tool for StartDevServerTool {
    fn name(&self) -> &str {
        "start_dev_server"
    }

    fn description(&self) -> &str {
        "Start a long-running dev server (e.g. 'ng serve') in the background. Monitors initial output \
         for a short period and returns it with a status: 'compiled', 'error', 'timeout' (still \
         compiling, keeps running) or 'already_running'. Full output keeps streaming to the user's terminal."
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::required("command", ParamKind::String, "The serve command, typically 'ng serve'"),
            Parameter::optional(
                "working_directory",
                ParamKind::String,
                "Project directory. Defaults to the active project path.",
            ),
            Parameter::optional(
                "monitor_duration_seconds",
                ParamKind::Integer,
                "How many seconds to watch initial output. Default is 20.",
            ),
        ]
    }

    async fn execute(&self, ctx: &ToolContext, args: &Arguments) -> Result<ToolResult, ToolError> {
        let command = str_arg(args, "command")
            .ok_or_else(|| ToolError::InvalidArguments("'command' must not be empty".into()))?;
        let dir = crate::working_dir(ctx, str_arg(args, "working_directory"))?;
        let monitor = int_arg(args, "monitor_duration_seconds")
            .map(|s| Duration::from_secs(s.max(0) as u64))
            .unwrap_or(self.default_monitor);

        let result = match self.supervisor.start(command, &dir, monitor).await {
            Ok(report) => {
                let payload = json!({
                    "status": report.status,
                    "command": command,
                    "pid": report.pid,
                    "message": report.message,
                    "initial_stdout_log": report.stdout.join("\n"),
                    "initial_stderr_log": report.stderr.join("\n"),
                });
                if report.status == StartStatus::Error {
                    ToolResult::failed(payload)
                } else {
                    ToolResult::ok(payload)
                }
            }
            Err(e) => ToolResult::failed(json!({
                "status": StartStatus::Error,
                "command": command,
                "pid": null,
                "message": e.to_string(),
                "initial_stdout_log": "",
                "initial_stderr_log": e.to_string(),
            })),
        };

        Ok(result.with_command(command))
    }
}

pub struct StopDevServerTool {
    supervisor: Arc<ProcessSupervisor>,
}

impl StopDevServerTool {
    pub fn new(supervisor: Arc<ProcessSupervisor>) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl Tool for StopDevServerTool {
    fn name(&self) -> &str {
        "stop_dev_server"
    }

    fn description(&self) -> &str {
        "Stop the background dev server if one is running. Returns status 'stopped', 'killed' or 'not_running'."
    }

    fn parameters(&self) -> Vec<Parameter> {
        Vec::new()
    }

    async fn execute(&self, _ctx: &ToolContext, _args: &Arguments) -> Result<ToolResult, ToolError> {
        let report = self.supervisor.stop().await;
        Ok(ToolResult::ok(json!({
            "status": report.status,
            "message": report.message,
        })))
    }
}
