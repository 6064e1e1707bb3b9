//! Run-command tool — execute a shell command to completion.
//!
//! A non-zero exit code is a reported failure, not an error: the caller gets
//! stdout, stderr and the exit code back as data.

use async_trait::async_trait;
use devloop_core::error::ToolError;
use devloop_core::tool::{Arguments, ParamKind, Parameter, Tool, ToolContext, ToolResult, str_arg};
use serde_json::json;
use tokio::process::Command;
use tracing::{debug, warn};

/// Exit code reported when the command could not be spawned at all.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command to completion and return its stdout, stderr and exit_code. \
         Use for installs, builds, scaffolding and one-off commands. Do not use for long-running \
         dev servers; use start_dev_server instead."
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::required("command", ParamKind::String, "The shell command to execute"),
            Parameter::optional(
                "working_directory",
                ParamKind::String,
                "Directory to run in. Defaults to the active project path.",
            ),
        ]
    }

    async fn execute(&self, ctx: &ToolContext, args: &Arguments) -> Result<ToolResult, ToolError> {
        let command = str_arg(args, "command")
            .ok_or_else(|| ToolError::InvalidArguments("'command' must not be empty".into()))?;
        let dir = crate::working_dir(ctx, str_arg(args, "working_directory"))?;

        debug!(command = %command, dir = %dir.display(), "Executing command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        let output = cmd.current_dir(&dir).output().await;

        let result = match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let code = output.status.code().unwrap_or(-1);
                if code != 0 {
                    warn!(command = %command, exit_code = code, "Command failed");
                }
                let payload = json!({ "stdout": stdout, "stderr": stderr, "exit_code": code });
                if code == 0 {
                    ToolResult::ok(payload)
                } else {
                    ToolResult::failed(payload)
                }
            }
            Err(e) => {
                warn!(command = %command, error = %e, "Command could not be started");
                ToolResult::failed(json!({
                    "stdout": "",
                    "stderr": format!("Error: could not execute in '{}': {e}", dir.display()),
                    "exit_code": SPAWN_FAILURE_EXIT_CODE,
                }))
            }
        };

        Ok(result.with_command(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{args, context};

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let result = RunCommandTool
            .execute(&context(Some(dir.path())), &args(json!({"command": "echo hello"})))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.payload["exit_code"], 0);
        assert_eq!(result.payload["stdout"].as_str().unwrap().trim(), "hello");
        assert_eq!(result.command.as_deref(), Some("echo hello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_reported_failure() {
        let dir = tempfile::tempdir().unwrap();
        let result = RunCommandTool
            .execute(
                &context(Some(dir.path())),
                &args(json!({"command": "echo oops 1>&2; exit 2"})),
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.payload["exit_code"], 2);
        assert!(result.payload["stderr"].as_str().unwrap().contains("oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_in_project_root_by_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let result = RunCommandTool
            .execute(&context(Some(dir.path())), &args(json!({"command": "ls"})))
            .await
            .unwrap();
        assert!(result.payload["stdout"].as_str().unwrap().contains("marker.txt"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn relative_working_directory_resolves_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("frontend")).unwrap();
        let result = RunCommandTool
            .execute(
                &context(Some(dir.path())),
                &args(json!({"command": "pwd", "working_directory": "frontend"})),
            )
            .await
            .unwrap();
        let expected = dir.path().join("frontend").canonicalize().unwrap();
        assert_eq!(result.payload["exit_code"], 0);
        assert_eq!(
            result.payload["stdout"].as_str().unwrap().trim(),
            expected.display().to_string()
        );
    }

    #[tokio::test]
    async fn working_directory_outside_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for outside in ["/", "../"] {
            let err = RunCommandTool
                .execute(
                    &context(Some(dir.path())),
                    &args(json!({"command": "pwd", "working_directory": outside})),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, ToolError::PathRejected(_)), "{outside} was accepted");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unconfined_context_accepts_outside_directory() {
        let root = tempfile::tempdir().unwrap();
        let parent = tempfile::tempdir().unwrap();
        let result = RunCommandTool
            .execute(
                &context(Some(root.path())).unconfined(),
                &args(json!({
                    "command": "pwd",
                    "working_directory": parent.path().display().to_string(),
                })),
            )
            .await
            .unwrap();
        assert_eq!(result.payload["exit_code"], 0);
    }

    #[tokio::test]
    async fn missing_directory_reports_spawn_failure() {
        let result = RunCommandTool
            .execute(
                &context(None),
                &args(json!({"command": "echo hi", "working_directory": "/nonexistent/devloop"})),
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.payload["exit_code"], SPAWN_FAILURE_EXIT_CODE);
    }

    #[tokio::test]
    async fn no_root_and_no_directory_fails_fast() {
        let err = RunCommandTool
            .execute(&context(None), &args(json!({"command": "echo hi"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NoWorkingDirectory));
    }
}
