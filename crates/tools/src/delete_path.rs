//! Delete tool — remove a file, or a directory and everything under it.

use async_trait::async_trait;
use devloop_core::error::ToolError;
use devloop_core::tool::{Arguments, ParamKind, Parameter, Tool, ToolContext, ToolResult, str_arg};
use serde_json::json;
use tracing::info;

pub struct DeletePathTool;

fn outcome(success: bool, message: String) -> ToolResult {
    let status = if success { "success" } else { "error" };
    let payload = json!({ "status": status, "message": message });
    if success {
        ToolResult::ok(payload)
    } else {
        ToolResult::failed(payload)
    }
}

#[async_trait]
impl Tool for DeletePathTool {
    fn name(&self) -> &str {
        "delete_path"
    }

    fn description(&self) -> &str {
        "Delete a file or directory (recursively) relative to the active project path. \
         Destructive: always confirm with the user first via ask_user_confirmation."
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![Parameter::required(
            "relative_path",
            ParamKind::String,
            "File or directory to delete, relative to the project root",
        )]
    }

    async fn execute(&self, ctx: &ToolContext, args: &Arguments) -> Result<ToolResult, ToolError> {
        let relative = str_arg(args, "relative_path")
            .ok_or_else(|| ToolError::InvalidArguments("'relative_path' must not be empty".into()))?;
        let path = crate::resolve(ctx, relative)?;
        let shown = path.display().to_string();

        if ctx.project_root.as_deref().and_then(|r| r.canonicalize().ok()).as_deref() == Some(path.as_path()) {
            return Ok(outcome(false, "Refusing to delete the project root itself.".into()));
        }

        let metadata = match tokio::fs::symlink_metadata(&path).await {
            Ok(metadata) => metadata,
            Err(_) => return Ok(outcome(false, format!("Path not found: {shown}"))),
        };

        let removed = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };

        match removed {
            Ok(()) => {
                info!(path = %shown, "Deleted path");
                let kind = if metadata.is_dir() { "Directory" } else { "File" };
                Ok(outcome(true, format!("{kind} '{shown}' deleted successfully.")))
            }
            Err(e) => Ok(outcome(false, format!("Error deleting {shown}: {e}"))),
        }
    }
}
