//! File write tool — write or create project files with path validation.

use async_trait::async_trait;
use devloop_core::error::ToolError;
use devloop_core::tool::{Arguments, ParamKind, Parameter, Tool, ToolContext, ToolResult, str_arg};
use serde_json::json;

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file relative to the active project path. Creates the file and any \
         missing parent directories; overwrites existing content."
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::required("relative_path", ParamKind::String, "Path relative to the project root"),
            Parameter::required("content", ParamKind::String, "The full content to write"),
        ]
    }

    async fn execute(&self, ctx: &ToolContext, args: &Arguments) -> Result<ToolResult, ToolError> {
        let relative = str_arg(args, "relative_path")
            .ok_or_else(|| ToolError::InvalidArguments("'relative_path' must not be empty".into()))?;
        // Empty content is legitimate, so not str_arg
        let content = args.get("content").and_then(|v| v.as_str()).unwrap_or_default();
        let path = crate::resolve(ctx, relative)?;
        let shown = path.display().to_string();

        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::failed(json!({
                "success": false,
                "path": shown,
                "error": format!("Failed to create directory: {e}"),
            })));
        }

        match tokio::fs::write(&path, content).await {
            Ok(()) => Ok(ToolResult::ok(json!({
                "success": true,
                "path": shown,
                "bytes": content.len(),
            }))),
            Err(e) => Ok(ToolResult::failed(json!({
                "success": false,
                "path": shown,
                "error": format!("Failed to write file: {e}"),
            }))),
        }
    }
}
