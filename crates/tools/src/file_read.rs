//! File read tool — read a project file with path validation.

use async_trait::async_trait;
use devloop_core::error::ToolError;
use devloop_core::tool::{Arguments, ParamKind, Parameter, Tool, ToolContext, ToolResult, str_arg};
use serde_json::json;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file, relative to the active project path."
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![Parameter::required(
            "relative_path",
            ParamKind::String,
            "Path of the file relative to the project root, e.g. 'src/app/app.component.ts'",
        )]
    }

    async fn execute(&self, ctx: &ToolContext, args: &Arguments) -> Result<ToolResult, ToolError> {
        let relative = str_arg(args, "relative_path").unwrap_or(".");
        let path = crate::resolve(ctx, relative)?;

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(ToolResult::ok(json!({ "content": content }))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ToolResult::error(format!(
                "File not found at {}",
                path.display()
            ))),
            Err(e) => Ok(ToolResult::error(format!(
                "Error reading file {}: {e}",
                path.display()
            ))),
        }
    }
}
