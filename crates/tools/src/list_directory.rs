//! List-directory tool.

use async_trait::async_trait;
use devloop_core::error::ToolError;
use devloop_core::tool::{Arguments, ParamKind, Parameter, Tool, ToolContext, ToolResult, str_arg};
use serde_json::json;
use tracing::warn;

pub struct ListDirectoryTool;

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the entries of a directory relative to the active project path. \
         Each entry has a name and a type ('file' or 'directory')."
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![Parameter::optional(
            "relative_path",
            ParamKind::String,
            "Directory relative to the project root. Defaults to '.'.",
        )]
    }

    async fn execute(&self, ctx: &ToolContext, args: &Arguments) -> Result<ToolResult, ToolError> {
        let relative = str_arg(args, "relative_path").unwrap_or(".");
        let path = crate::resolve(ctx, relative)?;
        let shown = path.display().to_string();

        let mut reader = match tokio::fs::read_dir(&path).await {
            Ok(reader) => reader,
            Err(e) => {
                let error = if e.kind() == std::io::ErrorKind::NotFound {
                    format!("Directory not found at {shown}")
                } else {
                    format!("Error listing directory {shown}: {e}")
                };
                return Ok(ToolResult::failed(json!({
                    "success": false,
                    "path": shown,
                    "error": error,
                    "contents": [],
                })));
            }
        };

        let mut entries = Vec::new();
        let interrupted = loop {
            match reader.next_entry().await {
                Ok(Some(entry)) => {
                    let is_dir = entry
                        .file_type()
                        .await
                        .map(|t| t.is_dir())
                        .unwrap_or(false);
                    entries.push((
                        entry.file_name().to_string_lossy().to_string(),
                        if is_dir { "directory" } else { "file" },
                    ));
                }
                Ok(None) => break None,
                Err(e) => {
                    warn!(path = %shown, error = %e, "Directory listing interrupted");
                    break Some(e);
                }
            }
        };

        Ok(listing(shown, entries, interrupted))
    }
}

/// Build the payload; an interrupted read fails but keeps what was read.
fn listing(
    shown: String,
    mut entries: Vec<(String, &'static str)>,
    interrupted: Option<std::io::Error>,
) -> ToolResult {
    entries.sort();
    let contents: Vec<_> = entries
        .into_iter()
        .map(|(name, kind)| json!({ "name": name, "type": kind }))
        .collect();

    match interrupted {
        None => ToolResult::ok(json!({
            "success": true,
            "path": shown,
            "contents": contents,
        })),
        Some(e) => {
            let error = format!("Error listing directory {shown}: {e}");
            ToolResult::failed(json!({
                "success": false,
                "path": shown,
                "error": error,
                "contents": contents,
            }))
        }
    }
}
