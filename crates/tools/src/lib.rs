//! Built-in tool implementations for devloop.
//!
//! Tools give the agent the ability to work on a local web project:
//! run commands, supervise a dev server, read, write, list and delete
//! project files, and ask the user for confirmation.
//!
//! Every path-taking tool resolves its argument against the active project
//! root through `devloop-security`; nothing acts outside that root.

pub mod confirm;
pub mod delete_path;
pub mod dev_server;
pub mod file_read;
pub mod file_write;
pub mod list_directory;
pub mod run_command;
pub mod supervisor;

use devloop_core::error::ToolError;
use devloop_core::tool::{ToolContext, ToolRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub use supervisor::{
    OutputSink, OutputStream, ProcessSupervisor, StartStatus, StopStatus, SupervisorConfig,
    TracingSink,
};

/// Create the registry of all built-in tools.
///
/// The dev-server tools share `supervisor`, which owns the single
/// background process slot.
pub fn default_registry(supervisor: Arc<ProcessSupervisor>, default_monitor: Duration) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(run_command::RunCommandTool));
    registry.register(Arc::new(dev_server::StartDevServerTool::new(
        supervisor.clone(),
        default_monitor,
    )));
    registry.register(Arc::new(dev_server::StopDevServerTool::new(supervisor)));
    registry.register(Arc::new(file_read::ReadFileTool));
    registry.register(Arc::new(file_write::WriteFileTool));
    registry.register(Arc::new(list_directory::ListDirectoryTool));
    registry.register(Arc::new(delete_path::DeletePathTool));
    registry.register(Arc::new(confirm::AskConfirmationTool));
    registry
}

/// Resolve a model-supplied relative path inside the active root.
pub(crate) fn resolve(ctx: &ToolContext, relative: &str) -> Result<PathBuf, ToolError> {
    let root = ctx.require_root()?;
    devloop_security::resolve_within(root, relative).map_err(|e| ToolError::PathRejected(e.to_string()))
}

/// Directory a command runs in: the explicit one, else the active root.
///
/// With a root set, an explicit directory is resolved inside it unless the
/// context was marked unconfined.
pub(crate) fn working_dir(ctx: &ToolContext, explicit: Option<&str>) -> Result<PathBuf, ToolError> {
    match (explicit, ctx.project_root.as_deref()) {
        (Some(dir), Some(_)) if ctx.confine_working_dir => resolve(ctx, dir),
        (Some(dir), _) => Ok(PathBuf::from(dir)),
        (None, Some(root)) => Ok(root.to_path_buf()),
        (None, None) => Err(ToolError::NoWorkingDirectory),
    }
}
