//! Project creation: the one command that moves the active project root.
//!
//! A `run_command` call whose command contains the configured create
//! command (e.g. `ng new shop`) gets two extra steps around the normal
//! dispatch. Before it runs, a missing parent directory is asked of the
//! operator. After it succeeds, the new project directory becomes the
//! session's active root.

use devloop_core::message::ToolCallRequest;
use devloop_core::session::SessionContext;
use devloop_core::tool::{ToolContext, ToolRegistry, ToolResult};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const RUN_COMMAND: &str = "run_command";
const MISSING_DIR_WARNING: &str = "Warning: Project directory not found post-execution.";

/// Outcome of a project-creation dispatch.
#[derive(Debug)]
pub struct CreationOutcome {
    pub result: ToolResult,

    /// The new active root, when it moved
    pub new_root: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ProjectCreation {
    create_command: String,
}

impl ProjectCreation {
    pub fn new(create_command: impl Into<String>) -> Self {
        Self {
            create_command: create_command.into(),
        }
    }

    /// Whether this call is a project-creation command.
    pub fn applies(&self, call: &ToolCallRequest) -> bool {
        !self.create_command.is_empty()
            && call.name == RUN_COMMAND
            && call
                .str_arg("command")
                .is_some_and(|c| c.contains(&self.create_command))
    }

    /// The project name: the first word after the create command.
    ///
    /// A flag in that position means no name was given.
    pub fn project_name(&self, command: &str) -> Option<String> {
        let (_, rest) = command.split_once(&self.create_command)?;
        let name = rest.split_whitespace().next()?;
        if name.starts_with("--") {
            None
        } else {
            Some(name.to_string())
        }
    }

    /// Run the creation command and move the session root on success.
    pub async fn run(
        &self,
        tools: &ToolRegistry,
        ctx: &ToolContext,
        call: &ToolCallRequest,
        session: &mut SessionContext,
    ) -> CreationOutcome {
        let command = call.str_arg("command").unwrap_or_default().to_string();
        let name = self.project_name(&command);

        let requested = match call.str_arg("working_directory").filter(|d| !d.is_empty()) {
            Some(dir) => dir.to_string(),
            None => {
                let prompt = format!(
                    "The assistant wants to create a new project '{}'. In which parent directory \
                     should it be created? (absolute path, or '.' for the current directory)",
                    name.as_deref().unwrap_or("")
                );
                let answer = ctx.operator.ask(&prompt).await.unwrap_or_default();
                answer.trim().to_string()
            }
        };

        // Relative parents hang off the active root when there is one
        let parent = match ctx.project_root.as_deref() {
            Some(root) if Path::new(&requested).is_relative() => root.join(&requested),
            _ => PathBuf::from(&requested),
        };
        if requested.is_empty() || !parent.is_dir() {
            warn!(dir = %requested, "Rejected parent directory for project creation");
            let result = ToolResult::failed(json!({
                "error": format!(
                    "Invalid parent directory for '{}': {requested}",
                    self.create_command
                ),
                "exit_code": 1,
            }))
            .with_command(command);
            return CreationOutcome { result, new_root: None };
        }
        let parent = parent.canonicalize().unwrap_or(parent);
        let mut call = call.clone();
        call.arguments.insert(
            "working_directory".into(),
            Value::String(parent.display().to_string()),
        );

        info!(command = %command, dir = %parent.display(), "Creating project");
        // The parent was validated above and may sit outside the current root
        let ctx = ctx.clone().unconfined();
        let mut result = tools.dispatch(&ctx, &call).await;

        let succeeded = result.payload.get("exit_code").and_then(Value::as_i64) == Some(0);
        let Some(name) = name.filter(|_| succeeded) else {
            return CreationOutcome { result, new_root: None };
        };

        let project_dir = parent.join(&name);
        if !project_dir.is_dir() {
            warn!(path = %project_dir.display(), "Project directory missing after creation");
            if let Some(object) = result.payload.as_object_mut() {
                let stderr = object.get("stderr").and_then(Value::as_str).unwrap_or_default();
                let stderr = format!("{stderr} {MISSING_DIR_WARNING}").trim().to_string();
                object.insert("stderr".into(), Value::String(stderr));
            }
            return CreationOutcome { result, new_root: None };
        }

        let project_dir = project_dir.canonicalize().unwrap_or(project_dir);
        session.set_project_root(project_dir.clone());
        info!(path = %project_dir.display(), revision = session.revision(), "Active project root changed");
        if let Some(object) = result.payload.as_object_mut() {
            object.insert(
                "new_project_path_set".into(),
                Value::String(project_dir.display().to_string()),
            );
        }

        CreationOutcome {
            result,
            new_root: Some(project_dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedOperator, call};
    use devloop_tools::run_command::RunCommandTool;
    use std::sync::Arc;

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(RunCommandTool));
        registry
    }

    fn context(operator: Arc<ScriptedOperator>) -> ToolContext {
        ToolContext::new(None, operator)
    }

    #[test]
    fn extracts_project_name() {
        let creation = ProjectCreation::new("ng new");
        assert_eq!(creation.project_name("ng new shop --routing").as_deref(), Some("shop"));
        assert_eq!(creation.project_name("npx ng new   blog").as_deref(), Some("blog"));
        assert_eq!(creation.project_name("ng new --defaults"), None);
        assert_eq!(creation.project_name("ng new"), None);
        assert_eq!(creation.project_name("ng build"), None);
    }

    #[test]
    fn applies_only_to_run_command() {
        let creation = ProjectCreation::new("ng new");
        assert!(creation.applies(&call("run_command", serde_json::json!({"command": "ng new shop"}))));
        assert!(!creation.applies(&call("run_command", serde_json::json!({"command": "ng build"}))));
        assert!(!creation.applies(&call("start_dev_server", serde_json::json!({"command": "ng new shop"}))));
    }

    #[tokio::test]
    async fn invalid_parent_directory_does_not_run() {
        let operator = Arc::new(ScriptedOperator::new(vec![], vec!["/no/such/parent".into()]));
        let mut session = SessionContext::default();
        let creation = ProjectCreation::new("mkdir");

        let outcome = creation
            .run(
                &registry(),
                &context(operator.clone()),
                &call("run_command", serde_json::json!({"command": "mkdir shop"})),
                &mut session,
            )
            .await;

        assert!(!outcome.result.success);
        assert_eq!(outcome.result.payload["exit_code"], 1);
        assert!(
            outcome.result.payload["error"]
                .as_str()
                .unwrap()
                .starts_with("Invalid parent directory")
        );
        assert_eq!(outcome.result.command.as_deref(), Some("mkdir shop"));
        assert_eq!(operator.prompts().len(), 1);
        assert!(session.project_root().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn asks_for_parent_and_moves_root_on_success() {
        let parent = tempfile::tempdir().unwrap();
        let operator = Arc::new(ScriptedOperator::new(
            vec![],
            vec![parent.path().display().to_string()],
        ));
        let mut session = SessionContext::default();
        let creation = ProjectCreation::new("mkdir");

        let outcome = creation
            .run(
                &registry(),
                &context(operator.clone()),
                &call("run_command", serde_json::json!({"command": "mkdir shop"})),
                &mut session,
            )
            .await;

        let expected = parent.path().join("shop").canonicalize().unwrap();
        assert!(outcome.result.success);
        assert_eq!(outcome.new_root.as_deref(), Some(expected.as_path()));
        assert_eq!(session.project_root(), Some(expected.as_path()));
        assert_eq!(session.revision(), 1);
        assert_eq!(
            outcome.result.payload["new_project_path_set"],
            expected.display().to_string()
        );
        assert!(operator.prompts()[0].contains("'shop'"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn creates_sibling_project_outside_active_root() {
        let current = tempfile::tempdir().unwrap();
        let parent = tempfile::tempdir().unwrap();
        let operator = Arc::new(ScriptedOperator::new(vec![], vec![]));
        let mut session = SessionContext::new(Some(current.path().to_path_buf()));
        let creation = ProjectCreation::new("mkdir");
        let ctx = ToolContext::new(session.project_root().map(Path::to_path_buf), operator);

        let outcome = creation
            .run(
                &registry(),
                &ctx,
                &call(
                    "run_command",
                    serde_json::json!({
                        "command": "mkdir blog",
                        "working_directory": parent.path().display().to_string(),
                    }),
                ),
                &mut session,
            )
            .await;

        let expected = parent.path().join("blog").canonicalize().unwrap();
        assert!(outcome.result.success);
        assert_eq!(session.project_root(), Some(expected.as_path()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn relative_parent_resolves_against_active_root() {
        let current = tempfile::tempdir().unwrap();
        std::fs::create_dir(current.path().join("apps")).unwrap();
        let operator = Arc::new(ScriptedOperator::new(vec![], vec![]));
        let mut session = SessionContext::new(Some(current.path().to_path_buf()));
        let creation = ProjectCreation::new("mkdir");
        let ctx = ToolContext::new(session.project_root().map(Path::to_path_buf), operator);

        let outcome = creation
            .run(
                &registry(),
                &ctx,
                &call(
                    "run_command",
                    serde_json::json!({"command": "mkdir admin", "working_directory": "apps"}),
                ),
                &mut session,
            )
            .await;

        let expected = current.path().join("apps/admin").canonicalize().unwrap();
        assert_eq!(outcome.new_root.as_deref(), Some(expected.as_path()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_project_directory_leaves_root_alone() {
        let parent = tempfile::tempdir().unwrap();
        let operator = Arc::new(ScriptedOperator::new(vec![], vec![]));
        let mut session = SessionContext::default();
        let creation = ProjectCreation::new("true");

        let outcome = creation
            .run(
                &registry(),
                &context(operator.clone()),
                &call(
                    "run_command",
                    serde_json::json!({
                        "command": "true ghost",
                        "working_directory": parent.path().display().to_string(),
                    }),
                ),
                &mut session,
            )
            .await;

        assert!(outcome.new_root.is_none());
        assert!(session.project_root().is_none());
        assert_eq!(outcome.result.payload["stderr"], MISSING_DIR_WARNING);
        assert!(operator.prompts().is_empty());
    }
}
