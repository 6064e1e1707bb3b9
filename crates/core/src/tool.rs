//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world:
//! run shell commands, supervise a dev server, read and write project files.
//!
//! Each tool declares its parameters once. The registry renders the JSON
//! schema the model sees from that declaration and validates the model's
//! loosely-typed arguments against it before the tool ever runs.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use crate::error::ToolError;
use crate::message::ToolCallRequest;
use crate::operator::Operator;
use crate::provider::ToolDefinition;

/// Argument map as produced by the model.
pub type Arguments = Map<String, Value>;

/// Primitive argument kinds the model may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
}

impl ParamKind {
    fn schema_type(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Boolean => value.is_boolean(),
            // Some providers send integers as 20.0
            ParamKind::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
        }
    }
}

/// One declared tool parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

impl Parameter {
    pub fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self { name, kind, required: true, description }
    }

    pub fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self { name, kind, required: false, description }
    }
}

/// Render a parameter list as a JSON Schema object.
pub fn render_schema(params: &[Parameter]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for p in params {
        properties.insert(
            p.name.to_string(),
            json!({ "type": p.kind.schema_type(), "description": p.description }),
        );
        if p.required {
            required.push(Value::String(p.name.to_string()));
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Check model arguments against declared parameters.
///
/// Unknown keys are ignored; `null` counts as absent.
pub fn validate_arguments(params: &[Parameter], args: &Arguments) -> Result<(), ToolError> {
    for p in params {
        match args.get(p.name) {
            None | Some(Value::Null) => {
                if p.required {
                    return Err(ToolError::InvalidArguments(format!(
                        "missing required parameter '{}'",
                        p.name
                    )));
                }
            }
            Some(value) if !p.kind.accepts(value) => {
                return Err(ToolError::InvalidArguments(format!(
                    "parameter '{}' must be a {}",
                    p.name,
                    p.kind.schema_type()
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// String argument, treating empty strings as absent.
pub fn str_arg<'a>(args: &'a Arguments, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// Integer argument (accepts whole floats).
pub fn int_arg(args: &Arguments, key: &str) -> Option<i64> {
    let value = args.get(key)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
}

/// Per-call view of the session handed to a tool.
#[derive(Clone)]
pub struct ToolContext {
    /// Active project root, if one has been established
    pub project_root: Option<PathBuf>,

    /// The human operator, for tools that must block on an answer
    pub operator: Arc<dyn Operator>,

    /// Whether an explicit working directory must lie inside the root
    pub confine_working_dir: bool,
}

impl ToolContext {
    pub fn new(project_root: Option<PathBuf>, operator: Arc<dyn Operator>) -> Self {
        Self {
            project_root,
            operator,
            confine_working_dir: true,
        }
    }

    /// Accept an explicit working directory outside the root.
    ///
    /// Only project creation needs this: the new project's parent is
    /// validated by the caller before the command runs.
    pub fn unconfined(mut self) -> Self {
        self.confine_working_dir = false;
        self
    }

    /// The root, or a fast failure for path-dependent tools.
    pub fn require_root(&self) -> Result<&Path, ToolError> {
        self.project_root.as_deref().ok_or(ToolError::NoProjectRoot)
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// Whether the tool's own failure signal fired
    pub success: bool,

    /// Tool-specific payload handed back to the model
    pub payload: Value,

    /// The command string this result is about, if any
    pub command: Option<String>,
}

impl ToolResult {
    pub fn ok(payload: Value) -> Self {
        Self { success: true, payload, command: None }
    }

    pub fn failed(payload: Value) -> Self {
        Self { success: false, payload, command: None }
    }

    /// A failure payload of the form `{"error": message}`.
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::failed(json!({ "error": message.to_string() }))
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }
}

/// The core Tool trait.
///
/// Tools are registered in the [`ToolRegistry`] and made available to the
/// turn loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "run_command", "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// Declared parameters; drives both the schema and validation.
    fn parameters(&self) -> Vec<Parameter>;

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, ctx: &ToolContext, args: &Arguments) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: render_schema(&self.parameters()),
        }
    }
}

/// A registry of available tools, kept in registration order.
///
/// The turn loop uses this to:
/// 1. Get tool definitions to send to the LLM
/// 2. Validate and dispatch calls the LLM requests
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(idx) => self.tools[idx] = tool,
            None => self.tools.push(tool),
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Validate and run one model tool call.
    ///
    /// Never fails: unknown tools, invalid arguments and tool errors all
    /// come back as failure payloads the model can reason about.
    pub async fn dispatch(&self, ctx: &ToolContext, call: &ToolCallRequest) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool = %call.name, "Model requested unknown tool");
            return ToolResult::error(ToolError::NotFound(call.name.clone()));
        };

        if let Err(e) = validate_arguments(&tool.parameters(), &call.arguments) {
            warn!(tool = %call.name, error = %e, "Rejected tool arguments");
            return ToolResult::error(e);
        }

        let start = Instant::now();
        let result = match tool.execute(ctx, &call.arguments).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::error(e)
            }
        };
        debug!(
            tool = %call.name,
            success = result.success,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tool dispatched"
        );
        result
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
