//! Transcript domain types.
//!
//! A transcript is an ordered list of role-tagged turns. Each turn carries
//! ordered parts: plain text, a tool-call request emitted by the model, or
//! the result handed back for one of those requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a transcript (one interactive session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TranscriptId(pub String);

impl TranscriptId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TranscriptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TranscriptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The human operator
    User,
    /// The language model
    Model,
    /// Results of tools the model asked for
    ToolResult,
}

/// A model request to run a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Call ID, echoed back in the matching result
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Loosely-typed arguments as produced by the model
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ToolCallRequest {
    /// Create a request with a fresh call ID.
    pub fn new(name: impl Into<String>, arguments: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            arguments,
        }
    }

    /// String argument lookup.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// The answer to one [`ToolCallRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// The call this result answers
    pub call_id: String,

    /// Name of the tool that ran (or was asked for)
    pub name: String,

    /// Tool-specific result mapping
    pub payload: serde_json::Value,
}

/// One element of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    ToolCall(ToolCallRequest),
    ToolResult(ToolCallResult),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }
}

/// A single role-tagged entry in the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    fn with_parts(role: Role, parts: Vec<Part>) -> Self {
        Self {
            role,
            parts,
            timestamp: Utc::now(),
        }
    }

    /// A user turn holding a single text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_parts(Role::User, vec![Part::text(text)])
    }

    /// A model turn built from arbitrary parts.
    pub fn model(parts: Vec<Part>) -> Self {
        Self::with_parts(Role::Model, parts)
    }

    /// A model turn holding only text.
    pub fn model_text(text: impl Into<String>) -> Self {
        Self::model(vec![Part::text(text)])
    }

    /// A tool-result turn, one part per answered call.
    pub fn tool_results(results: Vec<ToolCallResult>) -> Self {
        Self::with_parts(
            Role::ToolResult,
            results.into_iter().map(Part::ToolResult).collect(),
        )
    }

    /// Tool calls in the order the model produced them.
    pub fn tool_calls(&self) -> Vec<&ToolCallRequest> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Results carried by this turn, in order.
    pub fn results(&self) -> Vec<&ToolCallResult> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolResult(result) => Some(result),
                _ => None,
            })
            .collect()
    }

    /// Concatenated text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::ToolCall(_)))
    }
}

/// Ordered history of one session.
///
/// Appended to monotonically; [`Transcript::clear`] is the only way turns
/// are removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub id: TranscriptId,
    turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transcript {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: TranscriptId::new(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.updated_at = Utc::now();
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drop every turn and start a fresh transcript identity.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.id = TranscriptId::new();
        self.updated_at = Utc::now();
    }

    /// Tool calls of a trailing model turn that have no answer yet.
    ///
    /// Empty whenever the model may be asked to continue.
    pub fn pending_calls(&self) -> Vec<&ToolCallRequest> {
        match self.turns.last() {
            Some(turn) if turn.role == Role::Model => turn.tool_calls(),
            _ => Vec::new(),
        }
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}
