//! Session context shared with every tool call and every model request.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lifecycle of the single background dev-server slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    #[default]
    Idle,
    Starting,
    Compiling,
    Ready,
    Failed,
    Stopping,
}

impl ServerState {
    /// Whether a process occupies the slot.
    pub fn is_live(self) -> bool {
        !matches!(self, ServerState::Idle)
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServerState::Idle => "idle",
            ServerState::Starting => "starting",
            ServerState::Compiling => "compiling",
            ServerState::Ready => "ready",
            ServerState::Failed => "failed",
            ServerState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// The mutable "where are we working" state of a session.
///
/// Only project creation moves the root; every move bumps `revision` so
/// consumers can tell that previously rendered context is stale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    project_root: Option<PathBuf>,
    revision: u64,
}

impl SessionContext {
    pub fn new(project_root: Option<PathBuf>) -> Self {
        Self {
            project_root,
            revision: 0,
        }
    }

    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Point the session at a new project root.
    pub fn set_project_root(&mut self, root: PathBuf) {
        self.project_root = Some(root);
        self.revision += 1;
    }

    /// Mark previously rendered context as stale without moving the root.
    pub fn bump(&mut self) {
        self.revision += 1;
    }

    pub fn snapshot(&self, server_state: ServerState) -> SessionSnapshot {
        SessionSnapshot {
            project_root: self.project_root.as_ref().map(|p| p.display().to_string()),
            server_state,
            revision: self.revision,
        }
    }
}

/// Structured dynamic context attached to every provider request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub project_root: Option<String>,
    pub server_state: ServerState,
    pub revision: u64,
}

impl SessionSnapshot {
    /// Plain-text rendering for providers that only take a system prompt.
    pub fn render(&self) -> String {
        let root = self
            .project_root
            .as_deref()
            .unwrap_or("(not set; ask the user or create a project first)");
        format!(
            "## Current Session\n- Active project path: {root}\n- Dev server: {}\n- Context revision: {}",
            self.server_state, self.revision
        )
    }
}
