//! # devloop Core
//!
//! Domain types, traits, and error definitions for the devloop tool-calling
//! agent. This crate has **no runtime framework dependencies**; it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here (`Provider`, `Tool`, `Operator`).
//! Implementations live in their respective crates, which keeps the
//! dependency graph pointing inward and lets tests swap in scripted stand-ins.

pub mod error;
pub mod event;
pub mod message;
pub mod operator;
pub mod provider;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Part, Role, ToolCallRequest, ToolCallResult, Transcript, TranscriptId, Turn};
pub use operator::Operator;
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use session::{ServerState, SessionContext, SessionSnapshot};
pub use tool::{Arguments, ParamKind, Parameter, Tool, ToolContext, ToolRegistry, ToolResult};
