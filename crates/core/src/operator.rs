//! The human on the other side of the session.

use async_trait::async_trait;

/// Blocking interactions with the human operator.
///
/// Implemented by the terminal front end; tests use scripted answers.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Ask a yes/no question. Does not return until a valid answer is given.
    async fn confirm(&self, prompt: &str) -> bool;

    /// Ask for a free-form answer. `None` when the operator gave nothing.
    async fn ask(&self, prompt: &str) -> Option<String>;
}
