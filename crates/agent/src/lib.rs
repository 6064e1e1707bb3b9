//! The turn loop of devloop.
//!
//! For every user utterance the loop:
//!
//! 1. **Rewrites** recognized dev-server intents into an explicit plan
//! 2. **Sends** the transcript, tool schemas and a session snapshot to the model
//! 3. **Dispatches** requested tool calls one at a time, in order
//! 4. **Tracks** failing commands and frames bounded automatic fix attempts
//! 5. **Feeds** one tool-result turn back and loops to step 2
//!
//! The loop ends when the model answers with text only, or when the
//! per-turn round cap is reached.

pub mod instructions;
pub mod intent;
pub mod loop_runner;
pub mod project;
pub mod recovery;
pub mod session;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use instructions::standing_instructions;
pub use intent::Intent;
pub use loop_runner::{LoopState, ROUND_LIMIT_NOTICE, TurnLoop, TurnOutcome};
pub use project::ProjectCreation;
pub use recovery::{ErrorRecoveryTracker, RecoveryOutcome};
pub use session::Session;
