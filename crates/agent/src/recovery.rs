//! Bounded automatic recovery for failing commands.
//!
//! The tracker follows exactly one failing command string at a time. Each
//! consecutive failure of that command counts as one automatic fix attempt;
//! once the ceiling is used up the tracker is dropped and the failure is left
//! for the user to resolve.

use serde_json::{Value, json};

/// Default number of automatic fix attempts per failing command.
pub const DEFAULT_MAX_FIX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TrackedFailure {
    command: String,
    tool: String,
    attempts: u32,
}

/// What the tracker decided about one command result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Nothing to do with the tracked command
    Untracked,
    /// The model may try another automatic fix
    Retry { attempt: u32, ceiling: u32 },
    /// The ceiling was hit; the tracker has been dropped
    Exhausted { ceiling: u32 },
    /// The tracked command succeeded; the tracker has been cleared
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecoveryTracker {
    ceiling: u32,
    tracked: Option<TrackedFailure>,
}

impl ErrorRecoveryTracker {
    pub fn new(ceiling: u32) -> Self {
        Self {
            ceiling: ceiling.max(1),
            tracked: None,
        }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Attempts used so far for the tracked command (0 when idle).
    pub fn attempts(&self) -> u32 {
        self.tracked.as_ref().map_or(0, |t| t.attempts)
    }

    pub fn tracked_command(&self) -> Option<&str> {
        self.tracked.as_ref().map(|t| t.command.as_str())
    }

    /// The tool that ran the tracked command.
    pub fn tracked_tool(&self) -> Option<&str> {
        self.tracked.as_ref().map(|t| t.tool.as_str())
    }

    /// Record a failure of `command` run through `tool`.
    pub fn record_failure(&mut self, tool: &str, command: &str) -> RecoveryOutcome {
        match &mut self.tracked {
            Some(tracked) if tracked.command == command => {
                if tracked.attempts >= self.ceiling {
                    self.tracked = None;
                    RecoveryOutcome::Exhausted {
                        ceiling: self.ceiling,
                    }
                } else {
                    tracked.attempts += 1;
                    RecoveryOutcome::Retry {
                        attempt: tracked.attempts,
                        ceiling: self.ceiling,
                    }
                }
            }
            _ => {
                self.tracked = Some(TrackedFailure {
                    command: command.to_string(),
                    tool: tool.to_string(),
                    attempts: 1,
                });
                RecoveryOutcome::Retry {
                    attempt: 1,
                    ceiling: self.ceiling,
                }
            }
        }
    }

    /// Record a success of `command`; clears the tracker if it matches.
    pub fn record_success(&mut self, command: &str) -> RecoveryOutcome {
        if self.tracked_command() == Some(command) {
            self.tracked = None;
            RecoveryOutcome::Resolved
        } else {
            RecoveryOutcome::Untracked
        }
    }

    pub fn clear(&mut self) {
        self.tracked = None;
    }
}

impl Default for ErrorRecoveryTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FIX_ATTEMPTS)
    }
}

/// Attach recovery framing to a tool payload so the model knows whether to
/// keep fixing or hand the failure to the user.
pub fn annotate(payload: &mut Value, outcome: RecoveryOutcome) {
    let recovery = match outcome {
        RecoveryOutcome::Retry { attempt, ceiling } => json!({
            "attempt": attempt,
            "max_attempts": ceiling,
            "instruction": format!(
                "This command failed (automatic fix attempt {attempt} of {ceiling}). \
                 Analyze stderr, read the files involved, propose a concrete fix, confirm it \
                 with the user before writing, then re-run the same command."
            ),
        }),
        RecoveryOutcome::Exhausted { ceiling } => json!({
            "exhausted": true,
            "instruction": format!(
                "This command has failed after {ceiling} automatic fix attempts. Do not retry it. \
                 Explain the error to the user and ask how they want to proceed."
            ),
        }),
        RecoveryOutcome::Untracked | RecoveryOutcome::Resolved => return,
    };

    if let Some(object) = payload.as_object_mut() {
        object.insert("recovery".into(), recovery);
    }
}
