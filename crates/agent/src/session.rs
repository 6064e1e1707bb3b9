//! Per-conversation state owned by the control loop.

use crate::recovery::ErrorRecoveryTracker;
use devloop_core::message::Transcript;
use devloop_core::session::SessionContext;
use std::path::PathBuf;

/// Everything one interactive session carries between user turns.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Ordered history of user, model and tool-result turns
    pub transcript: Transcript,

    /// Active project root and its revision
    pub context: SessionContext,

    /// The command currently being fixed automatically, if any
    pub recovery: ErrorRecoveryTracker,
}

impl Session {
    pub fn new(project_root: Option<PathBuf>) -> Self {
        Self {
            transcript: Transcript::new(),
            context: SessionContext::new(project_root),
            recovery: ErrorRecoveryTracker::default(),
        }
    }

    /// Set the automatic fix ceiling for failing commands.
    pub fn with_max_fix_attempts(mut self, ceiling: u32) -> Self {
        self.recovery = ErrorRecoveryTracker::new(ceiling);
        self
    }

    /// Start a fresh conversation in the same project.
    ///
    /// The transcript is emptied and the context revision moves forward so
    /// the next request is rendered against a clean slate.
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.context.bump();
        self.recovery.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devloop_core::message::Turn;

    #[test]
    fn reset_clears_transcript_and_bumps_revision() {
        let mut session = Session::new(Some(PathBuf::from("/tmp/app"))).with_max_fix_attempts(2);
        session.transcript.push(Turn::user("hello"));
        session.recovery.record_failure("run_command", "ng build");
        let old_id = session.transcript.id.clone();

        session.reset();

        assert!(session.transcript.is_empty());
        assert_ne!(session.transcript.id, old_id);
        assert_eq!(session.context.revision(), 1);
        assert_eq!(session.recovery.attempts(), 0);
        assert_eq!(session.recovery.ceiling(), 2);
        assert_eq!(
            session.context.project_root(),
            Some(std::path::Path::new("/tmp/app"))
        );
    }
}
