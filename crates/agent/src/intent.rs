//! Keyword-driven rewriting of dev-server requests.
//!
//! Phrases like "stop server" are expanded into an explicit plan naming the
//! tools to call and the confirmations to ask for, before the model sees
//! the message. Matching is a case-insensitive substring search; restart is
//! checked first because its phrases contain the stop and start phrases.

const RESTART_KEYWORDS: &[&str] = &[
    "restart server",
    "restart the server",
    "restart the dev server",
    "stop and start server",
    "bounce server",
    "stop and restart the server",
];

const STOP_KEYWORDS: &[&str] = &[
    "stop server",
    "kill server",
    "terminate server",
    "stop the server",
    "stop the dev server",
];

const SERVE_KEYWORDS: &[&str] = &[
    "run the app",
    "serve the app",
    "start the app",
    "start server",
    "start the server",
    "start the dev server",
    "launch the app",
    "run app",
    "serve app",
];

/// A recognized dev-server intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Restart,
    Stop,
    Serve,
}

/// Classify an utterance, if it matches one of the known phrasings.
pub fn detect(utterance: &str) -> Option<Intent> {
    let lower = utterance.to_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    if matches(RESTART_KEYWORDS) {
        Some(Intent::Restart)
    } else if matches(STOP_KEYWORDS) {
        Some(Intent::Stop)
    } else if matches(SERVE_KEYWORDS) {
        Some(Intent::Serve)
    } else {
        None
    }
}

/// Rewrite `utterance` into an explicit plan when it carries a known intent.
///
/// Anything else is returned unchanged.
pub fn rewrite(utterance: &str, serve_command: &str) -> String {
    match detect(utterance) {
        Some(Intent::Restart) => format!(
            "The user's command is: '{utterance}'. They want to restart the development server. \
             Your plan: \
             1. Call 'ask_user_confirmation' to confirm stopping the current dev server. \
             2. If confirmed, call 'stop_dev_server'. \
             3. Once its result is in (stopped, killed or not running), call \
             'ask_user_confirmation' to confirm starting the dev server. \
             4. If confirmed, call 'start_dev_server' with the command '{serve_command}' in the \
             active project directory."
        ),
        Some(Intent::Stop) => format!(
            "The user's command is: '{utterance}'. They want to stop the development server. \
             First call 'ask_user_confirmation' to confirm stopping the dev server, and if \
             confirmed, call 'stop_dev_server'."
        ),
        Some(Intent::Serve) => format!(
            "The user's command is: '{utterance}'. They want to start the development server. \
             Plan to call 'start_dev_server' with the command '{serve_command}' (add '--open' if \
             that is implied). Follow the command execution policy for confirmations. If no \
             active project path is set, ask the user for it before starting the server."
        ),
        None => utterance.to_string(),
    }
}
