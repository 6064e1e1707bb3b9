//! Terminal plumbing: one shared stdin reader, the human operator, and the
//! live mirror for dev-server output.

use async_trait::async_trait;
use devloop_core::operator::Operator;
use devloop_tools::{OutputSink, OutputStream};
use std::io::{BufRead, Write};
use tokio::sync::{Mutex, mpsc};

/// Line-oriented access to stdin shared by the REPL and the operator.
///
/// A dedicated thread does the blocking reads so an idle prompt never holds
/// up the async runtime.
pub struct Console {
    lines: Mutex<mpsc::Receiver<String>>,
}

impl Console {
    pub fn start() -> Self {
        let (tx, rx) = mpsc::channel(32);
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
        Self {
            lines: Mutex::new(rx),
        }
    }

    /// Print `prompt` and wait for the next line. `None` means stdin closed.
    pub async fn read_line(&self, prompt: &str) -> Option<String> {
        print!("{prompt}");
        std::io::stdout().flush().ok();
        self.lines.lock().await.recv().await
    }
}

/// Asks the person at the terminal.
pub struct TerminalOperator {
    console: std::sync::Arc<Console>,
}

impl TerminalOperator {
    pub fn new(console: std::sync::Arc<Console>) -> Self {
        Self { console }
    }
}

#[async_trait]
impl Operator for TerminalOperator {
    async fn confirm(&self, prompt: &str) -> bool {
        println!();
        println!("  [Confirm] {prompt}");
        loop {
            let Some(answer) = self.console.read_line("  (yes/no) > ").await else {
                return false;
            };
            match answer.trim().to_lowercase().as_str() {
                "y" | "yes" => return true,
                "n" | "no" => return false,
                _ => println!("  Please answer 'yes' or 'no'."),
            }
        }
    }

    async fn ask(&self, prompt: &str) -> Option<String> {
        println!();
        println!("  [Question] {prompt}");
        self.console
            .read_line("  > ")
            .await
            .map(|answer| answer.trim().to_string())
    }
}

/// Mirrors dev-server output to the terminal as it arrives.
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn emit(&self, stream: OutputStream, line: &str) {
        println!("[dev-server {stream}] {line}");
    }
}
