//! Process supervisor — the single background dev-server slot.
//!
//! Starting spawns `sh -c <command>` in its own process group with both
//! output streams piped. Two reader tasks live as long as the process: each
//! mirrors lines to an [`OutputSink`] and pushes them into a bounded buffer
//! that the control side drains without blocking.
//!
//! Slot lifecycle: `Idle → Starting → Compiling → {Ready | Failed}`,
//! `Compiling | Ready | Failed → Stopping → Idle`.

use devloop_core::error::ToolError;
use devloop_core::session::ServerState;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("STDOUT"),
            OutputStream::Stderr => f.write_str("STDERR"),
        }
    }
}

/// Live mirror for dev-server output.
pub trait OutputSink: Send + Sync {
    fn emit(&self, stream: OutputStream, line: &str);
}

/// Sink that forwards lines to `tracing` at debug level.
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn emit(&self, stream: OutputStream, line: &str) {
        debug!(stream = %stream, "{line}");
    }
}

/// Tunables for supervision.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Case-insensitive substrings meaning the server is ready
    pub ready_markers: Vec<String>,
    /// Substrings on stderr meaning startup failed
    pub error_markers: Vec<String>,
    /// Time between terminate and kill
    pub stop_grace: Duration,
    /// Lines retained per stream
    pub buffer_lines: usize,
    /// How often the monitoring window polls the buffers
    pub poll_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            ready_markers: vec!["Compiled successfully".into(), "successfully built".into()],
            error_markers: vec!["ERROR".into(), "Error".into()],
            stop_grace: Duration::from_secs(5),
            buffer_lines: 2000,
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// Outcome of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartStatus {
    /// No monitoring was requested; the build is in progress
    Compiling,
    /// A ready marker was seen
    Compiled,
    /// An error marker was seen or the process exited early
    Error,
    /// The window elapsed with no verdict; the process keeps running
    Timeout,
    /// The slot was occupied; nothing was spawned
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    Stopped,
    Killed,
    NotRunning,
}

#[derive(Debug, Clone)]
pub struct StartReport {
    pub status: StartStatus,
    pub pid: Option<u32>,
    pub message: String,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StopReport {
    pub status: StopStatus,
    pub message: String,
}

/// Bounded line buffer shared between a reader task and the control side.
struct LineBuffer {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl LineBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    fn drain(&self) -> Vec<String> {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.drain(..).collect()
    }
}

struct ServerProcess {
    child: Child,
    pid: u32,
    command: String,
    working_dir: PathBuf,
    stdout: Arc<LineBuffer>,
    stderr: Arc<LineBuffer>,
    readers: Vec<JoinHandle<()>>,
}

impl ServerProcess {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn abort_readers(&self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

/// Owner of the single background process slot.
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    sink: Arc<dyn OutputSink>,
    slot: tokio::sync::Mutex<Option<ServerProcess>>,
    state: Mutex<ServerState>,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            config,
            sink,
            slot: tokio::sync::Mutex::new(None),
            state: Mutex::new(ServerState::Idle),
        }
    }

    /// Current slot state.
    ///
    /// A process that exited on its own since the last start or stop frees
    /// the slot here, so callers never see a dead server reported as live.
    /// While a start or stop holds the slot, the recorded state is returned.
    pub fn state(&self) -> ServerState {
        let state = *self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.is_live() {
            return state;
        }
        let Ok(mut slot) = self.slot.try_lock() else {
            return state;
        };
        if slot.as_mut().is_some_and(|p| !p.is_alive()) {
            if let Some(process) = slot.take() {
                info!(pid = process.pid, "Dev server exited on its own");
                process.abort_readers();
            }
            self.set_state(ServerState::Idle);
            return ServerState::Idle;
        }
        state
    }

    fn set_state(&self, state: ServerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Start `command` in `working_dir` and watch it for up to `monitor`.
    ///
    /// Returns `AlreadyRunning` (never spawning) while a previous process is
    /// alive. A zero `monitor` returns `Compiling` right after spawning.
    pub async fn start(
        &self,
        command: &str,
        working_dir: &Path,
        monitor: Duration,
    ) -> Result<StartReport, ToolError> {
        let mut slot = self.slot.lock().await;

        if let Some(existing) = slot.as_mut() {
            if existing.is_alive() {
                return Ok(StartReport {
                    status: StartStatus::AlreadyRunning,
                    pid: Some(existing.pid),
                    message: format!(
                        "A dev server is already running (PID: {}, command: '{}', in {}). Stop it before starting another.",
                        existing.pid,
                        existing.command,
                        existing.working_dir.display()
                    ),
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                });
            }
            debug!(pid = existing.pid, "Clearing exited dev server from slot");
            existing.abort_readers();
            *slot = None;
        }

        self.set_state(ServerState::Starting);
        let mut process = match self.spawn(command, working_dir) {
            Ok(process) => process,
            Err(e) => {
                self.set_state(ServerState::Idle);
                return Err(e);
            }
        };
        let pid = process.pid;
        info!(pid, command = %command, dir = %working_dir.display(), "Dev server started");
        self.set_state(ServerState::Compiling);

        if monitor.is_zero() {
            *slot = Some(process);
            return Ok(StartReport {
                status: StartStatus::Compiling,
                pid: Some(pid),
                message: format!("'{command}' started (PID: {pid}). Output is streaming to the terminal."),
                stdout: Vec::new(),
                stderr: Vec::new(),
            });
        }

        let report = self.monitor(&mut process, command, monitor).await;
        match report.status {
            StartStatus::Compiled => self.set_state(ServerState::Ready),
            StartStatus::Error => self.set_state(ServerState::Failed),
            _ => {}
        }

        if process.is_alive() {
            *slot = Some(process);
        } else {
            process.abort_readers();
            self.set_state(ServerState::Idle);
        }
        Ok(report)
    }

    fn spawn(&self, command: &str, working_dir: &Path) -> Result<ServerProcess, ToolError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| ToolError::ExecutionFailed {
            tool_name: "start_dev_server".into(),
            reason: format!("Could not start '{command}' in '{}': {e}", working_dir.display()),
        })?;
        let pid = child.id().unwrap_or_default();

        let stdout = Arc::new(LineBuffer::new(self.config.buffer_lines));
        let stderr = Arc::new(LineBuffer::new(self.config.buffer_lines));
        let mut readers = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(self.spawn_reader(out, OutputStream::Stdout, stdout.clone()));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(self.spawn_reader(err, OutputStream::Stderr, stderr.clone()));
        }

        Ok(ServerProcess {
            child,
            pid,
            command: command.to_string(),
            working_dir: working_dir.to_path_buf(),
            stdout,
            stderr,
            readers,
        })
    }

    fn spawn_reader<R>(&self, pipe: R, stream: OutputStream, buffer: Arc<LineBuffer>) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(pipe).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        sink.emit(stream, &line);
                        buffer.push(line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let message = format!("[{stream} ERROR] Error reading output: {e}");
                        sink.emit(stream, &message);
                        buffer.push(message);
                        break;
                    }
                }
            }
        })
    }

    async fn monitor(&self, process: &mut ServerProcess, command: &str, window: Duration) -> StartReport {
        let deadline = Instant::now() + window;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut status = None;

        while Instant::now() < deadline {
            let out = process.stdout.drain();
            let err = process.stderr.drain();

            if out.iter().chain(err.iter()).any(|l| self.is_ready_line(l)) {
                status = Some(StartStatus::Compiled);
            } else if err.iter().any(|l| self.is_error_line(l)) {
                status = Some(StartStatus::Error);
            }
            stdout.extend(out);
            stderr.extend(err);

            if status.is_some() {
                break;
            }
            if !process.is_alive() {
                // Let the readers hit EOF so nothing printed before exit is lost
                for reader in process.readers.iter_mut() {
                    let _ = tokio::time::timeout(Duration::from_secs(1), reader).await;
                }
                status = Some(StartStatus::Error);
                break;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        // Final drain
        stdout.extend(process.stdout.drain());
        stderr.extend(process.stderr.drain());

        let pid = process.pid;
        let secs = window.as_secs();
        let (status, message) = match status {
            Some(StartStatus::Compiled) => (
                StartStatus::Compiled,
                format!("'{command}' started (PID: {pid}). Initial compilation reported as successful. Ongoing logs stream to the terminal."),
            ),
            Some(_) if !process.is_alive() => {
                let code = process
                    .child
                    .try_wait()
                    .ok()
                    .flatten()
                    .and_then(|s| s.code())
                    .map_or_else(|| "unknown".to_string(), |c| c.to_string());
                warn!(pid, exit_code = %code, "Dev server exited during startup");
                (
                    StartStatus::Error,
                    format!("'{command}' exited during startup (exit code: {code}). See the captured output."),
                )
            }
            Some(_) => {
                warn!(pid, "Dev server reported an error during startup");
                (
                    StartStatus::Error,
                    format!("'{command}' (PID: {pid}) reported an error during startup. It is still running; see the captured output."),
                )
            }
            None => (
                StartStatus::Timeout,
                format!("'{command}' (PID: {pid}) is still compiling after {secs}s of monitoring. It keeps running in the background; watch the terminal for further output."),
            ),
        };

        StartReport {
            status,
            pid: Some(pid),
            message,
            stdout,
            stderr,
        }
    }

    fn is_ready_line(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.config
            .ready_markers
            .iter()
            .any(|m| lower.contains(&m.to_lowercase()))
    }

    fn is_error_line(&self, line: &str) -> bool {
        self.config.error_markers.iter().any(|m| line.contains(m.as_str()))
    }

    /// Terminate the running process, escalating to kill after the grace period.
    pub async fn stop(&self) -> StopReport {
        let mut slot = self.slot.lock().await;
        let Some(mut process) = slot.take() else {
            return StopReport {
                status: StopStatus::NotRunning,
                message: "No dev server is currently running.".into(),
            };
        };

        if !process.is_alive() {
            process.abort_readers();
            self.set_state(ServerState::Idle);
            return StopReport {
                status: StopStatus::NotRunning,
                message: format!("The dev server (PID: {}) had already exited.", process.pid),
            };
        }

        self.set_state(ServerState::Stopping);
        let pid = process.pid;
        info!(pid, "Terminating dev server");
        terminate(&mut process);

        let report = match tokio::time::timeout(self.config.stop_grace, process.child.wait()).await {
            Ok(_) => StopReport {
                status: StopStatus::Stopped,
                message: format!("Dev server (PID: {pid}) terminated successfully."),
            },
            Err(_) => {
                warn!(pid, "Dev server ignored terminate, killing");
                force_kill(&mut process).await;
                StopReport {
                    status: StopStatus::Killed,
                    message: format!("Dev server (PID: {pid}) did not exit in time and was killed."),
                }
            }
        };

        process.abort_readers();
        self.set_state(ServerState::Idle);
        report
    }

    /// Session teardown: stop whatever is running.
    pub async fn shutdown(&self) {
        let report = self.stop().await;
        if report.status != StopStatus::NotRunning {
            info!(status = ?report.status, "Dev server shut down");
        }
    }
}

#[cfg(unix)]
fn terminate(process: &mut ServerProcess) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(process.pid as i32), Signal::SIGTERM) {
        debug!(pid = process.pid, error = %e, "SIGTERM to process group failed");
    }
}

#[cfg(not(unix))]
fn terminate(process: &mut ServerProcess) {
    let _ = process.child.start_kill();
}

async fn force_kill(process: &mut ServerProcess) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;
        let _ = killpg(Pid::from_raw(process.pid as i32), Signal::SIGKILL);
    }
    if let Err(e) = process.child.kill().await {
        debug!(pid = process.pid, error = %e, "Kill after grace period failed");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CollectingSink {
        lines: Mutex<Vec<String>>,
    }

    impl OutputSink for CollectingSink {
        fn emit(&self, stream: OutputStream, line: &str) {
            self.lines.lock().unwrap().push(format!("[{stream}] {line}"));
        }
    }

    fn supervisor(config: SupervisorConfig) -> (ProcessSupervisor, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        (ProcessSupervisor::new(config, sink.clone()), sink)
    }

    fn quick_config() -> SupervisorConfig {
        SupervisorConfig {
            stop_grace: Duration::from_secs(2),
            poll_interval: Duration::from_millis(50),
            ..SupervisorConfig::default()
        }
    }

    #[tokio::test]
    async fn ready_marker_ends_monitoring_early() {
        let dir = tempfile::tempdir().unwrap();
        let (sup, sink) = supervisor(quick_config());

        let started = std::time::Instant::now();
        let report = sup
            .start("echo 'Compiled successfully.'; sleep 30", dir.path(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(report.status, StartStatus::Compiled);
        assert!(report.pid.is_some());
        assert!(started.elapsed() < Duration::from_secs(8));
        assert!(report.stdout.iter().any(|l| l.contains("Compiled successfully")));
        assert_eq!(sup.state(), ServerState::Ready);
        assert!(sink.lines.lock().unwrap().iter().any(|l| l.starts_with("[STDOUT]")));

        let stop = sup.stop().await;
        assert_eq!(stop.status, StopStatus::Stopped);
        assert_eq!(sup.state(), ServerState::Idle);
    }

    #[tokio::test]
    async fn second_start_reports_already_running() {
        let dir = tempfile::tempdir().unwrap();
        let (sup, _) = supervisor(quick_config());

        let first = sup.start("sleep 30", dir.path(), Duration::ZERO).await.unwrap();
        assert_eq!(first.status, StartStatus::Compiling);

        let second = sup.start("sleep 30", dir.path(), Duration::ZERO).await.unwrap();
        assert_eq!(second.status, StartStatus::AlreadyRunning);
        assert_eq!(second.pid, first.pid);

        sup.shutdown().await;
        assert_eq!(sup.state(), ServerState::Idle);
    }

    #[tokio::test]
    async fn stop_without_process_is_not_running() {
        let (sup, _) = supervisor(quick_config());
        let report = sup.stop().await;
        assert_eq!(report.status, StopStatus::NotRunning);
        let again = sup.stop().await;
        assert_eq!(again.status, StopStatus::NotRunning);
    }

    #[tokio::test]
    async fn stderr_error_marker_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let (sup, _) = supervisor(quick_config());

        let report = sup
            .start("echo 'ERROR in src/main.ts' 1>&2; sleep 30", dir.path(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(report.status, StartStatus::Error);
        assert!(report.stderr.iter().any(|l| l.contains("ERROR in src/main.ts")));
        assert_eq!(sup.state(), ServerState::Failed);

        // Still alive, so it must be stopped explicitly
        assert_eq!(sup.stop().await.status, StopStatus::Stopped);
    }

    #[tokio::test]
    async fn early_exit_is_an_error_and_frees_the_slot() {
        let dir = tempfile::tempdir().unwrap();
        let (sup, _) = supervisor(quick_config());

        let report = sup
            .start("echo starting; exit 3", dir.path(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(report.status, StartStatus::Error);
        assert!(report.message.contains("exit code: 3"));
        assert_eq!(sup.state(), ServerState::Idle);
        assert_eq!(sup.stop().await.status, StopStatus::NotRunning);
    }

    #[tokio::test]
    async fn silent_process_times_out_but_keeps_running() {
        let dir = tempfile::tempdir().unwrap();
        let (sup, _) = supervisor(quick_config());

        let report = sup.start("sleep 30", dir.path(), Duration::from_millis(300)).await.unwrap();
        assert_eq!(report.status, StartStatus::Timeout);
        assert_eq!(sup.state(), ServerState::Compiling);

        let again = sup.start("sleep 30", dir.path(), Duration::ZERO).await.unwrap();
        assert_eq!(again.status, StartStatus::AlreadyRunning);
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn exited_server_reads_as_idle() {
        let dir = tempfile::tempdir().unwrap();
        let (sup, _) = supervisor(quick_config());

        let report = sup.start("sleep 0.3", dir.path(), Duration::ZERO).await.unwrap();
        assert_eq!(report.status, StartStatus::Compiling);
        assert_eq!(sup.state(), ServerState::Compiling);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(sup.state(), ServerState::Idle);
        assert_eq!(sup.stop().await.status, StopStatus::NotRunning);

        // The freed slot accepts a new server
        let again = sup.start("sleep 30", dir.path(), Duration::ZERO).await.unwrap();
        assert_eq!(again.status, StartStatus::Compiling);
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn ignored_terminate_escalates_to_kill() {
        let dir = tempfile::tempdir().unwrap();
        let config = SupervisorConfig {
            ready_markers: vec!["armed".into()],
            stop_grace: Duration::from_millis(500),
            ..quick_config()
        };
        let (sup, _) = supervisor(config);

        let report = sup
            .start("trap '' TERM; echo armed; sleep 30", dir.path(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(report.status, StartStatus::Compiled);

        let stop = sup.stop().await;
        assert_eq!(stop.status, StopStatus::Killed);
        assert_eq!(sup.state(), ServerState::Idle);
    }

    #[tokio::test]
    async fn missing_working_directory_is_spawn_error() {
        let (sup, _) = supervisor(quick_config());
        let result = sup
            .start("sleep 1", Path::new("/nonexistent/devloop/dir"), Duration::ZERO)
            .await;
        assert!(matches!(result, Err(ToolError::ExecutionFailed { .. })));
        assert_eq!(sup.state(), ServerState::Idle);
    }

    #[test]
    fn line_buffer_drops_oldest() {
        let buffer = LineBuffer::new(2);
        buffer.push("a".into());
        buffer.push("b".into());
        buffer.push("c".into());
        assert_eq!(buffer.drain(), vec!["b".to_string(), "c".to_string()]);
        assert!(buffer.drain().is_empty());
    }
}
