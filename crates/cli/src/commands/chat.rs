//! `devloop chat`: interactive or single-message chat mode.

use crate::console::{Console, ConsoleSink, TerminalOperator};
use devloop_agent::{Session, TurnLoop};
use devloop_config::AppConfig;
use devloop_core::event::{DomainEvent, EventBus};
use devloop_tools::{ProcessSupervisor, SupervisorConfig, default_registry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub async fn run(
    project: Option<PathBuf>,
    message: Option<String>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Warn early; the first model call would fail anyway
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  WARNING: No API key configured.");
        eprintln!("  Set GEMINI_API_KEY, OPENAI_API_KEY or DEVLOOP_API_KEY, or add api_key to:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
    }

    // Build provider from config
    let router = devloop_providers::build_from_config(&config);
    let provider = router.default().ok_or("No default provider configured")?;
    let model = config
        .providers
        .get(&config.default_provider)
        .and_then(|p| p.default_model.clone())
        .unwrap_or_else(|| config.default_model.clone());

    // Dev-server supervision and tools
    let supervisor = Arc::new(ProcessSupervisor::new(
        SupervisorConfig {
            ready_markers: config.server.ready_markers.clone(),
            error_markers: config.server.error_markers.clone(),
            stop_grace: Duration::from_secs(config.server.stop_grace_secs),
            buffer_lines: config.server.output_buffer_lines,
            ..SupervisorConfig::default()
        },
        Arc::new(ConsoleSink),
    ));
    let tools = Arc::new(default_registry(
        supervisor.clone(),
        Duration::from_secs(config.server.monitor_secs),
    ));

    let console = Arc::new(Console::start());
    let operator = Arc::new(TerminalOperator::new(console.clone()));
    let event_bus = Arc::new(EventBus::default());
    let reporter = verbose.then(|| spawn_event_reporter(&event_bus));
    let agent = TurnLoop::new(provider, &model, tools, operator, event_bus)
        .configure(&config)
        .with_supervisor(supervisor.clone());

    let root = project.and_then(|path| {
        if path.is_dir() {
            Some(path.canonicalize().unwrap_or(path))
        } else {
            warn!(path = %path.display(), "Project path is not a directory, ignoring it");
            None
        }
    });
    let mut session = Session::new(root).with_max_fix_attempts(config.agent.max_fix_attempts);

    if let Some(msg) = message {
        // Single message mode
        respond(&agent, &mut session, &msg).await;
    } else {
        println!();
        println!("  devloop interactive mode");
        println!();
        println!("  Provider:  {}", config.default_provider);
        println!("  Model:     {model}");
        match session.context.project_root() {
            Some(root) => println!("  Project:   {}", root.display()),
            None => println!("  Project:   (not set)"),
        }
        println!();
        println!("  Type your message and press Enter.");
        println!("  Type '/reset' to start over, 'exit' to quit.");
        println!();

        while let Some(line) = console.read_line("  You > ").await {
            let line = line.trim();
            match line {
                "" => continue,
                "exit" | "quit" | "/exit" | "/quit" | ":q" => break,
                "/reset" => {
                    session.reset();
                    println!("  Conversation cleared.");
                    println!();
                    continue;
                }
                _ => respond(&agent, &mut session, line).await,
            }
        }

        println!();
        println!("  Goodbye!");
        println!();
    }

    supervisor.shutdown().await;
    if let Some(reporter) = reporter {
        reporter.abort();
    }
    Ok(())
}

/// Print loop events worth a human's attention as they happen.
fn spawn_event_reporter(bus: &EventBus) -> JoinHandle<()> {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = describe(&event) {
                        eprintln!("  [{line}]");
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Event reporter lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn describe(event: &DomainEvent) -> Option<String> {
    match event {
        DomainEvent::RecoveryAttempt { tool_name, command, attempt, ceiling, .. } => Some(format!(
            "{tool_name} '{command}' failed, automatic fix attempt {attempt}/{ceiling}"
        )),
        DomainEvent::RecoveryExhausted { command, ceiling, .. } => Some(format!(
            "'{command}' still failing after {ceiling} fix attempts, over to you"
        )),
        DomainEvent::ProjectRootChanged { path, .. } => Some(format!("Active project is now {path}")),
        DomainEvent::RoundLimitReached { rounds, .. } => {
            Some(format!("Stopped after {rounds} tool rounds"))
        }
        DomainEvent::ToolDispatched { tool_name, success, duration_ms, .. } => Some(format!(
            "{tool_name} {} in {duration_ms}ms",
            if *success { "ok" } else { "failed" }
        )),
        DomainEvent::ResponseReceived { .. } | DomainEvent::ErrorOccurred { .. } => None,
    }
}


/// Run one user turn and print the outcome; errors leave the session usable.
async fn respond(agent: &TurnLoop, session: &mut Session, input: &str) {
    eprint!("  ...");
    match agent.process(session, input).await {
        Ok(outcome) => {
            eprint!("\r     \r");
            println!();
            if outcome.text.trim().is_empty() {
                println!("  Assistant > (no text response)");
            }
            for line in outcome.text.lines() {
                println!("  Assistant > {line}");
            }
            println!();
        }
        Err(e) => {
            eprint!("\r     \r");
            eprintln!("  [Error] {e}");
            println!();
        }
    }
}
