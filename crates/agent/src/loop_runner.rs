//! The turn loop: model calls, tool dispatch and error recovery.

use crate::intent;
use crate::project::ProjectCreation;
use crate::recovery::{self, RecoveryOutcome};
use crate::session::Session;
use chrono::Utc;
use devloop_config::AppConfig;
use devloop_core::event::{DomainEvent, EventBus};
use devloop_core::message::{ToolCallRequest, ToolCallResult, Turn};
use devloop_core::operator::Operator;
use devloop_core::provider::{Provider, ProviderRequest, ToolDefinition};
use devloop_core::session::ServerState;
use devloop_core::tool::{ToolContext, ToolRegistry, ToolResult};
use devloop_tools::ProcessSupervisor;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Text returned when a turn is cut off by the round cap.
pub const ROUND_LIMIT_NOTICE: &str = "I've reached the maximum number of tool call rounds for \
    this request and stopped here. Tell me how you'd like to continue.";

/// Where the loop is within one user turn.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    /// The transcript is ready to be sent to the model
    AwaitingModel,
    /// The model asked for these calls, in order
    DispatchingTools(Vec<ToolCallRequest>),
    /// The model answered without tool calls
    Done,
}

/// The result of processing one user utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Text of the final model turn (or the truncation notice)
    pub text: String,

    /// Tool rounds dispatched during this turn
    pub rounds: u32,

    /// Whether the round cap cut the turn short
    pub truncated: bool,
}

/// Orchestrates one session's conversation with the model.
pub struct TurnLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// Human operator for confirmations and questions
    operator: Arc<dyn Operator>,

    /// Static policy text sent with every request
    instructions: String,

    /// Source of the dev-server state, if one is attached
    supervisor: Option<Arc<ProcessSupervisor>>,

    /// Maximum tool rounds per user turn
    max_tool_rounds: u32,

    /// Pause before tool results are sent back
    tool_response_delay: Duration,

    /// Project-creation handling for `run_command`
    project: ProjectCreation,

    /// Serve command used when rewriting serve intents
    serve_command: String,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,
}

impl TurnLoop {
    /// Create a new turn loop.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        operator: Arc<dyn Operator>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.6,
            max_tokens: None,
            tools,
            operator,
            instructions: crate::instructions::standing_instructions("ng new", "ng serve"),
            supervisor: None,
            max_tool_rounds: 25,
            tool_response_delay: Duration::ZERO,
            project: ProjectCreation::new("ng new"),
            serve_command: "ng serve".into(),
            event_bus,
        }
    }

    /// Apply model, agent and project settings from configuration.
    pub fn configure(self, config: &AppConfig) -> Self {
        self.with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_max_tool_rounds(config.agent.max_tool_rounds)
            .with_tool_response_delay(Duration::from_millis(config.agent.tool_response_delay_ms))
            .with_project_commands(&config.project.create_command, &config.project.serve_command)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the maximum number of tool rounds per user turn.
    pub fn with_max_tool_rounds(mut self, max: u32) -> Self {
        self.max_tool_rounds = max.max(1);
        self
    }

    pub fn with_tool_response_delay(mut self, delay: Duration) -> Self {
        self.tool_response_delay = delay;
        self
    }

    /// Report this supervisor's state in every request.
    pub fn with_supervisor(mut self, supervisor: Arc<ProcessSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Set the project-creation and serve commands.
    ///
    /// Both feed the standing instructions, which are rebuilt here.
    pub fn with_project_commands(mut self, create: &str, serve: &str) -> Self {
        self.instructions = crate::instructions::standing_instructions(create, serve);
        self.project = ProjectCreation::new(create);
        self.serve_command = serve.to_string();
        self
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    fn server_state(&self) -> ServerState {
        self.supervisor
            .as_ref()
            .map(|s| s.state())
            .unwrap_or_default()
    }

    fn build_request(&self, session: &Session, tools: &[ToolDefinition]) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            instructions: self.instructions.clone(),
            snapshot: session.context.snapshot(self.server_state()),
            turns: session.transcript.turns().to_vec(),
            tools: tools.to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Process one user utterance.
    ///
    /// Loops between the model and the tools until the model answers without
    /// tool calls or the round cap is hit. Tool failures are handed back to
    /// the model as data; only a provider error ends the turn early, and it
    /// leaves the transcript as it was at that point.
    pub async fn process(
        &self,
        session: &mut Session,
        utterance: &str,
    ) -> Result<TurnOutcome, devloop_core::Error> {
        info!(
            transcript_id = %session.transcript.id,
            turns = session.transcript.len(),
            "Processing user turn"
        );

        let message = intent::rewrite(utterance, &self.serve_command);
        if message != utterance {
            debug!(message = %message, "Rewrote dev-server request");
        }
        session.transcript.push(Turn::user(message));

        let tool_definitions = self.tools.definitions();
        let mut rounds = 0u32;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    let request = self.build_request(session, &tool_definitions);
                    let response = match self.provider.complete(request).await {
                        Ok(response) => response,
                        Err(e) => {
                            warn!(error = %e, "Model call failed, abandoning turn");
                            self.event_bus.publish(DomainEvent::ErrorOccurred {
                                context: "model call".into(),
                                error_message: e.to_string(),
                                timestamp: Utc::now(),
                            });
                            return Err(e.into());
                        }
                    };

                    let calls: Vec<ToolCallRequest> =
                        response.turn.tool_calls().into_iter().cloned().collect();
                    self.event_bus.publish(DomainEvent::ResponseReceived {
                        model: response.model.clone(),
                        tokens_used: response.usage.as_ref().map_or(0, |u| u.total_tokens),
                        tool_calls: calls.len(),
                        timestamp: Utc::now(),
                    });
                    session.transcript.push(response.turn);

                    if calls.is_empty() {
                        LoopState::Done
                    } else {
                        LoopState::DispatchingTools(calls)
                    }
                }

                LoopState::DispatchingTools(calls) => {
                    if rounds >= self.max_tool_rounds {
                        return Ok(self.truncate(session, &calls, rounds));
                    }
                    rounds += 1;
                    debug!(round = rounds, tool_count = calls.len(), "Dispatching tool calls");

                    let mut results = Vec::with_capacity(calls.len());
                    for call in &calls {
                        results.push(self.dispatch(session, call).await);
                    }
                    session.transcript.push(Turn::tool_results(results));

                    if !self.tool_response_delay.is_zero() {
                        tokio::time::sleep(self.tool_response_delay).await;
                    }
                    LoopState::AwaitingModel
                }

                LoopState::Done => break,
            };
        }

        let text = session.transcript.last().map(Turn::text).unwrap_or_default();
        Ok(TurnOutcome {
            text,
            rounds,
            truncated: false,
        })
    }

    /// Dispatch one call and turn its result into a transcript part.
    async fn dispatch(&self, session: &mut Session, call: &ToolCallRequest) -> ToolCallResult {
        debug!(tool = %call.name, call_id = %call.id, "Model requested tool");
        let ctx = ToolContext::new(
            session.context.project_root().map(|p| p.to_path_buf()),
            self.operator.clone(),
        );

        let start = Instant::now();
        let mut result = if self.project.applies(call) {
            let outcome = self.project.run(&self.tools, &ctx, call, &mut session.context).await;
            if let Some(root) = &outcome.new_root {
                self.event_bus.publish(DomainEvent::ProjectRootChanged {
                    path: root.display().to_string(),
                    revision: session.context.revision(),
                    timestamp: Utc::now(),
                });
            }
            outcome.result
        } else {
            self.tools.dispatch(&ctx, call).await
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        self.event_bus.publish(DomainEvent::ToolDispatched {
            tool_name: call.name.clone(),
            success: result.success,
            duration_ms,
            timestamp: Utc::now(),
        });

        self.track_recovery(session, &call.name, &mut result);

        ToolCallResult {
            call_id: call.id.clone(),
            name: call.name.clone(),
            payload: result.payload,
        }
    }

    /// Feed a command result to the recovery tracker and frame the payload.
    fn track_recovery(&self, session: &mut Session, tool: &str, result: &mut ToolResult) {
        let Some(command) = result.command.as_deref() else {
            return;
        };

        let outcome = if result.success {
            session.recovery.record_success(command)
        } else {
            session.recovery.record_failure(tool, command)
        };

        match outcome {
            RecoveryOutcome::Retry { attempt, ceiling } => {
                let tool_name = session.recovery.tracked_tool().unwrap_or(tool).to_string();
                info!(tool = %tool_name, command = %command, attempt, ceiling, "Command failed, automatic fix allowed");
                self.event_bus.publish(DomainEvent::RecoveryAttempt {
                    tool_name,
                    command: command.to_string(),
                    attempt,
                    ceiling,
                    timestamp: Utc::now(),
                });
            }
            RecoveryOutcome::Exhausted { ceiling } => {
                warn!(command = %command, ceiling, "Automatic fix attempts exhausted");
                self.event_bus.publish(DomainEvent::RecoveryExhausted {
                    command: command.to_string(),
                    ceiling,
                    timestamp: Utc::now(),
                });
            }
            RecoveryOutcome::Resolved => {
                info!(command = %command, "Previously failing command now succeeds");
            }
            RecoveryOutcome::Untracked => {}
        }

        recovery::annotate(&mut result.payload, outcome);
    }

    /// Stop at the round cap without leaving calls unanswered.
    fn truncate(&self, session: &mut Session, calls: &[ToolCallRequest], rounds: u32) -> TurnOutcome {
        warn!(rounds, "Max tool rounds reached, cutting the turn short");
        self.event_bus.publish(DomainEvent::RoundLimitReached {
            rounds,
            timestamp: Utc::now(),
        });

        let skipped = calls
            .iter()
            .map(|call| ToolCallResult {
                call_id: call.id.clone(),
                name: call.name.clone(),
                payload: json!({ "error": "Not executed: tool round limit reached." }),
            })
            .collect();
        session.transcript.push(Turn::tool_results(skipped));
        session.transcript.push(Turn::model_text(ROUND_LIMIT_NOTICE));

        TurnOutcome {
            text: ROUND_LIMIT_NOTICE.to_string(),
            rounds,
            truncated: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        ScriptedOperator, SequentialMockProvider, call, make_text_response, make_tool_call_response,
    };
    use async_trait::async_trait;
    use devloop_core::error::{ProviderError, ToolError};
    use devloop_core::message::Role;
    use devloop_core::tool::{Arguments, ParamKind, Parameter, Tool};
    use serde_json::json;
    use std::sync::Mutex;

    /// Records call order; fails when asked to.
    struct RecordingTool {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for RecordingTool {
        fn name(&self) -> &str {
            "record"
        }

        fn description(&self) -> &str {
            "Records the label it was called with"
        }

        fn parameters(&self) -> Vec<Parameter> {
            vec![Parameter::required("label", ParamKind::String, "Label to record")]
        }

        async fn execute(&self, _ctx: &ToolContext, args: &Arguments) -> Result<ToolResult, ToolError> {
            let label = args["label"].as_str().unwrap_or_default().to_string();
            self.seen.lock().unwrap().push(label.clone());
            Ok(ToolResult::ok(json!({ "label": label })))
        }
    }

    /// Pretends to run a command; exit code comes from the arguments.
    struct FakeCommandTool;

    #[async_trait]
    impl Tool for FakeCommandTool {
        fn name(&self) -> &str {
            "run_command"
        }

        fn description(&self) -> &str {
            "Fake command runner"
        }

        fn parameters(&self) -> Vec<Parameter> {
            vec![
                Parameter::required("command", ParamKind::String, "Command"),
                Parameter::optional("exit_code", ParamKind::Integer, "Exit code to report"),
            ]
        }

        async fn execute(&self, _ctx: &ToolContext, args: &Arguments) -> Result<ToolResult, ToolError> {
            let command = args["command"].as_str().unwrap_or_default().to_string();
            let code = args.get("exit_code").and_then(|v| v.as_i64()).unwrap_or(0);
            let payload = json!({ "stdout": "", "stderr": "", "exit_code": code });
            let result = if code == 0 {
                ToolResult::ok(payload)
            } else {
                ToolResult::failed(payload)
            };
            Ok(result.with_command(command))
        }
    }

    fn turn_loop(provider: Arc<SequentialMockProvider>, tools: ToolRegistry) -> TurnLoop {
        TurnLoop::new(
            provider,
            "mock-model",
            Arc::new(tools),
            Arc::new(ScriptedOperator::new(vec![], vec![])),
            Arc::new(EventBus::default()),
        )
    }

    #[tokio::test]
    async fn simple_text_response() {
        let provider = Arc::new(SequentialMockProvider::single_text("Hello! How can I help?"));
        let agent = turn_loop(provider.clone(), ToolRegistry::new());
        let mut session = Session::new(None);

        let outcome = agent.process(&mut session, "Hello!").await.unwrap();
        assert_eq!(outcome.text, "Hello! How can I help?");
        assert_eq!(outcome.rounds, 0);
        assert!(!outcome.truncated);
        // User + Model = 2 turns
        assert_eq!(session.transcript.len(), 2);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn results_preserve_call_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(RecordingTool { seen: seen.clone() }));

        let calls = vec![
            call("record", json!({"label": "a"})),
            call("record", json!({"label": "b"})),
            call("record", json!({"label": "c"})),
        ];
        let ids: Vec<String> = calls.iter().map(|c| c.id.clone()).collect();
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(calls),
            make_text_response("done"),
        ]));
        let agent = turn_loop(provider, tools);
        let mut session = Session::new(None);

        let outcome = agent.process(&mut session, "go").await.unwrap();
        assert_eq!(outcome.text, "done");
        assert_eq!(outcome.rounds, 1);
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);

        let tool_turn = &session.transcript.turns()[2];
        assert_eq!(tool_turn.role, Role::ToolResult);
        let result_ids: Vec<&str> = tool_turn.results().iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(result_ids, ids);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_result_payload() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![call("teleport", json!({}))]),
            make_text_response("That tool doesn't exist."),
        ]));
        let agent = turn_loop(provider, ToolRegistry::new());
        let mut session = Session::new(None);

        let outcome = agent.process(&mut session, "teleport me").await.unwrap();
        assert_eq!(outcome.text, "That tool doesn't exist.");
        let result = session.transcript.turns()[2].results()[0].clone();
        assert_eq!(result.payload["error"], "Unknown tool: teleport");
    }

    #[tokio::test]
    async fn each_request_sees_the_whole_transcript() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![call("teleport", json!({}))]),
            make_text_response("ok"),
        ]));
        let agent = turn_loop(provider.clone(), ToolRegistry::new());
        let mut session = Session::new(None);
        agent.process(&mut session, "hi").await.unwrap();

        let requests = provider.requests();
        assert_eq!(requests[0].turns.len(), 1);
        assert_eq!(requests[1].turns.len(), 3);
        assert!(requests[1].turns[1].has_tool_calls());
        assert_eq!(requests[1].tools.len(), 0);
        assert!(requests[0].instructions.contains("COMMAND EXECUTION POLICY"));
    }

    #[tokio::test]
    async fn round_cap_truncates_and_answers_pending_calls() {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(RecordingTool {
            seen: Arc::new(Mutex::new(Vec::new())),
        }));
        let responses = (0..3)
            .map(|i| make_tool_call_response(vec![call("record", json!({"label": i.to_string()}))]))
            .collect();
        let provider = Arc::new(SequentialMockProvider::new(responses));
        let agent = turn_loop(provider.clone(), tools).with_max_tool_rounds(2);
        let mut session = Session::new(None);

        let mut events = agent.event_bus.subscribe();
        let outcome = agent.process(&mut session, "loop forever").await.unwrap();

        assert!(outcome.truncated);
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.text, ROUND_LIMIT_NOTICE);
        assert_eq!(provider.call_count(), 3);
        assert!(session.transcript.pending_calls().is_empty());
        assert_eq!(session.transcript.last().unwrap().text(), ROUND_LIMIT_NOTICE);

        let mut saw_limit = false;
        while let Ok(event) = events.try_recv() {
            if let DomainEvent::RoundLimitReached { rounds, .. } = event.as_ref() {
                assert_eq!(*rounds, 2);
                saw_limit = true;
            }
        }
        assert!(saw_limit);
    }

    #[tokio::test]
    async fn failing_command_carries_recovery_framing() {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(FakeCommandTool));
        let failing = || call("run_command", json!({"command": "ng build", "exit_code": 1}));
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![failing()]),
            make_tool_call_response(vec![failing()]),
            make_text_response("Still broken."),
        ]));
        let agent = turn_loop(provider, tools);
        let mut session = Session::new(None);

        let mut events = agent.event_bus.subscribe();
        agent.process(&mut session, "build it").await.unwrap();

        let mut attempts = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let DomainEvent::RecoveryAttempt { tool_name, attempt, .. } = event.as_ref() {
                assert_eq!(tool_name, "run_command");
                attempts.push(*attempt);
            }
        }
        assert_eq!(attempts, vec![1, 2]);

        let first = &session.transcript.turns()[2].results()[0].payload;
        let second = &session.transcript.turns()[4].results()[0].payload;
        assert_eq!(first["recovery"]["attempt"], 1);
        assert_eq!(second["recovery"]["attempt"], 2);
        assert_eq!(second["recovery"]["max_attempts"], 3);
        assert_eq!(session.recovery.tracked_command(), Some("ng build"));
    }

    #[tokio::test]
    async fn success_clears_tracked_failure() {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(FakeCommandTool));
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![call(
                "run_command",
                json!({"command": "npm test", "exit_code": 2}),
            )]),
            make_tool_call_response(vec![call("run_command", json!({"command": "npm test"}))]),
            make_text_response("Fixed."),
        ]));
        let agent = turn_loop(provider, tools);
        let mut session = Session::new(None);

        agent.process(&mut session, "run the tests").await.unwrap();
        assert_eq!(session.recovery.attempts(), 0);
        let resolved = &session.transcript.turns()[4].results()[0].payload;
        assert!(resolved.get("recovery").is_none());
    }

    #[tokio::test]
    async fn provider_error_keeps_transcript() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]).failing_with(
            ProviderError::Network("connection reset".into()),
        ));
        let agent = turn_loop(provider, ToolRegistry::new());
        let mut session = Session::new(None);
        session.transcript.push(Turn::user("earlier"));
        session.transcript.push(Turn::model_text("earlier reply"));

        let err = agent.process(&mut session, "hello").await.unwrap_err();
        assert!(matches!(err, devloop_core::Error::Provider(ProviderError::Network(_))));
        assert_eq!(session.transcript.len(), 3);
        assert_eq!(session.transcript.last().unwrap().text(), "hello");
    }

    #[tokio::test]
    async fn stop_intent_is_rewritten_before_the_model_sees_it() {
        let provider = Arc::new(SequentialMockProvider::single_text("ok"));
        let agent = turn_loop(provider.clone(), ToolRegistry::new());
        let mut session = Session::new(None);

        agent.process(&mut session, "stop server").await.unwrap();
        let sent = provider.requests()[0].turns[0].text();
        assert!(sent.contains("stop_dev_server"));
        assert!(sent.contains("ask_user_confirmation"));
    }

    #[tokio::test]
    async fn snapshot_reports_project_root() {
        let provider = Arc::new(SequentialMockProvider::single_text("ok"));
        let agent = turn_loop(provider.clone(), ToolRegistry::new());
        let mut session = Session::new(Some("/work/shop".into()));

        agent.process(&mut session, "where am I?").await.unwrap();
        let snapshot = &provider.requests()[0].snapshot;
        assert_eq!(snapshot.project_root.as_deref(), Some("/work/shop"));
        assert_eq!(snapshot.server_state, ServerState::Idle);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn project_creation_updates_next_request() {
        let parent = tempfile::tempdir().unwrap();
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(devloop_tools::run_command::RunCommandTool));
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![call(
                "run_command",
                json!({
                    "command": "mkdir shop",
                    "working_directory": parent.path().display().to_string(),
                }),
            )]),
            make_text_response("Created."),
        ]));
        let agent = turn_loop(provider.clone(), tools).with_project_commands("mkdir", "true");
        let mut session = Session::new(None);

        agent.process(&mut session, "create a project called shop").await.unwrap();

        let expected = parent.path().join("shop").canonicalize().unwrap();
        assert_eq!(session.context.project_root(), Some(expected.as_path()));
        let requests = provider.requests();
        assert_eq!(requests[0].snapshot.project_root, None);
        assert_eq!(
            requests[1].snapshot.project_root,
            Some(expected.display().to_string())
        );
        assert_eq!(requests[1].snapshot.revision, 1);
    }
}
