//! Shared test helpers for turn-loop tests.

use async_trait::async_trait;
use devloop_core::error::ProviderError;
use devloop_core::message::{Part, ToolCallRequest, Turn};
use devloop_core::operator::Operator;
use devloop_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request it was given. Once the queue is empty it returns the
/// configured error, or panics if there is none.
pub struct SequentialMockProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    error: Option<ProviderError>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            error: None,
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// Fail with `error` once the scripted responses run out.
    pub fn failing_with(mut self, error: ProviderError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };

        match self.responses.lock().unwrap().pop_front() {
            Some(response) => Ok(response),
            None => match &self.error {
                Some(error) => Err(error.clone()),
                None => panic!("SequentialMockProvider: no more responses (call #{call})"),
            },
        }
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    make_response(Turn::model_text(text))
}

/// Create a response that requests the given tool calls.
pub fn make_tool_call_response(calls: Vec<ToolCallRequest>) -> ProviderResponse {
    make_response(Turn::model(calls.into_iter().map(Part::ToolCall).collect()))
}

fn make_response(turn: Turn) -> ProviderResponse {
    ProviderResponse {
        turn,
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Build a tool call from a JSON object of arguments.
pub fn call(name: &str, arguments: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest::new(name, arguments.as_object().cloned().unwrap_or_default())
}

/// Operator that replays queued answers and records the prompts it saw.
pub struct ScriptedOperator {
    confirms: Mutex<VecDeque<bool>>,
    answers: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOperator {
    pub fn new(confirms: Vec<bool>, answers: Vec<String>) -> Self {
        Self {
            confirms: Mutex::new(confirms.into()),
            answers: Mutex::new(answers.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn confirm(&self, prompt: &str) -> bool {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.confirms.lock().unwrap().pop_front().unwrap_or(false)
    }

    async fn ask(&self, prompt: &str) -> Option<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answers.lock().unwrap().pop_front()
    }
}
