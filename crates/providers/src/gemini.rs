//! Google Gemini provider using native `generateContent` function calling.
//!
//! Gemini has no call IDs, so each `functionCall` part gets a fresh ID on
//! the way in. Tool results go back as `functionResponse` parts inside a
//! `user`-role content, in call order.

use async_trait::async_trait;
use devloop_core::error::ProviderError;
use devloop_core::message::{Part, Role, ToolCallRequest, Turn};
use devloop_core::provider::*;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_GEMINI_BASE_URL.into(),
            api_key: api_key.into(),
            client: crate::http_client(),
        }
    }

    /// Point at a different endpoint (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn model_url(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.base_url)
    }

    /// Build the `generateContent` body.
    fn to_api_body(request: &ProviderRequest) -> Value {
        let system = format!("{}\n\n{}", request.instructions, request.snapshot.render());

        let contents: Vec<Value> = request
            .turns
            .iter()
            .filter_map(|turn| {
                let (role, parts) = match turn.role {
                    Role::User => ("user", turn.parts.iter().filter_map(to_api_part).collect::<Vec<_>>()),
                    Role::Model => ("model", turn.parts.iter().filter_map(to_api_part).collect()),
                    Role::ToolResult => ("user", turn.parts.iter().filter_map(to_api_part).collect()),
                };
                (!parts.is_empty()).then(|| json!({ "role": role, "parts": parts }))
            })
            .collect();

        let mut body = json!({
            "systemInstruction": { "parts": [{ "text": system }] },
            "contents": contents,
            "generationConfig": { "temperature": request.temperature },
        });

        if let Some(max_tokens) = request.max_tokens {
            body["generationConfig"]["maxOutputTokens"] = json!(max_tokens);
        }

        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request.tools.iter().map(to_declaration).collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
        }

        body
    }

    fn to_response(api: ApiResponse, requested_model: &str) -> Result<ProviderResponse, ProviderError> {
        let candidate = api.candidates.into_iter().next().ok_or_else(|| {
            let reason = api
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".into());
            ProviderError::MalformedResponse(format!("Gemini returned no candidates ({reason})"))
        })?;

        let content = candidate.content.ok_or_else(|| {
            ProviderError::MalformedResponse(format!(
                "Gemini candidate has no content (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ))
        })?;

        let mut parts = Vec::new();
        for part in content.parts {
            if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                parts.push(Part::text(text));
            }
            if let Some(call) = part.function_call {
                let arguments = match call.args {
                    Value::Object(map) => map,
                    Value::Null => serde_json::Map::new(),
                    other => {
                        return Err(ProviderError::MalformedResponse(format!(
                            "Arguments for tool '{}' are not an object: {other}",
                            call.name
                        )));
                    }
                };
                parts.push(Part::ToolCall(ToolCallRequest::new(call.name, arguments)));
            }
        }

        let usage = api.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        Ok(ProviderResponse {
            turn: Turn::model(parts),
            usage,
            model: api.model_version.unwrap_or_else(|| requested_model.to_string()),
        })
    }
}

fn to_api_part(part: &Part) -> Option<Value> {
    match part {
        Part::Text { text } if text.is_empty() => None,
        Part::Text { text } => Some(json!({ "text": text })),
        Part::ToolCall(call) => Some(json!({
            "functionCall": { "name": call.name, "args": call.arguments }
        })),
        Part::ToolResult(result) => {
            // `response` must be an object
            let response = match &result.payload {
                Value::Object(_) => result.payload.clone(),
                other => json!({ "result": other }),
            };
            Some(json!({
                "functionResponse": { "name": result.name, "response": response }
            }))
        }
    }
}

/// Gemini wants OpenAPI-style upper-case types and rejects empty objects.
fn to_declaration(tool: &ToolDefinition) -> Value {
    let mut declaration = json!({ "name": tool.name, "description": tool.description });
    let has_properties = tool.parameters["properties"]
        .as_object()
        .is_some_and(|p| !p.is_empty());
    if has_properties {
        declaration["parameters"] = to_gemini_schema(&tool.parameters);
    }
    declaration
}

fn to_gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, value) in map {
                match (key.as_str(), value) {
                    ("type", Value::String(t)) => {
                        out.insert(key.clone(), Value::String(t.to_uppercase()));
                    }
                    ("required", Value::Array(items)) if items.is_empty() => {}
                    _ => {
                        out.insert(key.clone(), to_gemini_schema(value));
                    }
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(to_gemini_schema).collect()),
        other => other.clone(),
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "No Gemini API key. Set GEMINI_API_KEY or api_key in the config file.".into(),
            ));
        }

        let url = self.model_url(&request.model);
        let body = Self::to_api_body(&request);

        debug!(model = %request.model, turns = request.turns.len(), "Sending request to Gemini");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(crate::transport_error)?;

        let response = crate::check_status(response).await?;

        let api: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse Gemini response: {e}")))?;

        Self::to_response(api, &request.model)
    }
}

// --- Gemini API types (internal) ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    usage_metadata: Option<ApiUsage>,
    model_version: Option<String>,
    prompt_feedback: Option<ApiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCandidate {
    content: Option<ApiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiContent {
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPart {
    text: Option<String>,
    function_call: Option<ApiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPromptFeedback {
    block_reason: Option<String>,
}
