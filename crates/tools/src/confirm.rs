//! Confirmation tool — block the turn until the human answers yes or no.

use async_trait::async_trait;
use devloop_core::error::ToolError;
use devloop_core::tool::{Arguments, ParamKind, Parameter, Tool, ToolContext, ToolResult, str_arg};
use serde_json::json;

pub struct AskConfirmationTool;

#[async_trait]
impl Tool for AskConfirmationTool {
    fn name(&self) -> &str {
        "ask_user_confirmation"
    }

    fn description(&self) -> &str {
        "Ask the user a yes/no question and wait for the answer. Required before destructive \
         actions, starting or stopping the dev server, and before retrying a fix."
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![Parameter::required(
            "prompt_message",
            ParamKind::String,
            "The question to show the user",
        )]
    }

    async fn execute(&self, ctx: &ToolContext, args: &Arguments) -> Result<ToolResult, ToolError> {
        let prompt = str_arg(args, "prompt_message").unwrap_or("Proceed?");
        let confirmed = ctx.operator.confirm(prompt).await;
        Ok(ToolResult::ok(json!({ "confirmed": confirmed })))
    }
}
