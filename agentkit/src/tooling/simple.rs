use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::debug;

use crate::message::ToolCall;
use crate::tooling::error::{
    tool_not_found, tool_parse_error, tool_runtime_error, tool_validate_error,
};
use crate::tooling::{CallableTool, Tool, ToolResult, ToolResultFuture, Toolset};

/// Name-keyed toolset. Arguments are checked against each tool's schema before
/// the tool runs on its own task.
#[derive(Default)]
pub struct SimpleToolset {
    tools: BTreeMap<String, Arc<dyn CallableTool>>,
}

impl SimpleToolset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tool: Arc<dyn CallableTool>) {
        let name = tool.base().name;
        self.tools.insert(name, tool);
    }

    pub fn with(mut self, tool: Arc<dyn CallableTool>) -> Self {
        self.add(tool);
        self
    }

    pub fn remove(&mut self, name: &str) -> Result<(), String> {
        match self.tools.remove(name) {
            Some(_) => Ok(()),
            None => Err(format!("Tool `{name}` not found in the toolset.")),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Toolset for SimpleToolset {
    fn tools(&self) -> Vec<Tool> {
        self.tools.values().map(|tool| tool.base()).collect()
    }

    fn handle(&self, tool_call: ToolCall) -> ToolResultFuture {
        let tool_call_id = tool_call.id;
        let immediate = |return_value| {
            ToolResultFuture::Immediate(ToolResult {
                tool_call_id: tool_call_id.clone(),
                return_value,
            })
        };

        let Some(tool) = self.tools.get(&tool_call.function.name) else {
            return immediate(tool_not_found(&tool_call.function.name));
        };

        let arguments = tool_call.function.arguments.as_deref().unwrap_or("{}");
        let arguments = if arguments.trim().is_empty() { "{}" } else { arguments };
        let args: Value = match serde_json::from_str(arguments) {
            Ok(value) => value,
            Err(err) => return immediate(tool_parse_error(&err.to_string())),
        };

        let schema = tool.base().parameters;
        let validator = match jsonschema::validator_for(&schema) {
            Ok(validator) => validator,
            Err(err) => return immediate(tool_runtime_error(&err.to_string())),
        };
        if let Err(err) = validator.validate(&args) {
            return immediate(tool_validate_error(&err.to_string()));
        }

        debug!(tool = %tool_call.function.name, "Dispatching tool call");
        let tool = Arc::clone(tool);
        let tool_call_id = tool_call_id.clone();
        ToolResultFuture::Pending(tokio::task::spawn(async move {
            let return_value = AssertUnwindSafe(tool.call(args))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| tool_runtime_error(&panic_message(panic)));
            ToolResult {
                tool_call_id,
                return_value,
            }
        }))
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "tool panicked".to_string()
    }
}
