use crate::message::ToolCall;
use crate::tooling::error::tool_not_found;
use crate::tooling::{Tool, ToolResult, ToolResultFuture, Toolset};

/// A toolset with no tools; every call resolves to "not found".
pub struct EmptyToolset;

impl Toolset for EmptyToolset {
    fn tools(&self) -> Vec<Tool> {
        Vec::new()
    }

    fn handle(&self, tool_call: ToolCall) -> ToolResultFuture {
        ToolResultFuture::Immediate(ToolResult {
            return_value: tool_not_found(&tool_call.function.name),
            tool_call_id: tool_call.id,
        })
    }
}
