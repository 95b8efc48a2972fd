use crate::tooling::{ToolReturnValue, tool_error};

pub const RUNTIME_ERROR_BRIEF: &str = "Tool runtime error";

pub fn tool_not_found(tool_name: &str) -> ToolReturnValue {
    let message = format!("Tool `{tool_name}` not found");
    tool_error("", message.clone(), &message)
}

pub fn tool_parse_error(message: &str) -> ToolReturnValue {
    tool_error(
        "",
        format!("Error parsing JSON arguments: {message}"),
        "Invalid arguments",
    )
}

pub fn tool_validate_error(message: &str) -> ToolReturnValue {
    tool_error(
        "",
        format!("Error validating JSON arguments: {message}"),
        "Invalid arguments",
    )
}

pub fn tool_runtime_error(message: &str) -> ToolReturnValue {
    tool_error(
        "",
        format!("Error running tool: {message}"),
        RUNTIME_ERROR_BRIEF,
    )
}
