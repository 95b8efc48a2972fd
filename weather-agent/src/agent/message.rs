use agentkit::message::{ContentPart, Message, Role, TextPart};
use agentkit::tooling::error::RUNTIME_ERROR_BRIEF;
use agentkit::tooling::{ToolOutput, ToolResult};

pub fn system(message: &str) -> ContentPart {
    ContentPart::Text(TextPart::new(format!("<system>{message}</system>")))
}

/// Tool message fed back to the model for one tool result.
pub fn tool_result_to_message(tool_result: &ToolResult) -> Message {
    let return_value = &tool_result.return_value;
    let mut content = Vec::new();
    if return_value.is_error {
        let mut message = return_value.message.clone();
        if return_value.brief() == RUNTIME_ERROR_BRIEF && !message.is_empty() {
            message.push_str("\nThis is an unexpected error and the tool is probably not working.");
        }
        if !message.is_empty() {
            content.push(system(&format!("ERROR: {message}")));
        }
        append_output(&mut content, &return_value.output);
    } else {
        if !return_value.message.is_empty() {
            content.push(system(&return_value.message));
        }
        append_output(&mut content, &return_value.output);
        if content.is_empty() {
            content.push(system("Tool output is empty."));
        }
    }

    Message {
        role: Role::Tool,
        content,
        name: None,
        tool_calls: None,
        tool_call_id: Some(tool_result.tool_call_id.clone()),
        partial: None,
    }
}

fn append_output(content: &mut Vec<ContentPart>, output: &ToolOutput) {
    match output {
        ToolOutput::Text(text) => {
            if !text.is_empty() {
                content.push(ContentPart::Text(TextPart::new(text)));
            }
        }
        ToolOutput::Parts(parts) => content.extend(parts.iter().cloned()),
    }
}

#[cfg(test)]
mod tests {
    use agentkit::tooling::error::tool_runtime_error;
    use agentkit::tooling::tool_ok;

    use super::*;

    #[test]
    fn runtime_errors_are_flagged() {
        let result = ToolResult {
            tool_call_id: "call_1".to_string(),
            return_value: tool_runtime_error("boom"),
        };
        let message = tool_result_to_message(&result);
        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(
            message.extract_text(""),
            "<system>ERROR: Error running tool: boom\nThis is an unexpected error and the tool is probably not working.</system>"
        );
    }

    #[test]
    fn empty_output_is_called_out() {
        let result = ToolResult {
            tool_call_id: "call_2".to_string(),
            return_value: tool_ok("", "", ""),
        };
        let message = tool_result_to_message(&result);
        assert_eq!(message.extract_text(""), "<system>Tool output is empty.</system>");
    }
}
