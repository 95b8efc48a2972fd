use serde_json::{Map, Value};

use crate::chat_provider::{ChatProviderError, TokenUsage};
use crate::message::{
    ContentPart, StreamedMessagePart, TextPart, ThinkPart, ToolCall, ToolCallFunction,
    ToolCallPart,
};

type ParsedScript = (Vec<StreamedMessagePart>, Option<String>, Option<TokenUsage>);

/// Parse an echo script into streamable parts, an optional message id and
/// optional usage. Blank lines, `#` comments, code fences and a bare `echo`
/// line are ignored.
pub fn parse_echo_script(script: &str) -> Result<ParsedScript, ChatProviderError> {
    let mut parts: Vec<StreamedMessagePart> = Vec::new();
    let mut message_id = None;
    let mut usage = None;

    for (index, raw_line) in script.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();
        if line.is_empty()
            || line.starts_with('#')
            || line.starts_with("```")
            || line.eq_ignore_ascii_case("echo")
        {
            continue;
        }
        let Some((key, payload)) = line.split_once(':') else {
            return Err(ChatProviderError::other(format!(
                "Invalid echo DSL at line {line_no}: {raw_line:?}"
            )));
        };
        let payload = payload.strip_prefix(' ').unwrap_or(payload);
        match key.trim().to_lowercase().as_str() {
            "id" => message_id = Some(strip_quotes(payload.trim()).to_string()),
            "usage" => usage = Some(parse_usage(payload)?),
            "text" => parts.push(ContentPart::Text(TextPart::new(strip_quotes(payload))).into()),
            "think" => parts.push(ContentPart::Think(ThinkPart::new(strip_quotes(payload))).into()),
            "tool_call" => parts.push(parse_tool_call(payload, line_no, raw_line)?.into()),
            "tool_call_part" => parts.push(parse_tool_call_part(payload).into()),
            other => {
                return Err(ChatProviderError::other(format!(
                    "Unknown echo DSL kind '{other}' at line {line_no}: {raw_line:?}"
                )));
            }
        }
    }

    Ok((parts, message_id, usage))
}

fn parse_usage(payload: &str) -> Result<TokenUsage, ChatProviderError> {
    let mapping = parse_mapping(payload, "usage")?;
    let field = |key: &str| -> Result<i64, ChatProviderError> {
        let parsed = match mapping.get(key) {
            None => Some(0),
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.parse::<i64>().ok(),
            Some(_) => None,
        };
        parsed.ok_or_else(|| {
            ChatProviderError::other(format!("Usage field '{key}' must be integer"))
        })
    };

    Ok(TokenUsage {
        input_other: field("input_other")?,
        output: field("output")?,
        input_cache_read: field("input_cache_read")?,
        input_cache_creation: field("input_cache_creation")?,
    })
}

fn parse_tool_call(payload: &str, line_no: usize, raw_line: &str) -> Result<ToolCall, ChatProviderError> {
    let mapping = parse_mapping(payload, "tool_call")?;
    let function = mapping.get("function").and_then(|v| v.as_object());
    let string_field = |key: &str| -> Option<String> {
        mapping
            .get(key)
            .or_else(|| function.and_then(|f| f.get(key)))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    let (Some(id), Some(name)) = (
        mapping.get("id").and_then(|v| v.as_str()).map(str::to_string),
        string_field("name"),
    ) else {
        return Err(ChatProviderError::other(format!(
            "tool_call requires string id and name at line {line_no}: {raw_line:?}"
        )));
    };

    let arguments = match mapping
        .get("arguments")
        .or_else(|| function.and_then(|f| f.get("arguments")))
    {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Object(obj)) => Some(Value::Object(obj.clone()).to_string()),
        _ => None,
    };

    let extras = mapping.get("extras").and_then(|v| v.as_object()).map(|obj| {
        obj.iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    });

    Ok(ToolCall {
        kind: "function".to_string(),
        id,
        function: ToolCallFunction { name, arguments },
        extras,
    })
}

fn parse_tool_call_part(payload: &str) -> ToolCallPart {
    let value = match parse_value(payload) {
        Value::Object(map) => map.get("arguments_part").cloned().unwrap_or(Value::Null),
        other => other,
    };
    let arguments_part = match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    };
    ToolCallPart { arguments_part }
}

/// Either a JSON object or whitespace/comma separated `key=value` tokens.
fn parse_mapping(payload: &str, context: &str) -> Result<Map<String, Value>, ChatProviderError> {
    let trimmed = payload.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => return Ok(map),
        Ok(_) => {
            return Err(ChatProviderError::other(format!(
                "{context} payload must be an object"
            )));
        }
        Err(_) => {}
    }

    let mut mapping = Map::new();
    for token in trimmed.replace(',', " ").split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            return Err(ChatProviderError::other(format!(
                "Invalid token '{token}' in {context} payload"
            )));
        };
        mapping.insert(key.trim().to_string(), parse_value(value));
    }

    if mapping.is_empty() {
        return Err(ChatProviderError::other(format!(
            "{context} payload cannot be empty"
        )));
    }
    Ok(mapping)
}

fn parse_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") || trimmed.eq_ignore_ascii_case("none") {
        return Value::Null;
    }
    serde_json::from_str::<Value>(trimmed)
        .unwrap_or_else(|_| Value::String(strip_quotes(trimmed).to_string()))
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
