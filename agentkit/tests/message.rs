use serde_json::{Value, json};

use agentkit::message::{
    ContentPart, Message, Role, StreamedMessagePart, TextPart, ThinkPart, ToolCall, ToolCallPart,
};

fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut cleaned = serde_json::Map::new();
            for (key, val) in map {
                if val.is_null() {
                    continue;
                }
                cleaned.insert(key, strip_nulls(val));
            }
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

#[test]
fn plain_text_message_serializes_as_string() {
    let message = Message::user("What's the weather in Oslo?");

    let dumped = strip_nulls(serde_json::to_value(&message).unwrap());
    assert_eq!(
        dumped,
        json!({
            "role": "user",
            "content": "What's the weather in Oslo?",
        })
    );
    let parsed: Message = serde_json::from_value(dumped).unwrap();
    assert_eq!(parsed, message);
}

#[test]
fn assistant_message_with_tool_calls() {
    let mut message = Message::new(Role::Assistant, vec![ContentPart::text("Let me check.")]);
    message.tool_calls = Some(vec![
        ToolCall::new("call-1", "get_weather").with_arguments(r#"{"location":"Oslo"}"#),
    ]);

    let dumped = strip_nulls(serde_json::to_value(&message).unwrap());
    assert_eq!(
        dumped,
        json!({
            "role": "assistant",
            "content": "Let me check.",
            "tool_calls": [
                {
                    "type": "function",
                    "id": "call-1",
                    "function": {"name": "get_weather", "arguments": "{\"location\":\"Oslo\"}"}
                }
            ]
        })
    );
    let parsed: Message = serde_json::from_value(dumped).unwrap();
    assert_eq!(parsed, message);
}

#[test]
fn mixed_content_serializes_as_list() {
    let message = Message::new(
        Role::Assistant,
        vec![
            ContentPart::Think(ThinkPart::new("The user wants Oslo.")),
            ContentPart::text("It is sunny in Oslo."),
        ],
    );

    let dumped = strip_nulls(serde_json::to_value(&message).unwrap());
    assert_eq!(
        dumped,
        json!({
            "role": "assistant",
            "content": [
                {"type": "think", "think": "The user wants Oslo."},
                {"type": "text", "text": "It is sunny in Oslo."}
            ]
        })
    );
    let parsed: Message = serde_json::from_value(dumped).unwrap();
    assert_eq!(parsed, message);
}

#[test]
fn null_content_deserializes_to_empty() {
    let data = json!({
        "role": "assistant",
        "content": null,
        "tool_calls": [
            {
                "type": "function",
                "id": "tc_456",
                "function": {"name": "check_rain", "arguments": "{}"},
                "extras": null
            }
        ]
    });
    let message: Message = serde_json::from_value(data).unwrap();
    assert!(message.content.is_empty());
    assert_eq!(
        message.tool_calls,
        Some(vec![ToolCall::new("tc_456", "check_rain").with_arguments("{}")])
    );
}

#[test]
fn unknown_content_type_is_rejected() {
    let data = json!({
        "role": "user",
        "content": [{"type": "image_url", "image_url": {"url": "https://example.com/a.png"}}],
    });
    assert!(serde_json::from_value::<Message>(data).is_err());
}

#[test]
fn extract_text_skips_thinking() {
    let message = Message::new(
        Role::Assistant,
        vec![
            ContentPart::Text(TextPart::new("Hello,")),
            ContentPart::Think(ThinkPart::new("hidden")),
            ContentPart::Text(TextPart::new("world")),
        ],
    );
    assert_eq!(message.extract_text(" "), "Hello, world");
    assert_eq!(message.extract_text("\n"), "Hello,\nworld");
}

#[test]
fn streamed_parts_merge() {
    let mut text: StreamedMessagePart = ContentPart::text("It is ").into();
    assert!(text.merge_in_place(&ContentPart::text("sunny").into()));
    assert_eq!(text, ContentPart::text("It is sunny").into());

    let mut call: StreamedMessagePart = ToolCall::new("call-1", "get_weather").into();
    let fragments = [r#"{"loca"#, r#"tion": "Oslo"}"#];
    for fragment in fragments {
        let part = ToolCallPart {
            arguments_part: Some(fragment.to_string()),
        };
        assert!(call.merge_in_place(&part.into()));
    }
    assert_eq!(
        call,
        ToolCall::new("call-1", "get_weather")
            .with_arguments(r#"{"location": "Oslo"}"#)
            .into()
    );

    let mut think: StreamedMessagePart = ContentPart::Think(ThinkPart::new("a")).into();
    assert!(!think.merge_in_place(&ContentPart::text("b").into()));
}
