use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::utils::typing::JsonValue;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentPart {
    Text(TextPart),
    Think(ThinkPart),
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text(TextPart::new(text))
    }
}

impl Serialize for ContentPart {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ContentPart::Text(part) => part.serialize(serializer),
            ContentPart::Think(part) => part.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ContentPart {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let kind = value
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| serde::de::Error::custom("ContentPart missing type"))?;
        match kind {
            "text" => serde_json::from_value(value)
                .map(ContentPart::Text)
                .map_err(serde::de::Error::custom),
            "think" => serde_json::from_value(value)
                .map(ContentPart::Think)
                .map_err(serde::de::Error::custom),
            _ => Err(serde::de::Error::custom(format!(
                "Unknown ContentPart type: {kind}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl TextPart {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

impl From<TextPart> for ContentPart {
    fn from(part: TextPart) -> Self {
        ContentPart::Text(part)
    }
}

/// Model reasoning. Never shown as part of the final answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkPart {
    #[serde(rename = "type")]
    pub kind: String,
    pub think: String,
}

impl ThinkPart {
    pub fn new(think: impl Into<String>) -> Self {
        Self {
            kind: "think".to_string(),
            think: think.into(),
        }
    }
}

impl From<ThinkPart> for ContentPart {
    fn from(part: ThinkPart) -> Self {
        ContentPart::Think(part)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub function: ToolCallFunction,
    pub extras: Option<BTreeMap<String, JsonValue>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    pub arguments: Option<String>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: "function".to_string(),
            id: id.into(),
            function: ToolCallFunction {
                name: name.into(),
                arguments: None,
            },
            extras: None,
        }
    }

    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.function.arguments = Some(arguments.into());
        self
    }

    pub fn merge_in_place(&mut self, other: &ToolCallPart) -> bool {
        append_fragment(&mut self.function.arguments, other.arguments_part.as_deref());
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallPart {
    pub arguments_part: Option<String>,
}

impl ToolCallPart {
    pub fn merge_in_place(&mut self, other: &ToolCallPart) -> bool {
        append_fragment(&mut self.arguments_part, other.arguments_part.as_deref());
        true
    }
}

fn append_fragment(target: &mut Option<String>, fragment: Option<&str>) {
    let Some(fragment) = fragment else {
        return;
    };
    match target {
        Some(existing) => existing.push_str(fragment),
        None => *target = Some(fragment.to_string()),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamedMessagePart {
    Content(ContentPart),
    ToolCall(ToolCall),
    ToolCallPart(ToolCallPart),
}

impl From<ContentPart> for StreamedMessagePart {
    fn from(part: ContentPart) -> Self {
        StreamedMessagePart::Content(part)
    }
}

impl From<ToolCall> for StreamedMessagePart {
    fn from(call: ToolCall) -> Self {
        StreamedMessagePart::ToolCall(call)
    }
}

impl From<ToolCallPart> for StreamedMessagePart {
    fn from(part: ToolCallPart) -> Self {
        StreamedMessagePart::ToolCallPart(part)
    }
}

impl StreamedMessagePart {
    pub fn merge_in_place(&mut self, other: &StreamedMessagePart) -> bool {
        match (self, other) {
            (
                StreamedMessagePart::Content(ContentPart::Text(left)),
                StreamedMessagePart::Content(ContentPart::Text(right)),
            ) => {
                left.text.push_str(&right.text);
                true
            }
            (
                StreamedMessagePart::Content(ContentPart::Think(left)),
                StreamedMessagePart::Content(ContentPart::Think(right)),
            ) => {
                left.think.push_str(&right.think);
                true
            }
            (StreamedMessagePart::ToolCall(left), StreamedMessagePart::ToolCallPart(right)) => {
                left.merge_in_place(right)
            }
            (StreamedMessagePart::ToolCallPart(left), StreamedMessagePart::ToolCallPart(right)) => {
                left.merge_in_place(right)
            }
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(
        default,
        serialize_with = "serialize_content",
        deserialize_with = "deserialize_content"
    )]
    pub content: Vec<ContentPart>,
    pub name: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub tool_call_id: Option<String>,
    pub partial: Option<bool>,
}

impl Message {
    pub fn new(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            content,
            name: None,
            tool_calls: None,
            tool_call_id: None,
            partial: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentPart::text(text)])
    }

    pub fn extract_text(&self, sep: &str) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(sep)
    }
}

fn serialize_content<S>(content: &[ContentPart], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if let [ContentPart::Text(text)] = content {
        return serializer.serialize_str(&text.text);
    }
    content.serialize(serializer)
}

fn deserialize_content<'de, D>(deserializer: D) -> Result<Vec<ContentPart>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(Vec::new());
    }
    if let Some(text) = value.as_str() {
        return Ok(vec![ContentPart::text(text)]);
    }
    serde_json::from_value(value).map_err(serde::de::Error::custom)
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.role, self.extract_text(""))
    }
}
