use std::collections::BTreeMap;

use schemars::JsonSchema;
use schemars::generate::{SchemaGenerator, SchemaSettings};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::message::ContentPart;
use crate::utils::typing::JsonValue;

pub mod empty;
pub mod error;
pub mod simple;

/// A tool declaration as advertised to the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: JsonValue,
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: JsonValue,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisplayBlock {
    Brief(BriefDisplayBlock),
    Unknown(UnknownDisplayBlock),
}

impl Serialize for DisplayBlock {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            DisplayBlock::Brief(block) => block.serialize(serializer),
            DisplayBlock::Unknown(block) => {
                let mut data = match &block.data {
                    Value::Object(map) => map.clone(),
                    _ => serde_json::Map::new(),
                };
                data.insert("type".to_string(), Value::String(block.kind.clone()));
                data.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for DisplayBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut value = Value::deserialize(deserializer)?;
        let kind = value
            .get("type")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| serde::de::Error::custom("DisplayBlock missing type"))?;
        if kind == "brief" {
            return serde_json::from_value(value)
                .map(DisplayBlock::Brief)
                .map_err(serde::de::Error::custom);
        }
        if let Value::Object(map) = &mut value {
            map.remove("type");
        }
        Ok(DisplayBlock::Unknown(UnknownDisplayBlock { kind, data: value }))
    }
}

/// One-line summary of a tool result for human display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BriefDisplayBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl BriefDisplayBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            kind: "brief".to_string(),
            text: text.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownDisplayBlock {
    pub kind: String,
    pub data: JsonValue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolReturnValue {
    pub is_error: bool,
    #[serde(default)]
    pub output: ToolOutput,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub display: Vec<DisplayBlock>,
    #[serde(default)]
    pub extras: Option<BTreeMap<String, JsonValue>>,
}

impl ToolReturnValue {
    pub fn brief(&self) -> String {
        self.display
            .iter()
            .find_map(|block| match block {
                DisplayBlock::Brief(brief) => Some(brief.text.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn output_text(&self) -> String {
        match &self.output {
            ToolOutput::Text(text) => text.clone(),
            ToolOutput::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text(text) => Some(text.text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolOutput {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for ToolOutput {
    fn default() -> Self {
        ToolOutput::Text(String::new())
    }
}

impl From<String> for ToolOutput {
    fn from(value: String) -> Self {
        ToolOutput::Text(value)
    }
}

impl From<&str> for ToolOutput {
    fn from(value: &str) -> Self {
        ToolOutput::Text(value.to_string())
    }
}

impl From<Vec<ContentPart>> for ToolOutput {
    fn from(value: Vec<ContentPart>) -> Self {
        ToolOutput::Parts(value)
    }
}

impl Serialize for ToolOutput {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ToolOutput::Text(text) => serializer.serialize_str(text),
            ToolOutput::Parts(parts) => parts.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ToolOutput {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if let Some(text) = value.as_str() {
            return Ok(ToolOutput::Text(text.to_string()));
        }
        serde_json::from_value(value)
            .map(ToolOutput::Parts)
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub return_value: ToolReturnValue,
}

pub enum ToolResultFuture {
    Immediate(ToolResult),
    Pending(tokio::task::JoinHandle<ToolResult>),
}

impl ToolResultFuture {
    pub async fn resolve(self) -> anyhow::Result<ToolResult> {
        match self {
            ToolResultFuture::Immediate(result) => Ok(result),
            ToolResultFuture::Pending(task) => Ok(task.await?),
        }
    }
}

pub trait Toolset: Send + Sync {
    fn tools(&self) -> Vec<Tool>;
    fn handle(&self, tool_call: crate::message::ToolCall) -> ToolResultFuture;
}

#[async_trait::async_trait]
pub trait CallableTool: Send + Sync {
    fn base(&self) -> Tool;
    async fn call(&self, arguments: JsonValue) -> ToolReturnValue;
}

pub fn tool_ok(
    output: impl Into<ToolOutput>,
    message: impl Into<String>,
    brief: &str,
) -> ToolReturnValue {
    tool_return(false, output.into(), message.into(), brief)
}

pub fn tool_error(
    output: impl Into<ToolOutput>,
    message: impl Into<String>,
    brief: &str,
) -> ToolReturnValue {
    tool_return(true, output.into(), message.into(), brief)
}

fn tool_return(is_error: bool, output: ToolOutput, message: String, brief: &str) -> ToolReturnValue {
    let display = if brief.is_empty() {
        Vec::new()
    } else {
        vec![DisplayBlock::Brief(BriefDisplayBlock::new(brief))]
    };
    ToolReturnValue {
        is_error,
        output,
        message,
        display,
        extras: None,
    }
}

/// Draft-07 schema for `T` with titles, `$schema` and `format` removed and
/// local references inlined.
pub fn schema_for<T: JsonSchema>() -> JsonValue {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
    });
    let schema = SchemaGenerator::new(settings).into_root_schema_for::<T>();
    let mut value = serde_json::to_value(&schema).unwrap_or(Value::Null);
    normalize_schema(&mut value);
    let mut resolved = crate::utils::jsonschema::deref_json_schema(&value);
    normalize_schema(&mut resolved);
    resolved
}

fn normalize_schema(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for key in ["title", "$schema", "format"] {
                if matches!(map.get(key), Some(Value::String(_))) {
                    map.remove(key);
                }
            }
            let nullable_union = match map.get("type") {
                Some(Value::Array(types)) if types.iter().any(|t| t.as_str() == Some("null")) => {
                    Some(
                        types
                            .iter()
                            .filter_map(|t| t.as_str())
                            .map(|kind| serde_json::json!({ "type": kind }))
                            .collect::<Vec<_>>(),
                    )
                }
                _ => None,
            };
            if let Some(any_of) = nullable_union {
                map.remove("type");
                map.insert("anyOf".to_string(), Value::Array(any_of));
            }
            for v in map.values_mut() {
                normalize_schema(v);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_schema),
        Value::Number(number) => {
            if let Some(float) = number.as_f64() {
                if float.fract() == 0.0 && number.is_f64() {
                    *value = Value::from(float as i64);
                }
            }
        }
        _ => {}
    }
}

/// Typed tool: parameters are deserialized from the call arguments and the
/// advertised schema is derived from `Params`.
#[async_trait::async_trait]
pub trait CallableTool2: Send + Sync {
    type Params: for<'de> Deserialize<'de> + JsonSchema + Send;

    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn call_typed(&self, params: Self::Params) -> ToolReturnValue;
}

#[async_trait::async_trait]
impl<T> CallableTool for T
where
    T: CallableTool2 + Send + Sync,
{
    fn base(&self) -> Tool {
        Tool::new(self.name(), self.description(), schema_for::<T::Params>())
    }

    async fn call(&self, arguments: JsonValue) -> ToolReturnValue {
        match serde_json::from_value::<T::Params>(arguments) {
            Ok(params) => self.call_typed(params).await,
            Err(err) => error::tool_validate_error(&err.to_string()),
        }
    }
}
