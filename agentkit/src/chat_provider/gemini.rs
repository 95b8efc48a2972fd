use std::collections::{HashMap, VecDeque};
use std::env;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::{Map, Value, json};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::chat_provider::{
    ChatProvider, ChatProviderError, ChatProviderErrorKind, StreamedMessage, TokenUsage,
};
use crate::message::{
    ContentPart, Message, Role, StreamedMessagePart, TextPart, ThinkPart, ToolCall,
    ToolCallFunction,
};
use crate::tooling::Tool;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const BASE_URL_ENV: &str = "GEMINI_BASE_URL";

const API_KEY_HEADER: &str = "x-goog-api-key";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Schema keywords the function declaration endpoint rejects.
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &[
    "$schema",
    "$defs",
    "$ref",
    "definitions",
    "additionalProperties",
    "default",
    "examples",
    "title",
];

/// Google AI Studio (`generativelanguage`) chat provider.
#[derive(Clone)]
pub struct Gemini {
    model: String,
    base_url: Url,
    stream: bool,
    client: Client,
    generation_config: Map<String, Value>,
}

impl Gemini {
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
        default_headers: Option<HeaderMap>,
    ) -> Result<Self, ChatProviderError> {
        Self::with_timeouts(
            model,
            api_key,
            base_url,
            default_headers,
            DEFAULT_CONNECT_TIMEOUT,
            DEFAULT_REQUEST_TIMEOUT,
        )
    }

    pub fn with_timeouts(
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
        default_headers: Option<HeaderMap>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ChatProviderError> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .or_else(|| env::var(API_KEY_ENV).ok().filter(|key| !key.trim().is_empty()))
            .ok_or_else(|| {
                ChatProviderError::other(format!(
                    "The api_key client option or the {API_KEY_ENV} environment variable is not set"
                ))
            })?;
        let mut base_url = base_url
            .filter(|url| !url.is_empty())
            .or_else(|| env::var(BASE_URL_ENV).ok().filter(|url| !url.is_empty()))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)
            .map_err(|err| ChatProviderError::other(format!("Invalid base URL: {err}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(extra) = default_headers {
            headers.extend(extra);
        }
        headers.insert(
            HeaderName::from_static(API_KEY_HEADER),
            HeaderValue::from_str(&api_key)
                .map_err(|err| ChatProviderError::other(format!("Invalid API key: {err}")))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|err| ChatProviderError::other(err.to_string()))?;

        let model: String = model.into();
        let model = model
            .strip_prefix("models/")
            .map(str::to_string)
            .unwrap_or(model);

        Ok(Self {
            model,
            base_url,
            stream: true,
            client,
            generation_config: Map::new(),
        })
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Merged into the request's `generationConfig` (e.g. `temperature`, `maxOutputTokens`).
    pub fn with_generation_config(mut self, config: Map<String, Value>) -> Self {
        self.generation_config.extend(config);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self) -> Result<Url, ChatProviderError> {
        let method = if self.stream {
            "streamGenerateContent"
        } else {
            "generateContent"
        };
        let mut url = self
            .base_url
            .join(&format!("models/{}:{method}", self.model))
            .map_err(|err| ChatProviderError::other(err.to_string()))?;
        if self.stream {
            url.query_pairs_mut().append_pair("alt", "sse");
        }
        Ok(url)
    }
}

#[async_trait]
impl ChatProvider for Gemini {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        system_prompt: &str,
        tools: &[Tool],
        history: &[Message],
    ) -> Result<Box<dyn StreamedMessage>, ChatProviderError> {
        let body = build_request_body(system_prompt, tools, history, &self.generation_config);
        let url = self.endpoint()?;
        debug!(model = %self.model, stream = self.stream, "Sending Gemini request");

        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ChatProviderError::new(
                ChatProviderErrorKind::Status(status.as_u16()),
                format!("Gemini API error ({status}): {text}"),
            ));
        }

        if self.stream {
            Ok(Box::new(GeminiStreamedMessage::from_response(resp)))
        } else {
            let value: Value = resp.json().await.map_err(map_reqwest_error)?;
            let mut message = GeminiStreamedMessage::empty();
            message.ingest_chunk(&value);
            if message.parts.is_empty() {
                if let Some(reason) = block_reason(&value) {
                    return Err(ChatProviderError::other(format!(
                        "The prompt was blocked: {reason}"
                    )));
                }
            }
            Ok(Box::new(message))
        }
    }
}

type ByteStream = Pin<Box<dyn futures::Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

pub struct GeminiStreamedMessage {
    stream: Option<ByteStream>,
    buffer: Vec<u8>,
    parts: VecDeque<StreamedMessagePart>,
    id: Option<String>,
    usage: Option<TokenUsage>,
}

impl GeminiStreamedMessage {
    fn from_response(resp: reqwest::Response) -> Self {
        Self {
            stream: Some(Box::pin(resp.bytes_stream())),
            ..Self::empty()
        }
    }

    fn empty() -> Self {
        Self {
            stream: None,
            buffer: Vec::new(),
            parts: VecDeque::new(),
            id: None,
            usage: None,
        }
    }

    fn ingest_chunk(&mut self, value: &Value) {
        if let Some(id) = value.get("responseId").and_then(|v| v.as_str()) {
            self.id = Some(id.to_string());
        }
        if let Some(usage) = value.get("usageMetadata").and_then(parse_usage) {
            self.usage = Some(usage);
        }
        let parts = value
            .get("candidates")
            .and_then(|v| v.as_array())
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.pointer("/content/parts"))
            .and_then(|v| v.as_array());
        for part in parts.into_iter().flatten() {
            if let Some(parsed) = parse_part(part) {
                self.parts.push_back(parsed);
            }
        }
    }

    /// Buffer raw bytes and ingest every complete `data:` line. Lines are
    /// decoded only once complete so multi-byte characters may span chunks.
    fn feed(&mut self, bytes: &[u8]) -> Result<(), ChatProviderError> {
        self.buffer.extend_from_slice(bytes);
        self.drain_lines()
    }

    fn finish(&mut self) -> Result<(), ChatProviderError> {
        if self.buffer.iter().any(|b| !b.is_ascii_whitespace()) {
            self.buffer.push(b'\n');
            self.drain_lines()?;
        }
        self.buffer.clear();
        Ok(())
    }

    fn drain_lines(&mut self) -> Result<(), ChatProviderError> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = std::str::from_utf8(&raw).map_err(|err| {
                ChatProviderError::other(format!("Invalid UTF-8 in stream: {err}"))
            })?;
            let Some(data) = line.trim().strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(data)
                .map_err(|err| ChatProviderError::other(err.to_string()))?;
            self.ingest_chunk(&value);
        }
        Ok(())
    }
}

#[async_trait]
impl StreamedMessage for GeminiStreamedMessage {
    async fn next_part(&mut self) -> Result<Option<StreamedMessagePart>, ChatProviderError> {
        loop {
            if let Some(part) = self.parts.pop_front() {
                return Ok(Some(part));
            }
            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };
            match stream.next().await {
                Some(Ok(bytes)) => self.feed(&bytes)?,
                Some(Err(err)) => return Err(map_reqwest_error(err)),
                None => {
                    self.stream = None;
                    self.finish()?;
                }
            }
        }
    }

    fn id(&self) -> Option<String> {
        self.id.clone()
    }

    fn usage(&self) -> Option<TokenUsage> {
        self.usage.clone()
    }
}

/// Build a `generateContent` request body.
pub fn build_request_body(
    system_prompt: &str,
    tools: &[Tool],
    history: &[Message],
    generation_config: &Map<String, Value>,
) -> Value {
    let mut system_texts = Vec::new();
    if !system_prompt.is_empty() {
        system_texts.push(system_prompt.to_string());
    }

    let tool_names = tool_call_names(history);
    let mut contents: Vec<Value> = Vec::new();
    for message in history {
        match message.role {
            Role::System => system_texts.push(message.extract_text("\n")),
            Role::User => contents.push(json!({"role": "user", "parts": text_parts(message)})),
            Role::Assistant => contents.push(json!({"role": "model", "parts": model_parts(message)})),
            Role::Tool => {
                let response = function_response(message, &tool_names);
                // consecutive tool results answer one model turn
                let merged = contents.last_mut().is_some_and(|last| {
                    if !is_function_response_turn(last) {
                        return false;
                    }
                    match last.get_mut("parts").and_then(|p| p.as_array_mut()) {
                        Some(parts) => {
                            parts.push(response.clone());
                            true
                        }
                        None => false,
                    }
                });
                if !merged {
                    contents.push(json!({"role": "user", "parts": [response]}));
                }
            }
        }
    }

    let mut body = Map::new();
    body.insert("contents".to_string(), Value::Array(contents));
    if !system_texts.is_empty() {
        body.insert(
            "systemInstruction".to_string(),
            json!({"parts": [{"text": system_texts.join("\n\n")}]}),
        );
    }
    if !tools.is_empty() {
        let declarations: Vec<Value> = tools.iter().map(function_declaration).collect();
        body.insert(
            "tools".to_string(),
            json!([{"functionDeclarations": declarations}]),
        );
    }
    if !generation_config.is_empty() {
        body.insert(
            "generationConfig".to_string(),
            Value::Object(generation_config.clone()),
        );
    }
    Value::Object(body)
}

fn tool_call_names(history: &[Message]) -> HashMap<String, String> {
    history
        .iter()
        .filter_map(|message| message.tool_calls.as_ref())
        .flatten()
        .map(|call| (call.id.clone(), call.function.name.clone()))
        .collect()
}

fn text_parts(message: &Message) -> Vec<Value> {
    let parts: Vec<Value> = message
        .content
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text(text) => Some(json!({"text": text.text})),
            ContentPart::Think(_) => None,
        })
        .collect();
    if parts.is_empty() {
        vec![json!({"text": ""})]
    } else {
        parts
    }
}

fn model_parts(message: &Message) -> Vec<Value> {
    let mut parts: Vec<Value> = message
        .content
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text(text) if !text.text.is_empty() => Some(json!({"text": text.text})),
            _ => None,
        })
        .collect();
    for call in message.tool_calls.iter().flatten() {
        let args = call
            .function
            .arguments
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({}));
        parts.push(json!({"functionCall": {"name": call.function.name, "args": args}}));
    }
    if parts.is_empty() {
        parts.push(json!({"text": ""}));
    }
    parts
}

fn function_response(message: &Message, tool_names: &HashMap<String, String>) -> Value {
    let name = message
        .tool_call_id
        .as_ref()
        .and_then(|id| tool_names.get(id))
        .cloned()
        .or_else(|| message.name.clone())
        .unwrap_or_else(|| "unknown".to_string());
    let text = message.extract_text("\n");
    let response = match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => Value::Object(map),
        _ => json!({"output": text}),
    };
    json!({"functionResponse": {"name": name, "response": response}})
}

fn is_function_response_turn(content: &Value) -> bool {
    content.get("role").and_then(|r| r.as_str()) == Some("user")
        && content
            .get("parts")
            .and_then(|p| p.as_array())
            .is_some_and(|parts| parts.iter().all(|part| part.get("functionResponse").is_some()))
}

fn function_declaration(tool: &Tool) -> Value {
    let mut declaration = Map::new();
    declaration.insert("name".to_string(), Value::String(tool.name.clone()));
    declaration.insert(
        "description".to_string(),
        Value::String(tool.description.clone()),
    );
    let mut parameters = tool.parameters.clone();
    sanitize_schema(&mut parameters);
    let has_properties = parameters
        .get("properties")
        .and_then(|p| p.as_object())
        .is_some_and(|p| !p.is_empty());
    if has_properties {
        declaration.insert("parameters".to_string(), parameters);
    }
    Value::Object(declaration)
}

fn sanitize_schema(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for key in UNSUPPORTED_SCHEMA_KEYS {
                map.remove(*key);
            }
            for (key, child) in map.iter_mut() {
                // property names are user data, not keywords
                if key == "properties" {
                    if let Value::Object(props) = child {
                        props.values_mut().for_each(sanitize_schema);
                    }
                } else {
                    sanitize_schema(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(sanitize_schema),
        _ => {}
    }
}

fn parse_part(part: &Value) -> Option<StreamedMessagePart> {
    if let Some(call) = part.get("functionCall") {
        let name = call.get("name")?.as_str()?.to_string();
        let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
        let id = call
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));
        return Some(StreamedMessagePart::ToolCall(ToolCall {
            kind: "function".to_string(),
            id,
            function: ToolCallFunction {
                name,
                arguments: Some(args.to_string()),
            },
            extras: None,
        }));
    }
    let text = part.get("text")?.as_str()?;
    if text.is_empty() {
        return None;
    }
    let is_thought = part.get("thought").and_then(|v| v.as_bool()).unwrap_or(false);
    let content = if is_thought {
        ContentPart::Think(ThinkPart::new(text))
    } else {
        ContentPart::Text(TextPart::new(text))
    };
    Some(StreamedMessagePart::Content(content))
}

fn parse_usage(value: &Value) -> Option<TokenUsage> {
    let count = |key: &str| value.get(key).and_then(|v| v.as_i64()).unwrap_or(0);
    let prompt = value.get("promptTokenCount")?.as_i64()?;
    let cached = count("cachedContentTokenCount");
    Some(TokenUsage {
        input_other: (prompt - cached).max(0),
        output: count("candidatesTokenCount") + count("thoughtsTokenCount"),
        input_cache_read: cached,
        input_cache_creation: 0,
    })
}

fn block_reason(value: &Value) -> Option<&str> {
    value.pointer("/promptFeedback/blockReason")?.as_str()
}

fn map_reqwest_error(err: reqwest::Error) -> ChatProviderError {
    if err.is_timeout() {
        ChatProviderError::new(ChatProviderErrorKind::Timeout, err.to_string())
    } else if err.is_connect() {
        ChatProviderError::new(ChatProviderErrorKind::Connection, err.to_string())
    } else {
        ChatProviderError::other(err.to_string())
    }
}
