pub type JsonValue = serde_json::Value;
