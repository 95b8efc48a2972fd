use serde_json::{Map, Value};

/// Inline local `$ref` entries (`#/...`) and drop the definition tables.
///
/// A reference that points back into one of its own ancestors is left as-is.
pub fn deref_json_schema(schema: &Value) -> Value {
    let mut stack = Vec::new();
    let mut resolved = inline(schema, schema, &mut stack);
    if let Value::Object(map) = &mut resolved {
        map.remove("$defs");
        map.remove("definitions");
    }
    resolved
}

fn inline(node: &Value, root: &Value, stack: &mut Vec<String>) -> Value {
    match node {
        Value::Object(map) => {
            if let Some(pointer) = local_ref(map) {
                if !stack.iter().any(|seen| seen == pointer) {
                    if let Some(Value::Object(target)) = root.pointer(pointer) {
                        stack.push(pointer.to_string());
                        let mut merged = Map::new();
                        for (key, value) in target {
                            merged.insert(key.clone(), inline(value, root, stack));
                        }
                        stack.pop();
                        for (key, value) in map {
                            if key != "$ref" {
                                merged.insert(key.clone(), inline(value, root, stack));
                            }
                        }
                        return Value::Object(merged);
                    }
                }
            }
            Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), inline(value, root, stack)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| inline(item, root, stack))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn local_ref(map: &Map<String, Value>) -> Option<&str> {
    map.get("$ref")
        .and_then(|v| v.as_str())
        .and_then(|r| r.strip_prefix('#'))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::deref_json_schema;

    #[test]
    fn inlines_local_definitions() {
        let schema = json!({
            "type": "object",
            "properties": {"unit": {"$ref": "#/$defs/Unit"}},
            "$defs": {"Unit": {"type": "string", "enum": ["c", "f"]}}
        });
        assert_eq!(
            deref_json_schema(&schema),
            json!({
                "type": "object",
                "properties": {"unit": {"type": "string", "enum": ["c", "f"]}}
            })
        );
    }

    #[test]
    fn leaves_recursive_reference_in_place() {
        let schema = json!({
            "$defs": {"Node": {"type": "object", "properties": {"next": {"$ref": "#/$defs/Node"}}}},
            "$ref": "#/$defs/Node"
        });
        let resolved = deref_json_schema(&schema);
        assert_eq!(resolved["type"], json!("object"));
        assert_eq!(
            resolved["properties"]["next"],
            json!({"$ref": "#/$defs/Node"})
        );
    }
}
