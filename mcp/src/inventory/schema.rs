//! Translation of provider input schemas into the schema advertised to the model.
//!
//! Providers declare arbitrary JSON Schema. Models only need a flat object of
//! typed properties, so anything outside that subset degrades to `{}`
//! (accept anything) instead of rejecting the tool.

use serde_json::{json, Map, Value};

/// Translate a provider's input schema. Never fails.
pub fn translate_input_schema(schema: &Map<String, Value>) -> Value {
    let is_object = schema
        .get("type")
        .and_then(Value::as_str)
        .is_none_or(|t| t == "object");
    if !is_object {
        return empty_object_schema();
    }

    let Some(declared) = schema.get("properties").and_then(Value::as_object) else {
        return empty_object_schema();
    };

    let properties: Map<String, Value> = declared
        .iter()
        .map(|(name, prop)| (name.clone(), translate_property(prop)))
        .collect();

    let required: Vec<Value> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .filter(|name| properties.contains_key(*name))
                .map(|name| Value::String(name.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let mut out = Map::new();
    out.insert("type".to_string(), json!("object"));
    out.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        out.insert("required".to_string(), Value::Array(required));
    }
    Value::Object(out)
}

fn translate_property(prop: &Value) -> Value {
    let Some(prop) = prop.as_object() else {
        return json!({});
    };

    let mut out = match prop.get("type").and_then(Value::as_str) {
        Some(kind @ ("string" | "number" | "integer" | "boolean")) => {
            let mut out = Map::new();
            out.insert("type".to_string(), json!(kind));
            if let Some(values) = prop.get("enum").filter(|v| v.is_array()) {
                out.insert("enum".to_string(), values.clone());
            }
            out
        }
        Some("array") => {
            let mut out = Map::new();
            out.insert("type".to_string(), json!("array"));
            out.insert("items".to_string(), json!({}));
            out
        }
        Some("object") => {
            let mut out = Map::new();
            out.insert("type".to_string(), json!("object"));
            out.insert("additionalProperties".to_string(), json!({}));
            out
        }
        _ => Map::new(),
    };

    if let Some(description) = prop.get("description").and_then(Value::as_str) {
        out.insert("description".to_string(), json!(description));
    }
    Value::Object(out)
}

fn empty_object_schema() -> Value {
    json!({"type": "object", "properties": {}})
}
