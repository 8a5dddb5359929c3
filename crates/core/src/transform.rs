//! Ordered payload transform pipeline (include → drop → rename → enrich →
//! map_values → output_template) plus the logging sanitizer.

use crate::path;
use serde_json::{Map, Value};

/// A declarative reshaping rule applied to a webhook body.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Transform {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "indexmap_is_empty")]
    pub rename: indexmap::IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub enrich_static: Map<String, Value>,
    #[serde(default, skip_serializing_if = "indexmap_is_empty")]
    pub map_values: indexmap::IndexMap<String, Map<String, Value>>,
    #[serde(default)]
    pub output_template: Option<OutputTemplate>,
}

fn indexmap_is_empty<K, V>(m: &indexmap::IndexMap<K, V>) -> bool {
    m.is_empty()
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OutputTemplate {
    #[serde(default = "default_template_type")]
    pub r#type: String,
    pub fields: indexmap::IndexMap<String, String>,
}

fn default_template_type() -> String {
    "object".to_string()
}

/// Apply the transform pipeline to `input`, returning the reshaped document.
/// Never fails: ill-typed lookups degrade to null or are left unchanged.
pub fn apply(transform: &Transform, input: &Value) -> Value {
    let mut doc = input.clone();

    if !transform.include_fields.is_empty() {
        let mut projected = Value::Object(Map::new());
        for p in &transform.include_fields {
            if let Some(v) = path::get(&doc, p) {
                let v = v.clone();
                path::set(&mut projected, p, v);
            }
        }
        doc = projected;
    }

    for p in &transform.drop_fields {
        path::delete(&mut doc, p);
    }

    for (src, dst) in &transform.rename {
        if let Some(v) = path::get(&doc, src) {
            let v = v.clone();
            path::set(&mut doc, dst, v);
            path::delete(&mut doc, src);
        }
    }

    if !transform.enrich_static.is_empty() {
        if !doc.is_object() {
            doc = Value::Object(Map::new());
        }
        let map = doc.as_object_mut().unwrap();
        for (k, v) in &transform.enrich_static {
            map.insert(k.clone(), v.clone());
        }
    }

    for (p, lookup) in &transform.map_values {
        if let Some(current) = path::get(&doc, p) {
            let key = scalar_as_lookup_key(current);
            if let Some(key) = key {
                if let Some(replacement) = lookup.get(&key) {
                    let replacement = replacement.clone();
                    path::set(&mut doc, p, replacement);
                }
            }
        }
    }

    if let Some(template) = &transform.output_template {
        let mut output = Value::Object(Map::new());
        for (field_name, selector) in &template.fields {
            let value = resolve_selector(selector, &doc);
            path::set(&mut output, field_name, value);
        }
        doc = output;
    }

    doc
}

fn scalar_as_lookup_key(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn resolve_selector(selector: &str, doc: &Value) -> Value {
    if selector == "$" {
        return doc.clone();
    }
    if let Some(p) = selector.strip_prefix("$.") {
        return path::get(doc, p).cloned().unwrap_or(Value::Null);
    }
    Value::Null
}

const SENSITIVE_SUBSTRINGS: &[&str] = &["secret", "token", "auth", "password", "key"];
const REDACTED: &str = "***";

/// Recursively redact values whose key contains a sensitive substring
/// (case-insensitive). Used before logging or echoing a payload, never as
/// part of the forwarding pipeline itself.
pub fn sanitize(input: &Value) -> Value {
    match input {
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                let lower = k.to_lowercase();
                if SENSITIVE_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
                    out.insert(k.clone(), Value::String(REDACTED.to_string()));
                } else {
                    out.insert(k.clone(), sanitize(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        other => other.clone(),
    }
}
