//! Saved source→target field-mapping presets ("patterns") that compile into
//! a [`Transform`] without hand-writing paths, grounded in the original
//! implementation's `app/patterns.py`. Patterns are data only — they never
//! affect routing or forwarding directly; an operator applies one to
//! produce a `Transform` that is then attached to a route.

use crate::transform::{OutputTemplate, Transform};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Pattern {
    pub id: String,
    pub name: String,
    pub source_type: String,
    #[serde(default)]
    pub mappings: Vec<FieldMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldMapping {
    pub target_field_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_field_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_value: Option<Value>,
}

/// A source-schema field the pattern builder can map from, identified by a
/// dotted path into the producer's native payload shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceField {
    pub id: String,
    pub path: String,
    pub label: String,
}

/// A target field the downstream incident system expects, identified by the
/// flat output key it is written under.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetField {
    pub id: String,
    pub label: String,
}

/// Built-in source schemas available to the pattern builder. These mirror
/// the alert-producer shapes named in the spec (OpenShift Alertmanager,
/// Confluent Platform) but are not exhaustive — an operator can still hand
/// author `rename`/`output_template` paths for anything not covered here.
pub fn builtin_source_schemas() -> Vec<(&'static str, Vec<SourceField>)> {
    vec![
        (
            "openshift-alertmanager-4.20",
            vec![
                field("alertname", "alerts.0.labels.alertname", "Alert name"),
                field("severity", "alerts.0.labels.severity", "Severity"),
                field("namespace", "alerts.0.labels.namespace", "Namespace"),
                field("summary", "alerts.0.annotations.summary", "Summary"),
                field(
                    "description",
                    "alerts.0.annotations.description",
                    "Description",
                ),
                field("starts_at", "alerts.0.startsAt", "Start time"),
                field("status", "status", "Firing/resolved status"),
            ],
        ),
        (
            "confluent-platform-8.10",
            vec![
                field("cluster_id", "data.cluster_id", "Cluster ID"),
                field("event_type", "data.event_type", "Event type"),
                field("severity", "data.metric.severity", "Severity"),
                field("message", "data.message", "Message"),
                field("timestamp", "data.ts", "Timestamp"),
            ],
        ),
    ]
}

fn field(id: &str, path: &str, label: &str) -> SourceField {
    SourceField {
        id: id.to_string(),
        path: path.to_string(),
        label: label.to_string(),
    }
}

/// The fixed set of target fields the downstream incident system accepts.
pub fn target_fields() -> Vec<TargetField> {
    ["severity", "title", "description", "source", "ts", "status"]
        .into_iter()
        .map(|id| TargetField {
            id: id.to_string(),
            label: id.to_string(),
        })
        .collect()
}

/// Compile a pattern's mappings into a [`Transform`]: `rename` entries for
/// field mappings with a `source_field_id`, `enrich_static` for mappings
/// carrying a literal `static_value`, and a flat `output_template` that
/// projects every mapped target field.
pub fn compile(pattern: &Pattern, source_fields: &[SourceField]) -> Transform {
    let mut include_fields = Vec::new();
    let mut rename = IndexMap::new();
    let mut enrich_static = Map::new();
    let mut template_fields = IndexMap::new();

    for mapping in &pattern.mappings {
        if let Some(source_id) = &mapping.source_field_id {
            if let Some(source) = source_fields.iter().find(|f| &f.id == source_id) {
                include_fields.push(source.path.clone());
                rename.insert(source.path.clone(), mapping.target_field_id.clone());
                template_fields.insert(
                    mapping.target_field_id.clone(),
                    format!("$.{}", mapping.target_field_id),
                );
            }
        } else if let Some(value) = &mapping.static_value {
            enrich_static.insert(mapping.target_field_id.clone(), value.clone());
            template_fields.insert(
                mapping.target_field_id.clone(),
                format!("$.{}", mapping.target_field_id),
            );
        }
    }

    Transform {
        include_fields,
        drop_fields: Vec::new(),
        rename,
        enrich_static,
        map_values: IndexMap::new(),
        output_template: Some(OutputTemplate {
            r#type: "object".to_string(),
            fields: template_fields,
        }),
    }
}
