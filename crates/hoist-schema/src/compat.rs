use hoist_domain::{BreakingChange, BreakingChangeType, CompatibilityMode};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::SchemaError;

/// Outcome of a structural compatibility check between two schema versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityCheckResult {
    pub is_compatible: bool,
    pub compatibility_mode: CompatibilityMode,
    pub breaking_changes: Vec<BreakingChange>,
}

impl CompatibilityCheckResult {
    fn compatible(mode: CompatibilityMode) -> Self {
        Self { is_compatible: true, compatibility_mode: mode, breaking_changes: Vec::new() }
    }
}

/// Which side of the check is the reader.
///
/// Backward: the new schema reads data written under the old one.
/// Forward: the old schema reads data written under the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Backward,
    Forward,
}

/// Structurally diff two JSON Schema documents under `mode`.
///
/// Returns `InvalidDefinition` when either document is not valid JSON;
/// everything else is reported through `breaking_changes`.
pub fn check_compatibility(
    old_definition: &str,
    new_definition: &str,
    mode: CompatibilityMode,
) -> Result<CompatibilityCheckResult, SchemaError> {
    if mode == CompatibilityMode::None {
        return Ok(CompatibilityCheckResult::compatible(mode));
    }

    let old: Value = serde_json::from_str(old_definition)
        .map_err(|e| SchemaError::InvalidDefinition(e.to_string()))?;
    let new: Value = serde_json::from_str(new_definition)
        .map_err(|e| SchemaError::InvalidDefinition(e.to_string()))?;

    let mut changes = Vec::new();
    match mode {
        CompatibilityMode::Backward => {
            check_node(&new, &old, "$", Direction::Backward, &mut changes);
        }
        CompatibilityMode::Forward => {
            check_node(&old, &new, "$", Direction::Forward, &mut changes);
        }
        CompatibilityMode::Full => {
            check_node(&new, &old, "$", Direction::Backward, &mut changes);
            let mut forward = Vec::new();
            check_node(&old, &new, "$", Direction::Forward, &mut forward);
            for change in forward {
                let seen = changes
                    .iter()
                    .any(|c| c.change_type == change.change_type && c.path == change.path);
                if !seen {
                    changes.push(change);
                }
            }
        }
        CompatibilityMode::None => unreachable!(),
    }

    Ok(CompatibilityCheckResult {
        is_compatible: changes.is_empty(),
        compatibility_mode: mode,
        breaking_changes: changes,
    })
}

/// Compare one schema node. `reader` must be able to read any instance the
/// `writer` schema permits; violations are appended to `out`.
fn check_node(
    reader: &Value,
    writer: &Value,
    path: &str,
    direction: Direction,
    out: &mut Vec<BreakingChange>,
) {
    check_required(reader, writer, path, direction, out);
    check_type(reader, writer, path, direction, out);
    if direction == Direction::Backward {
        check_enum(reader, writer, path, out);
    }
    check_constraints(reader, writer, path, direction, out);

    // Nested object properties
    if let (Some(reader_props), Some(writer_props)) = (
        reader.get("properties").and_then(Value::as_object),
        writer.get("properties").and_then(Value::as_object),
    ) {
        for (name, reader_child) in reader_props {
            if let Some(writer_child) = writer_props.get(name) {
                let child_path = format!("{}.{}", path, name);
                check_node(reader_child, writer_child, &child_path, direction, out);
            }
        }
    }

    // Array items
    if let (Some(reader_items), Some(writer_items)) =
        (reader.get("items"), writer.get("items"))
    {
        if reader_items.is_object() && writer_items.is_object() {
            let child_path = format!("{}[]", path);
            check_node(reader_items, writer_items, &child_path, direction, out);
        }
    }
}

/// A field the reader requires that the writer does not guarantee.
fn check_required(
    reader: &Value,
    writer: &Value,
    path: &str,
    direction: Direction,
    out: &mut Vec<BreakingChange>,
) {
    let reader_required = required_fields(reader);
    let writer_required = required_fields(writer);

    for field in &reader_required {
        if writer_required.iter().any(|f| f == field) {
            continue;
        }
        let field_path = format!("{}.{}", path, field);
        let (change_type, description) = match direction {
            Direction::Backward => (
                BreakingChangeType::AddedRequiredField,
                format!("required field '{}' added in the new schema", field),
            ),
            Direction::Forward => (
                BreakingChangeType::RemovedField,
                format!("required field '{}' removed or made optional in the new schema", field),
            ),
        };
        out.push(BreakingChange { change_type, path: field_path, description });
    }
}

fn check_type(
    reader: &Value,
    writer: &Value,
    path: &str,
    direction: Direction,
    out: &mut Vec<BreakingChange>,
) {
    let (Some(reader_type), Some(writer_type)) = (
        reader.get("type").and_then(Value::as_str),
        writer.get("type").and_then(Value::as_str),
    ) else {
        return;
    };
    if reader_type == writer_type {
        return;
    }
    let (from, to) = match direction {
        Direction::Backward => (writer_type, reader_type),
        Direction::Forward => (reader_type, writer_type),
    };
    out.push(BreakingChange {
        change_type: BreakingChangeType::TypeChanged,
        path: path.to_string(),
        description: format!("type changed from {} to {}", from, to),
    });
}

/// Enum values the writer may produce that the reader no longer accepts.
/// Widened enums (values added) are treated as compatible, so this only runs
/// for the backward direction.
fn check_enum(reader: &Value, writer: &Value, path: &str, out: &mut Vec<BreakingChange>) {
    let (Some(reader_enum), Some(writer_enum)) = (
        reader.get("enum").and_then(Value::as_array),
        writer.get("enum").and_then(Value::as_array),
    ) else {
        return;
    };
    for value in writer_enum {
        if !reader_enum.contains(value) {
            out.push(BreakingChange {
                change_type: BreakingChangeType::RemovedEnumValue,
                path: path.to_string(),
                description: format!("enum value {} removed", value),
            });
        }
    }
}

/// Bounds where the reader is stricter than the writer. Lower bounds break
/// when the reader's is greater; upper bounds when the reader's is smaller.
fn check_constraints(
    reader: &Value,
    writer: &Value,
    path: &str,
    direction: Direction,
    out: &mut Vec<BreakingChange>,
) {
    const LOWER_BOUNDS: [&str; 3] = ["minLength", "minimum", "minItems"];
    const UPPER_BOUNDS: [&str; 3] = ["maxLength", "maximum", "maxItems"];

    let mut narrowed = |key: &str, reader_v: f64, writer_v: f64| {
        let (from, to) = match direction {
            Direction::Backward => (writer_v, reader_v),
            Direction::Forward => (reader_v, writer_v),
        };
        out.push(BreakingChange {
            change_type: BreakingChangeType::ConstraintNarrowed,
            path: path.to_string(),
            description: format!("{} changed from {} to {}", key, from, to),
        });
    };

    for key in LOWER_BOUNDS {
        if let (Some(r), Some(w)) = (number_at(reader, key), number_at(writer, key)) {
            if r > w {
                narrowed(key, r, w);
            }
        }
    }
    for key in UPPER_BOUNDS {
        if let (Some(r), Some(w)) = (number_at(reader, key), number_at(writer, key)) {
            if r < w {
                narrowed(key, r, w);
            }
        }
    }
}

fn required_fields(schema: &Value) -> Vec<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn number_at(schema: &Value, key: &str) -> Option<f64> {
    schema.get(key).and_then(Value::as_f64)
}

// ── Definition fingerprint ────────────────────────────────────────────────────

/// Serialize the definition to canonical JSON (object keys sorted) and return
/// its SHA-256 hex digest. Used to detect identical re-submissions cheaply.
pub fn definition_fingerprint(definition: &str) -> Result<String, SchemaError> {
    let v: Value = serde_json::from_str(definition)
        .map_err(|e| SchemaError::InvalidDefinition(e.to_string()))?;
    let canonical = sort_json_keys(v);
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

/// Recursively sort JSON object keys so map field ordering doesn't affect
/// the digest.
fn sort_json_keys(v: Value) -> Value {
    match v {
        Value::Object(map) => {
            let sorted: std::collections::BTreeMap<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, sort_json_keys(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(sort_json_keys).collect()),
        other => other,
    }
}
