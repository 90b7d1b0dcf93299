//! # YAML Merge
//!
//! Deep-merge semantics for the `Merge` copy strategy. Multi-document YAML
//! streams are folded into a single mapping; between base and overlay the
//! keys are unioned, maps recurse, scalars in the overlay win, and arrays
//! are replaced entirely (Helm values semantics). JSON inputs parse as a
//! YAML subset.

use std::path::Path;

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use super::BuildError;

/// Load a multi-document YAML file and fold its documents into one mapping
pub fn load_file(path: &Path) -> Result<Mapping, BuildError> {
    let raw = std::fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
    load_str(&raw).map_err(|detail| BuildError::Unmarshal {
        path: path.display().to_string(),
        detail,
    })
}

fn load_str(raw: &str) -> Result<Mapping, String> {
    let mut folded = Mapping::new();
    for document in serde_yaml::Deserializer::from_str(raw) {
        let value = Value::deserialize(document).map_err(|e| e.to_string())?;
        match value {
            Value::Null => {}
            Value::Mapping(map) => {
                let mut base = Value::Mapping(folded);
                deep_merge(&mut base, Value::Mapping(map));
                folded = match base {
                    Value::Mapping(m) => m,
                    _ => unreachable!(),
                };
            }
            other => {
                return Err(format!(
                    "expected a mapping document, got {}",
                    value_kind(&other)
                ));
            }
        }
    }
    Ok(folded)
}

/// Merge `overlay` into `base`.
///
/// Maps merge key-wise and recurse; every other value kind in the overlay
/// replaces the base value, including sequences.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

/// Merge the YAML file at `overlay_path` onto the one at `base_path`,
/// writing the folded result back over `base_path`
pub fn merge_files(base_path: &Path, overlay_path: &Path) -> Result<(), BuildError> {
    let base = load_file(base_path)?;
    let overlay = load_file(overlay_path)?;

    let mut merged = Value::Mapping(base);
    deep_merge(&mut merged, Value::Mapping(overlay));

    let rendered = serde_yaml::to_string(&merged).map_err(|e| BuildError::Unmarshal {
        path: base_path.display().to_string(),
        detail: e.to_string(),
    })?;
    std::fs::write(base_path, rendered).map_err(|e| BuildError::io(base_path, e))?;
    Ok(())
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
