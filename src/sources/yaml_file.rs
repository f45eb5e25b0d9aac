use serde_yaml::Value;
use std::path::Path;

use crate::{
    errors::PropertyErrorKind,
    properties::{PropValue, Properties},
};

fn to_prop_value(value: Value) -> PropValue {
    match value {
        Value::Null => PropValue::Scalar(String::new()),
        Value::Bool(val) => val.into(),
        Value::Number(val) => PropValue::Scalar(val.to_string()),
        Value::String(val) => val.into(),
        Value::Sequence(items) => PropValue::List(items.into_iter().map(to_prop_value).collect()),
        Value::Mapping(entries) => PropValue::Map(
            entries
                .into_iter()
                .map(|(key, val)| (scalar_key(key), to_prop_value(val)))
                .collect(),
        ),
        Value::Tagged(tagged) => to_prop_value(tagged.value),
    }
}

fn scalar_key(key: Value) -> String {
    match key {
        Value::String(key) => key,
        Value::Bool(key) => key.to_string(),
        Value::Number(key) => key.to_string(),
        other => serde_yaml::to_string(&other).unwrap_or_default().trim().to_owned(),
    }
}

/// Parses a YAML document into flattened properties.
///
/// # Errors
/// Returns [`PropertyErrorKind::FileFormat`] on malformed YAML or conflicting keys.
pub fn parse_yaml(text: &str, path: &Path) -> Result<Properties, PropertyErrorKind> {
    let value: Value = serde_yaml::from_str(text).map_err(|err| PropertyErrorKind::FileFormat {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    let mut props = Properties::new();
    match to_prop_value(value) {
        PropValue::Map(entries) => {
            props.set("", PropValue::Map(entries)).map_err(|err| PropertyErrorKind::FileFormat {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        }
        // An empty document
        PropValue::Scalar(val) if val.is_empty() => {}
        _ => {
            return Err(PropertyErrorKind::FileFormat {
                path: path.to_path_buf(),
                reason: "top level must be a mapping".to_owned(),
            })
        }
    }
    Ok(props)
}
