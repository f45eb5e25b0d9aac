use std::path::Path;
use toml::{Table, Value};

use crate::{
    errors::PropertyErrorKind,
    properties::{PropValue, Properties},
};

fn to_prop_value(value: Value) -> PropValue {
    match value {
        Value::String(val) => val.into(),
        Value::Integer(val) => val.into(),
        Value::Float(val) => val.into(),
        Value::Boolean(val) => val.into(),
        Value::Datetime(val) => PropValue::Scalar(val.to_string()),
        Value::Array(items) => PropValue::List(items.into_iter().map(to_prop_value).collect()),
        Value::Table(table) => PropValue::Map(table.into_iter().map(|(key, val)| (key, to_prop_value(val))).collect()),
    }
}

/// Parses a TOML document into flattened properties.
///
/// # Errors
/// Returns [`PropertyErrorKind::FileFormat`] on malformed TOML or conflicting keys.
pub fn parse_toml(text: &str, path: &Path) -> Result<Properties, PropertyErrorKind> {
    let table = text.parse::<Table>().map_err(|err| PropertyErrorKind::FileFormat {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    let mut props = Properties::new();
    props
        .set("", to_prop_value(Value::Table(table)))
        .map_err(|err| PropertyErrorKind::FileFormat {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::parse_toml;
    use crate::errors::PropertyErrorKind;

    use std::path::Path;

    #[test]
    fn test_parse() {
        let text = r#"
name = "sprig"
ports = [80, 443]

[server]
timeout = "5s"

[[servers]]
host = "a"

[[servers]]
host = "b"
"#;
        let props = parse_toml(text, Path::new("application.toml")).unwrap();
        assert_eq!(props.get("name"), Some("sprig"));
        assert_eq!(props.get("ports"), Some("80,443"));
        assert_eq!(props.get("server.timeout"), Some("5s"));
        assert_eq!(props.get("servers[1].host"), Some("b"));
        assert!(parse_toml("", Path::new("empty.toml")).unwrap().is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_toml("a = ", Path::new("bad.toml")),
            Err(PropertyErrorKind::FileFormat { .. })
        ));
    }
}
