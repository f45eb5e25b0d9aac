use std::path::Path;

use crate::{errors::PropertyErrorKind, properties::Properties};

/// Parses the `.properties` format: `key=value` or `key: value` lines, `#`/`!` comments
/// and `\` line continuations.
///
/// # Errors
/// Returns [`PropertyErrorKind::FileFormat`] if a line has no separator or a key conflicts.
pub fn parse_properties(text: &str, path: &Path) -> Result<Properties, PropertyErrorKind> {
    let mut props = Properties::new();
    let mut logical = String::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = if logical.is_empty() { line.trim() } else { line.trim_start() };
        if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }

        if let Some(head) = line.strip_suffix('\\') {
            logical.push_str(head);
            continue;
        }
        logical.push_str(line);

        let entry = core::mem::take(&mut logical);
        let Some(sep) = entry.find(['=', ':']) else {
            return Err(PropertyErrorKind::FileFormat {
                path: path.to_path_buf(),
                reason: format!("line {}: expected `key=value`", line_no + 1),
            });
        };
        let key = entry[..sep].trim();
        let val = entry[sep + 1..].trim();
        props.set(key, val).map_err(|err| PropertyErrorKind::FileFormat {
            path: path.to_path_buf(),
            reason: format!("line {}: {err}", line_no + 1),
        })?;
    }

    if !logical.is_empty() {
        return Err(PropertyErrorKind::FileFormat {
            path: path.to_path_buf(),
            reason: "file ends with a line continuation".to_owned(),
        });
    }
    Ok(props)
}
