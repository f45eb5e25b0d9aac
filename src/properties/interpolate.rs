use tracing::debug;

use super::PropertyReader;
use crate::errors::PropertyErrorKind;

const MAX_DEPTH: usize = 32;

/// Returns the byte offset of the `}` closing the `${` at `start`, tracking nested segments by a balance counter.
pub(crate) fn find_closing(input: &str, start: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut balance = 0usize;
    let mut pos = start;
    while pos < bytes.len() {
        if bytes[pos] == b'$' && bytes.get(pos + 1) == Some(&b'{') {
            balance += 1;
            pos += 2;
            continue;
        }
        if bytes[pos] == b'}' {
            balance -= 1;
            if balance == 0 {
                return Some(pos);
            }
        }
        pos += 1;
    }
    None
}

/// Splits the inside of a segment into its key and the default following the first top-level `:=`.
pub(crate) fn split_default(inner: &str) -> (&str, Option<&str>) {
    let bytes = inner.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        if bytes[pos] == b'$' && bytes.get(pos + 1) == Some(&b'{') {
            match find_closing(inner, pos) {
                Some(end) => {
                    pos = end + 1;
                    continue;
                }
                None => break,
            }
        }
        if bytes[pos] == b':' && bytes.get(pos + 1) == Some(&b'=') {
            return (&inner[..pos], Some(&inner[pos + 2..]));
        }
        pos += 1;
    }
    (inner, None)
}

/// Replaces every `${key:=default}` segment of `input` with the value found in `reader`.
///
/// Values and defaults are resolved again, so `${a:=${b:=c}}` falls through both keys to `c`.
///
/// # Errors
/// - Returns [`PropertyErrorKind::NotFound`] if a key is absent and has no default
/// - Returns [`PropertyErrorKind::Syntax`] if a segment isn't closed or nesting is too deep
pub fn resolve<R: PropertyReader + ?Sized>(reader: &R, input: &str) -> Result<String, PropertyErrorKind> {
    resolve_with_depth(reader, input, 0)
}

fn resolve_with_depth<R: PropertyReader + ?Sized>(reader: &R, input: &str, depth: usize) -> Result<String, PropertyErrorKind> {
    if depth > MAX_DEPTH {
        return Err(PropertyErrorKind::Syntax {
            input: input.to_owned(),
            reason: "interpolation nested too deeply, probably a self reference",
        });
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let Some(end) = find_closing(rest, start) else {
            return Err(PropertyErrorKind::Syntax {
                input: input.to_owned(),
                reason: "unclosed `${`",
            });
        };
        out.push_str(&rest[..start]);

        let (key, default) = split_default(&rest[start + 2..end]);
        let key = resolve_with_depth(reader, key.trim(), depth + 1)?;
        if key.is_empty() {
            return Err(PropertyErrorKind::Syntax {
                input: input.to_owned(),
                reason: "empty key in `${}`",
            });
        }

        let raw = match (reader.get(&key), default) {
            (Some(val), _) => val.to_owned(),
            (None, Some(default)) => {
                debug!(%key, "Property not found, default used");
                default.to_owned()
            }
            (None, None) => return Err(PropertyErrorKind::NotFound { key }),
        };
        out.push_str(&resolve_with_depth(reader, &raw, depth + 1)?);

        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
