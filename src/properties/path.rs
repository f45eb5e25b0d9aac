use core::fmt::{self, Write as _};

use crate::errors::PropertyErrorKind;

/// One step of a property key: `a.b[0]` is `[Key("a"), Key("b"), Index(0)]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

fn invalid(key: &str, reason: &'static str) -> PropertyErrorKind {
    PropertyErrorKind::InvalidKey {
        key: key.to_owned(),
        reason,
    }
}

/// Splits a dotted/bracketed key into its segments.
///
/// # Errors
/// Returns [`PropertyErrorKind::InvalidKey`] for empty segments, unclosed brackets and non-numeric indexes.
pub fn split_path(key: &str) -> Result<Vec<PathSegment>, PropertyErrorKind> {
    if key.is_empty() {
        return Err(invalid(key, "empty key"));
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    // `true` right after `]`, where only `.` or `[` may follow.
    let mut after_index = false;
    let mut chars = key.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        match ch {
            '.' => {
                if current.is_empty() && !after_index {
                    return Err(invalid(key, "empty segment"));
                }
                if !current.is_empty() {
                    segments.push(PathSegment::Key(core::mem::take(&mut current)));
                }
                after_index = false;
                if chars.peek().is_none() {
                    return Err(invalid(key, "key ends with `.`"));
                }
            }
            '[' => {
                if current.is_empty() && segments.is_empty() {
                    return Err(invalid(key, "key starts with an index"));
                }
                if !current.is_empty() {
                    segments.push(PathSegment::Key(core::mem::take(&mut current)));
                }
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some((_, ']')) => break,
                        Some((_, digit)) if digit.is_ascii_digit() => digits.push(digit),
                        Some(_) => return Err(invalid(key, "index must be a non-negative integer")),
                        None => return Err(invalid(key, "unclosed `[`")),
                    }
                }
                let index = digits.parse().map_err(|_| invalid(key, "index must be a non-negative integer"))?;
                segments.push(PathSegment::Index(index));
                after_index = true;
            }
            ']' => return Err(invalid(key, "unexpected `]`")),
            ch => {
                if after_index {
                    return Err(invalid(key, "index must be followed by `.` or `[`"));
                }
                current.push(ch);
            }
        }
    }

    if !current.is_empty() {
        segments.push(PathSegment::Key(current));
    }
    Ok(segments)
}

/// Joins segments back to the canonical key form.
#[must_use]
pub fn join_path(segments: &[PathSegment]) -> String {
    let mut key = String::new();
    for segment in segments {
        match segment {
            PathSegment::Key(name) => {
                if !key.is_empty() {
                    key.push('.');
                }
                key.push_str(name);
            }
            PathSegment::Index(index) => {
                let _ = write!(key, "[{index}]");
            }
        }
    }
    key
}

/// Composes a child key under `parent`, where an empty parent is the root.
#[must_use]
pub fn child_key(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_owned()
    } else if name.starts_with('[') {
        format!("{parent}{name}")
    } else {
        format!("{parent}.{name}")
    }
}

/// Returns `true` if `key` is `base` or lies under it (`base.x`, `base[i]`).
#[must_use]
pub fn is_descendant_or_self(key: &str, base: &str) -> bool {
    if base.is_empty() {
        return true;
    }
    match key.strip_prefix(base) {
        Some(rest) => rest.is_empty() || rest.starts_with('.') || rest.starts_with('['),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{child_key, is_descendant_or_self, join_path, split_path, PathSegment::*};

    #[test]
    fn test_split_path() {
        assert_eq!(
            split_path("a.b[0].c").unwrap(),
            vec![Key("a".into()), Key("b".into()), Index(0), Key("c".into())]
        );
        assert_eq!(split_path("list[1][2]").unwrap(), vec![Key("list".into()), Index(1), Index(2)]);
        assert_eq!(split_path("server-port").unwrap(), vec![Key("server-port".into())]);
    }

    #[test]
    fn test_split_path_errors() {
        for key in ["", ".a", "a.", "a..b", "[0]", "a[", "a[x]", "a]", "a[0]b", "a[-1]"] {
            assert!(split_path(key).is_err(), "{key} should be invalid");
        }
    }

    #[test]
    fn test_join_path() {
        for key in ["a", "a.b[0].c", "list[1][2]"] {
            assert_eq!(join_path(&split_path(key).unwrap()), key);
        }
    }

    #[test]
    fn test_child_and_descendant() {
        assert_eq!(child_key("", "a"), "a");
        assert_eq!(child_key("a", "b"), "a.b");
        assert_eq!(child_key("a", "[0]"), "a[0]");

        assert!(is_descendant_or_self("a.b", "a"));
        assert!(is_descendant_or_self("a[0]", "a"));
        assert!(is_descendant_or_self("a", "a"));
        assert!(!is_descendant_or_self("ab", "a"));
        assert!(!is_descendant_or_self("a", "a.b"));
    }
}
