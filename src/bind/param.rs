use crate::{
    errors::BindErrorKind,
    properties::{child_key, find_closing, split_default},
};

/// Where a value is bound from: the full key, an optional default and an optional validation expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindParam {
    pub key: String,
    pub default: Option<String>,
    pub validate: Option<String>,
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '[' | ']' | '-'))
}

impl BindParam {
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            default: None,
            validate: None,
        }
    }

    /// The root of the property tree.
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a `${key:=default}` tag relative to `parent`. An empty key binds to `parent` itself.
    ///
    /// # Errors
    /// Returns [`BindErrorKind::Tag`] if the tag isn't a single `${…}` segment or its key is malformed.
    pub fn parse(parent: &str, tag: &str) -> Result<Self, BindErrorKind> {
        let tag_err = |reason| BindErrorKind::Tag {
            tag: tag.to_owned(),
            reason,
        };

        let tag = tag.trim();
        if !tag.starts_with("${") {
            return Err(tag_err("must start with `${`"));
        }
        match find_closing(tag, 0) {
            Some(end) if end == tag.len() - 1 => {}
            Some(_) => return Err(tag_err("must be a single `${…}` segment")),
            None => return Err(tag_err("unclosed `${`")),
        }

        let (key, default) = split_default(&tag[2..tag.len() - 1]);
        let key = key.trim();
        if !key.is_empty() && !is_valid_key(key) {
            return Err(tag_err("key must match `[A-Za-z_][A-Za-z0-9_.[]-]*`"));
        }

        Ok(Self {
            key: if key.is_empty() { parent.to_owned() } else { child_key(parent, key) },
            default: default.map(ToOwned::to_owned),
            validate: None,
        })
    }

    #[inline]
    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_validate(mut self, expr: impl Into<String>) -> Self {
        self.validate = Some(expr.into());
        self
    }

    /// A struct field under this key. Neither the default nor the validation is inherited.
    #[must_use]
    pub fn field(&self, name: &str) -> Self {
        Self::new(child_key(&self.key, name))
    }

    /// A collection element under this key. The validation applies to every element.
    #[must_use]
    pub fn element(&self, name: &str) -> Self {
        let key = if name.bytes().all(|ch| ch.is_ascii_digit()) {
            format!("{}[{name}]", self.key)
        } else {
            child_key(&self.key, name)
        };
        Self {
            key,
            default: None,
            validate: self.validate.clone(),
        }
    }

    #[inline]
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        self.element(&index.to_string())
    }

    /// `true` if the default is given and isn't empty.
    #[inline]
    #[must_use]
    pub fn has_non_empty_default(&self) -> bool {
        self.default.as_deref().is_some_and(|default| !default.is_empty())
    }
}
