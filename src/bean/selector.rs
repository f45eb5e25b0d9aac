use std::{
    any::{type_name, TypeId},
    fmt,
};
use tracing::debug;

use crate::{
    errors::ContainerErrorKind,
    expr::{self, Value},
};

const TAG_PREFIX: &str = "tag:";

/// Chooses beans from the registry.
///
/// The string form is `name`, or `tag:<expr>` for a tag expression such as `tag:db && !test`.
/// Selectors parsed with [`BeanSelector::parse`] may end with `?` to allow an empty result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BeanSelector {
    Name(String),
    /// A concrete type or an exported interface
    Type { id: TypeId, name: &'static str },
    Tag(String),
}

impl BeanSelector {
    #[inline]
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Type {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    #[inline]
    #[must_use]
    pub fn tag(expr: impl Into<String>) -> Self {
        Self::Tag(expr.into())
    }

    /// Parses a selector string, returning the selector and whether it's optional.
    ///
    /// # Errors
    /// Returns [`ContainerErrorKind::InvalidSelector`] if the name is empty or the tag expression is malformed.
    pub fn parse(input: &str) -> Result<(Self, bool), ContainerErrorKind> {
        let trimmed = input.trim();
        let (body, optional) = match trimmed.strip_suffix('?') {
            Some(body) => (body.trim_end(), true),
            None => (trimmed, false),
        };
        let invalid = |reason: String| ContainerErrorKind::InvalidSelector {
            selector: input.to_owned(),
            reason,
        };

        if let Some(tag_expr) = body.strip_prefix(TAG_PREFIX) {
            expr::parse(tag_expr).map_err(|err| invalid(err.to_string()))?;
            return Ok((Self::Tag(tag_expr.trim().to_owned()), optional));
        }
        if body.is_empty() {
            return Err(invalid("empty bean name".to_owned()));
        }
        if body.chars().any(char::is_whitespace) {
            return Err(invalid("bean names can't contain whitespace".to_owned()));
        }
        Ok((Self::Name(body.to_owned()), optional))
    }

    /// `true` if the selector chooses a bean with the given identity.
    #[must_use]
    pub fn matches(&self, name: &str, exports: &[TypeId], tags: &[String]) -> bool {
        match self {
            Self::Name(expected) => expected == name,
            Self::Type { id, .. } => exports.contains(id),
            Self::Tag(tag_expr) => match_tags(tag_expr, tags),
        }
    }
}

/// Evaluates a tag expression: every identifier is `true` if the bean carries that tag.
fn match_tags(tag_expr: &str, tags: &[String]) -> bool {
    let vars = |name: &str| Some(Value::Bool(tags.iter().any(|tag| tag == name)));
    match expr::eval_bool(tag_expr, &vars) {
        Ok(matched) => matched,
        Err(err) => {
            debug!(tag_expr, %err, "Tag expression doesn't match");
            false
        }
    }
}

impl From<&str> for BeanSelector {
    fn from(value: &str) -> Self {
        match value.trim().strip_prefix(TAG_PREFIX) {
            Some(tag_expr) => Self::Tag(tag_expr.trim().to_owned()),
            None => Self::Name(value.trim().to_owned()),
        }
    }
}

impl From<String> for BeanSelector {
    #[inline]
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl fmt::Display for BeanSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Type { name, .. } => f.write_str(name),
            Self::Tag(tag_expr) => write!(f, "{TAG_PREFIX}{tag_expr}"),
        }
    }
}
