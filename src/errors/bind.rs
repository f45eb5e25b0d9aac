use super::{ExprErrorKind, PropertyErrorKind};

#[derive(thiserror::Error, Debug)]
pub enum BindErrorKind {
    #[error("Property `{key}` not exist and no default value is given")]
    NotFound { key: String },
    #[error("Invalid bind tag `{tag}`: {reason}")]
    Tag { tag: String, reason: &'static str },
    #[error("Can't parse `{value}` of property `{key}` as {ty}: {reason}")]
    Parse {
        key: String,
        value: String,
        ty: &'static str,
        reason: String,
    },
    #[error("Validation `{expr}` failed for property `{key}` with value `{value}`")]
    ValidationFailed { key: String, expr: String, value: String },
    #[error("Validation `{expr}` of property `{key}` can't be evaluated: {source}")]
    Expr {
        key: String,
        expr: String,
        #[source]
        source: ExprErrorKind,
    },
    #[error("Property `{key}` of type {ty} can't have a non-empty default value")]
    DefaultNotAllowed { key: String, ty: &'static str },
    #[error("Converter for {ty} failed on property `{key}`: {source}")]
    Converter {
        key: String,
        ty: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Property(PropertyErrorKind),
}

impl BindErrorKind {
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<PropertyErrorKind> for BindErrorKind {
    fn from(err: PropertyErrorKind) -> Self {
        match err {
            PropertyErrorKind::NotFound { key } => Self::NotFound { key },
            err => Self::Property(err),
        }
    }
}
