use std::{io, path::PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum PropertyErrorKind {
    #[error("Property `{key}` not exist")]
    NotFound { key: String },
    #[error("Property `{key}` conflicts with an existing entry: {reason}")]
    Conflict { key: String, reason: &'static str },
    #[error("Invalid property key `{key}`: {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("Syntax error in `{input}`: {reason}")]
    Syntax { input: String, reason: &'static str },
    #[error("Property store is frozen, `{key}` can't be written")]
    Frozen { key: String },
    #[error("Unsupported or malformed property file {}: {reason}", path.display())]
    FileFormat { path: PathBuf, reason: String },
    #[error("Failed to read property file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid environment filter: {0}")]
    EnvFilter(#[from] regex::Error),
}

impl PropertyErrorKind {
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
