use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use super::{parse_properties, PropertySource};
use crate::{
    errors::PropertyErrorKind,
    properties::{LayerKind, Properties},
};

pub const SUPPORTED_EXTENSIONS: &[&str] = &["properties", "yaml", "yml", "toml"];

/// Parses `text` with the reader matching the extension of `path`.
///
/// # Errors
/// Returns [`PropertyErrorKind::FileFormat`] for unsupported extensions and malformed contents.
pub fn parse_by_extension(text: &str, path: &Path) -> Result<Properties, PropertyErrorKind> {
    let ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
    match ext {
        "properties" => parse_properties(text, path),
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => super::parse_yaml(text, path),
        #[cfg(feature = "toml")]
        "toml" => super::parse_toml(text, path),
        _ => Err(PropertyErrorKind::FileFormat {
            path: path.to_path_buf(),
            reason: format!("unsupported extension `{ext}`"),
        }),
    }
}

/// A property file on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    kind: LayerKind,
    name: String,
}

impl FileSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, kind: LayerKind) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, kind, name }
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PropertySource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> LayerKind {
        self.kind
    }

    fn load(&self) -> Result<Properties, PropertyErrorKind> {
        let text = fs::read_to_string(&self.path).map_err(|source| PropertyErrorKind::Io {
            path: self.path.clone(),
            source,
        })?;
        let props = parse_by_extension(&text, &self.path)?;
        debug!(path = %self.path.display(), count = props.len(), "Property file loaded");
        Ok(props)
    }
}
