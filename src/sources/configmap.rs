use serde_yaml::Value;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use super::{parse_by_extension, PropertySource};
use crate::{
    errors::PropertyErrorKind,
    properties::{LayerKind, Properties},
};

/// A Kubernetes ConfigMap manifest whose `data` map holds one property file per entry:
///
/// ```yaml
/// data:
///   application.properties: |
///     server.port=8080
/// ```
///
/// Entries are merged in file name order.
#[derive(Debug, Clone)]
pub struct ConfigMapSource {
    path: PathBuf,
    kind: LayerKind,
    name: String,
}

impl ConfigMapSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("configmap:{}", path.display());
        Self {
            path,
            kind: LayerKind::DefaultFile,
            name,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: LayerKind) -> Self {
        self.kind = kind;
        self
    }

    /// # Errors
    /// Returns [`PropertyErrorKind::FileFormat`] if the manifest or an entry is malformed.
    pub fn parse(text: &str, path: &Path) -> Result<Properties, PropertyErrorKind> {
        let format_err = |reason: String| PropertyErrorKind::FileFormat {
            path: path.to_path_buf(),
            reason,
        };

        let manifest: Value = serde_yaml::from_str(text).map_err(|err| format_err(err.to_string()))?;
        let Some(data) = manifest.get("data") else {
            return Ok(Properties::new());
        };
        let Value::Mapping(entries) = data else {
            return Err(format_err("`data` must be a mapping".to_owned()));
        };

        let mut entries = entries
            .iter()
            .map(|(name, contents)| match (name.as_str(), contents.as_str()) {
                (Some(name), Some(contents)) => Ok((name, contents)),
                _ => Err(format_err("`data` entries must be file names mapped to strings".to_owned())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|(name, _)| *name);

        let mut props = Properties::new();
        for (file_name, contents) in entries {
            let parsed = parse_by_extension(contents, Path::new(file_name))?;
            props
                .merge(&parsed)
                .map_err(|err| format_err(format!("entry `{file_name}`: {err}")))?;
            debug!(entry = file_name, "ConfigMap entry loaded");
        }
        Ok(props)
    }
}

impl PropertySource for ConfigMapSource {
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
        Self::parse(&text, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::ConfigMapSource;
    use crate::errors::PropertyErrorKind;

    use std::path::Path;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_parse() {
        let text = "
apiVersion: v1
kind: ConfigMap
data:
  application.properties: |
    server.port=8080
    name=props
  application.yaml: |
    name: yaml
    server:
      host: example.org
";
        let props = ConfigMapSource::parse(text, Path::new("configmap.yaml")).unwrap();
        assert_eq!(props.get("server.port"), Some("8080"));
        assert_eq!(props.get("server.host"), Some("example.org"));
        // `application.yaml` sorts after `application.properties`
        assert_eq!(props.get("name"), Some("yaml"));
    }

    #[test]
    #[traced_test]
    fn test_parse_errors() {
        let path = Path::new("configmap.yaml");
        assert!(ConfigMapSource::parse("kind: ConfigMap", path).unwrap().is_empty());
        assert!(matches!(
            ConfigMapSource::parse("data:\n  app.ini: x=1", path),
            Err(PropertyErrorKind::FileFormat { .. })
        ));
        assert!(matches!(
            ConfigMapSource::parse("data: [1, 2]", path),
            Err(PropertyErrorKind::FileFormat { .. })
        ));
    }
}
