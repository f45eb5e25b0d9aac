use regex::Regex;
use tracing::{debug, warn};

use super::PropertySource;
use crate::{
    errors::PropertyErrorKind,
    properties::{LayerKind, Properties},
};

/// Variables with this prefix are mapped to dotted lower-case keys: `SPRIG_SERVER_PORT` is `server.port`.
pub const ENV_PREFIX: &str = "SPRIG_";

/// Environment variables filtered by a regex allow-list. Without a filter every variable passes.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    filter: Option<Regex>,
    vars: Option<Vec<(String, String)>>,
}

impl EnvSource {
    /// # Errors
    /// Returns [`PropertyErrorKind::EnvFilter`] if `pattern` isn't a valid regex.
    pub fn new(pattern: &str) -> Result<Self, PropertyErrorKind> {
        Ok(Self {
            filter: Some(Regex::new(pattern)?),
            vars: None,
        })
    }

    /// Uses `vars` instead of the process environment.
    #[must_use]
    pub fn with_vars<K, V, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.vars = Some(vars.into_iter().map(|(key, val)| (key.into(), val.into())).collect());
        self
    }

    fn map_name(name: &str) -> String {
        match name.strip_prefix(ENV_PREFIX) {
            Some(rest) => rest.to_lowercase().replace('_', "."),
            None => name.to_owned(),
        }
    }
}

impl PropertySource for EnvSource {
    fn name(&self) -> &str {
        "environment"
    }

    fn kind(&self) -> LayerKind {
        LayerKind::Env
    }

    fn load(&self) -> Result<Properties, PropertyErrorKind> {
        let mut vars = match &self.vars {
            Some(vars) => vars.clone(),
            None => std::env::vars().collect::<Vec<_>>(),
        };
        vars.sort();

        let mut props = Properties::new();
        for (name, val) in vars {
            if self.filter.as_ref().is_some_and(|filter| !filter.is_match(&name)) {
                continue;
            }
            let key = Self::map_name(&name);
            // Names like `A..B` or clashing with another variable
            if let Err(err) = props.set(&key, val) {
                warn!(%name, %err, "Environment variable skipped");
            }
        }
        debug!(count = props.len(), "Environment loaded");
        Ok(props)
    }
}

#[cfg(test)]
mod tests {
    use super::EnvSource;
    use crate::{errors::PropertyErrorKind, sources::PropertySource as _};

    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_load() {
        let source = EnvSource::default().with_vars([
            ("SPRIG_SERVER_PORT", "8080"),
            ("HOME", "/root"),
            ("SPRIG_SPRING_PROFILES_ACTIVE", "dev"),
        ]);
        let props = source.load().unwrap();
        assert_eq!(props.get("server.port"), Some("8080"));
        assert_eq!(props.get("spring.profiles.active"), Some("dev"));
        assert_eq!(props.get("HOME"), Some("/root"));
    }

    #[test]
    #[traced_test]
    fn test_filter() {
        let source = EnvSource::new("^SPRIG_")
            .unwrap()
            .with_vars([("SPRIG_A", "1"), ("PATH", "/bin")]);
        let props = source.load().unwrap();
        assert_eq!(props.get("a"), Some("1"));
        assert!(!props.has("PATH"));

        assert!(matches!(EnvSource::new("("), Err(PropertyErrorKind::EnvFilter(_))));
    }
}
