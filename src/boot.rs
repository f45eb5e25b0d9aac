use std::path::PathBuf;
use tracing::{debug, info_span};

use crate::{
    errors::PropertyErrorKind,
    properties::{Layer, LayerKind, LayeredProperties, Properties, PropValue, PropertyReader as _},
    sources::{CommandLineSource, EnvSource, FileSource, PropertySource, SUPPORTED_EXTENSIONS},
};

/// Key holding the comma-separated active profiles.
pub const PROFILE_KEY: &str = "spring.profiles.active";

pub const DEFAULT_APP_NAME: &str = "application";
pub const DEFAULT_CONFIG_DIR: &str = "config";

/// Describes where the application's properties come from.
///
/// Layers from the highest priority: API writes, command-line flags, environment,
/// profile files (`application-<profile>.<ext>`), default files (`application.<ext>`), built-in defaults.
#[derive(Debug, Clone)]
pub struct BootConfig {
    config_dirs: Vec<PathBuf>,
    app_name: String,
    files: Vec<PathBuf>,
    #[cfg(feature = "yaml")]
    configmaps: Vec<PathBuf>,
    env: Option<EnvSource>,
    args: Vec<String>,
    builtin: Properties,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            config_dirs: vec![PathBuf::from(DEFAULT_CONFIG_DIR)],
            app_name: DEFAULT_APP_NAME.to_owned(),
            files: Vec::new(),
            #[cfg(feature = "yaml")]
            configmaps: Vec::new(),
            env: Some(EnvSource::default()),
            args: Vec::new(),
            builtin: Properties::new(),
        }
    }
}

impl BootConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the directories searched for property files.
    #[must_use]
    pub fn config_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.config_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dirs.push(dir.into());
        self
    }

    /// Base name of property files, `application` by default.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// An extra file loaded above the default files.
    #[must_use]
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    #[cfg(feature = "yaml")]
    #[must_use]
    pub fn configmap(mut self, path: impl Into<PathBuf>) -> Self {
        self.configmaps.push(path.into());
        self
    }

    /// Only environment variables matching `pattern` are loaded.
    ///
    /// # Errors
    /// Returns [`PropertyErrorKind::EnvFilter`] if `pattern` isn't a valid regex.
    pub fn env_filter(mut self, pattern: &str) -> Result<Self, PropertyErrorKind> {
        self.env = Some(EnvSource::new(pattern)?);
        Ok(self)
    }

    #[must_use]
    pub fn env(mut self, source: EnvSource) -> Self {
        self.env = Some(source);
        self
    }

    #[must_use]
    pub fn without_env(mut self) -> Self {
        self.env = None;
        self
    }

    /// Command-line arguments, without the program name.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// # Errors
    /// Returns [`PropertyErrorKind::Conflict`] or [`PropertyErrorKind::InvalidKey`] from [`Properties::set`].
    pub fn builtin(mut self, key: &str, val: impl Into<PropValue>) -> Result<Self, PropertyErrorKind> {
        self.builtin.set(key, val)?;
        Ok(self)
    }

    fn file_sources(&self, file_stem: &str, kind: LayerKind) -> Vec<FileSource> {
        self.config_dirs
            .iter()
            .flat_map(|dir| SUPPORTED_EXTENSIONS.iter().map(move |ext| dir.join(format!("{file_stem}.{ext}"))))
            .filter(|path| path.is_file())
            .map(|path| FileSource::new(path, kind))
            .collect()
    }

    fn base_sources(&self) -> Vec<Box<dyn PropertySource>> {
        let mut sources: Vec<Box<dyn PropertySource>> = Vec::new();
        for source in self.file_sources(&self.app_name, LayerKind::DefaultFile) {
            sources.push(Box::new(source));
        }
        for path in &self.files {
            sources.push(Box::new(FileSource::new(path, LayerKind::DefaultFile)));
        }
        #[cfg(feature = "yaml")]
        for path in &self.configmaps {
            sources.push(Box::new(crate::sources::ConfigMapSource::new(path)));
        }
        if let Some(env) = &self.env {
            sources.push(Box::new(env.clone()));
        }
        sources.push(Box::new(CommandLineSource::new(self.args.iter().cloned())));
        sources
    }

    /// Loads every source and assembles the layered properties.
    ///
    /// The active profiles are read from the provisional assembly without profile files;
    /// their files are then added and the result is assembled once more.
    ///
    /// # Errors
    /// Returns the first error of a source, see [`PropertySource::load`].
    pub fn assemble(&self) -> Result<LayeredProperties, PropertyErrorKind> {
        let span = info_span!("assemble", app_name = %self.app_name);
        let _guard = span.enter();

        let mut layers = LayeredProperties::new().with(Layer::new("builtin", LayerKind::Builtin, self.builtin.clone()));
        for source in self.base_sources() {
            layers.push(Layer::new(source.name(), source.kind(), source.load()?));
        }

        let profiles = active_profiles(&layers);
        for profile in &profiles {
            for source in self.file_sources(&format!("{}-{profile}", self.app_name), LayerKind::ProfileFile) {
                layers.push(Layer::new(source.name(), source.kind(), source.load()?));
            }
        }
        debug!(?profiles, layers = layers.layers().count(), "Properties assembled");
        Ok(layers)
    }
}

/// Profiles listed in [`PROFILE_KEY`], in declaration order.
#[must_use]
pub fn active_profiles(layers: &LayeredProperties) -> Vec<String> {
    layers
        .get(PROFILE_KEY)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|profile| !profile.is_empty())
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{active_profiles, BootConfig};
    use crate::{properties::PropertyReader as _, sources::EnvSource};

    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_assemble_without_files() {
        let layers = BootConfig::new()
            .config_dirs(Vec::<std::path::PathBuf>::new())
            .env(EnvSource::default().with_vars([("SPRIG_SERVER_PORT", "80"), ("SPRIG_SPRING_PROFILES_ACTIVE", "dev, test")]))
            .args(["-server.port", "90"])
            .builtin("server.port", 70)
            .unwrap()
            .builtin("server.host", "localhost")
            .unwrap()
            .assemble()
            .unwrap();

        assert_eq!(layers.get("server.port"), Some("90"));
        assert_eq!(layers.get("server.host"), Some("localhost"));
        assert_eq!(active_profiles(&layers), vec!["dev", "test"]);
    }
}
