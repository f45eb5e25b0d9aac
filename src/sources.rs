mod cmdline;
#[cfg(feature = "yaml")]
mod configmap;
mod env;
mod file;
mod properties_file;
#[cfg(feature = "toml")]
mod toml_file;
#[cfg(feature = "yaml")]
mod yaml_file;

pub use cmdline::CommandLineSource;
#[cfg(feature = "yaml")]
pub use configmap::ConfigMapSource;
pub use env::{EnvSource, ENV_PREFIX};
pub use file::{parse_by_extension, FileSource, SUPPORTED_EXTENSIONS};
pub use properties_file::parse_properties;
#[cfg(feature = "toml")]
pub use toml_file::parse_toml;
#[cfg(feature = "yaml")]
pub use yaml_file::parse_yaml;

use crate::{
    errors::PropertyErrorKind,
    properties::{LayerKind, Properties},
};

/// A named producer of one property layer.
pub trait PropertySource: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> LayerKind;

    /// # Errors
    /// Returns [`PropertyErrorKind::Io`] or [`PropertyErrorKind::FileFormat`] if the source can't be read.
    fn load(&self) -> Result<Properties, PropertyErrorKind>;
}
