use tracing::{debug, warn};

use super::PropertySource;
use crate::{
    errors::PropertyErrorKind,
    properties::{LayerKind, Properties},
};

/// Command-line flags in `-name value` pairs. A flag followed by another flag or by nothing gets the empty string.
#[derive(Debug, Clone, Default)]
pub struct CommandLineSource {
    args: Vec<String>,
}

impl CommandLineSource {
    /// `args` without the program name.
    #[must_use]
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Arguments of the current process.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(std::env::args().skip(1))
    }
}

impl PropertySource for CommandLineSource {
    fn name(&self) -> &str {
        "command-line"
    }

    fn kind(&self) -> LayerKind {
        LayerKind::CommandLine
    }

    fn load(&self) -> Result<Properties, PropertyErrorKind> {
        let mut props = Properties::new();
        let mut args = self.args.iter().peekable();
        while let Some(arg) = args.next() {
            let Some(name) = arg.strip_prefix('-') else {
                debug!(%arg, "Positional argument ignored");
                continue;
            };
            let name = name.strip_prefix('-').unwrap_or(name);
            let val = match args.peek() {
                Some(next) if !next.starts_with('-') => args.next().cloned().unwrap_or_default(),
                _ => String::new(),
            };
            if let Err(err) = props.set(name, val) {
                warn!(%arg, %err, "Command-line flag skipped");
            }
        }
        Ok(props)
    }
}
