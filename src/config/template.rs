//! Stack template loading.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ConfigError, KilnError, Result};

use super::spec::Configuration;

/// A stack template body together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    body: String,
    path: Option<PathBuf>,
}

impl Template {
    /// Creates a template from an in-memory body.
    #[must_use]
    pub fn inline(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            path: None,
        }
    }

    /// Reads a template from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading template: {}", path.display());

        let body = std::fs::read_to_string(path).map_err(|e| {
            KilnError::Config(ConfigError::TemplateUnreadable {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        })?;

        Ok(Self {
            body,
            path: Some(path.to_path_buf()),
        })
    }

    /// Returns the template body.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Returns the file the template was read from, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the body size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.body.len()
    }
}

/// Source of the template for a resolved configuration.
pub trait TemplateSource: Send + Sync {
    /// Loads the template the configuration points at.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be loaded.
    fn load(&self, config: &Configuration) -> Result<Template>;
}

/// Reads templates from disk, relative to the configuration file.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTemplateSource;

impl TemplateSource for FileTemplateSource {
    fn load(&self, config: &Configuration) -> Result<Template> {
        Template::from_file(config.template_path())
    }
}

impl TemplateSource for Template {
    fn load(&self, _config: &Configuration) -> Result<Template> {
        Ok(self.clone())
    }
}
