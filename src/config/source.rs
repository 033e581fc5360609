//! Configuration sources.
//!
//! A source knows where the default configuration lives and how to find a
//! named profile. Named profiles are `<name>.kiln.yaml` files searched for in
//! an ordered list of directories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ConfigError, KilnError, Result};

use super::parser::{
    find_config_file, ConfigParser, EnvOverrides, OverrideScope, PROFILE_SUFFIXES,
};
use super::spec::Configuration;
use super::validator::ConfigValidator;

/// Loads default and named configurations.
pub trait ConfigSource: Send + Sync {
    /// Loads the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no default configuration is available or it is invalid.
    fn load_default(&self) -> Result<Configuration>;

    /// Loads a named profile, `None` if no such profile exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile exists but cannot be loaded.
    fn load_named(&self, name: &str) -> Result<Option<Configuration>>;
}

/// File-backed configuration source.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    /// Explicit default configuration file.
    default_path: Option<PathBuf>,
    /// Directory the default file is searched from.
    start_dir: PathBuf,
    /// Extra directories searched for named profiles.
    profile_dirs: Vec<PathBuf>,
    /// Environment overrides, before any `.env` file is read.
    env: EnvOverrides,
}

impl FileConfigSource {
    /// Creates a source that discovers `kiln.yaml` upward from `start_dir`.
    #[must_use]
    pub fn new(start_dir: impl Into<PathBuf>) -> Self {
        Self {
            default_path: None,
            start_dir: start_dir.into(),
            profile_dirs: Vec::new(),
            env: EnvOverrides::from_process(),
        }
    }

    /// Replaces the overrides taken from the process environment.
    #[must_use]
    pub fn with_env(mut self, env: EnvOverrides) -> Self {
        self.env = env;
        self
    }

    /// Uses an explicit default configuration file.
    #[must_use]
    pub fn with_default_path(mut self, path: Option<PathBuf>) -> Self {
        self.default_path = path;
        self
    }

    /// Adds a directory searched for named profiles.
    #[must_use]
    pub fn with_profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.profile_dirs.push(dir.into());
        self
    }

    /// Adds the per-user profile directory (`<config dir>/kiln`), if known.
    #[must_use]
    pub fn with_user_profile_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.with_profile_dir(dir.join("kiln")),
            None => self,
        }
    }

    fn default_file(&self) -> Result<PathBuf> {
        self.default_path
            .as_ref()
            .map_or_else(|| find_config_file(&self.start_dir), |path| Ok(path.clone()))
    }

    /// Directories searched for named profiles, in order.
    fn search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();

        if let Ok(default) = self.default_file()
            && let Some(parent) = default.parent()
        {
            dirs.push(parent.to_path_buf());
        }
        if !dirs.contains(&self.start_dir) {
            dirs.push(self.start_dir.clone());
        }
        for dir in &self.profile_dirs {
            if !dirs.contains(dir) {
                dirs.push(dir.clone());
            }
        }

        dirs
    }

    fn load_validated(&self, path: &Path, scope: OverrideScope) -> Result<Configuration> {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let env = self.env.clone().with_dotenv(base)?;

        let config = ConfigParser::new()
            .with_base_path(base)
            .load_with_env(path, &env, scope)?;
        let result = ConfigValidator::new().validate(&config)?;
        for warning in &result.warnings {
            warn!("{}: {warning}", path.display());
        }
        Ok(config)
    }
}

impl ConfigSource for FileConfigSource {
    fn load_default(&self) -> Result<Configuration> {
        let path = self.default_file()?;
        self.load_validated(&path, OverrideScope::Default)
    }

    fn load_named(&self, name: &str) -> Result<Option<Configuration>> {
        if !is_valid_profile_name(name) {
            debug!("Rejecting profile name: {name}");
            return Ok(None);
        }

        for dir in self.search_dirs() {
            for suffix in PROFILE_SUFFIXES {
                let candidate = dir.join(format!("{name}{suffix}"));
                if candidate.is_file() {
                    debug!("Found profile {name} at {}", candidate.display());
                    return self
                        .load_validated(&candidate, OverrideScope::Profile)
                        .map(Some);
                }
            }
        }

        debug!("Profile {name} not found");
        Ok(None)
    }
}

/// Profile names are plain file stems, never paths.
fn is_valid_profile_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// In-memory configuration source.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigSource {
    default: Option<Configuration>,
    named: HashMap<String, Configuration>,
}

impl MemoryConfigSource {
    /// Creates a source with the given default configuration.
    #[must_use]
    pub fn new(default: Configuration) -> Self {
        Self {
            default: Some(default),
            named: HashMap::new(),
        }
    }

    /// Registers a named profile.
    #[must_use]
    pub fn with_profile(mut self, name: impl Into<String>, config: Configuration) -> Self {
        self.named.insert(name.into(), config);
        self
    }
}

impl ConfigSource for MemoryConfigSource {
    fn load_default(&self) -> Result<Configuration> {
        self.default.clone().ok_or_else(|| {
            KilnError::Config(ConfigError::FileNotFound {
                path: PathBuf::from(super::parser::DEFAULT_CONFIG_FILES[0]),
            })
        })
    }

    fn load_named(&self, name: &str) -> Result<Option<Configuration>> {
        Ok(self.named.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &Path, file: &str, stack: &str) {
        let yaml = format!("main:\n  stack_name: {stack}\n  template: t.yaml\n");
        std::fs::write(dir.join(file), yaml).expect("write failed");
    }

    #[test]
    fn test_load_default_and_named() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        write_config(temp.path(), "kiln.yaml", "DefaultStack");
        write_config(temp.path(), "teststack.kiln.yaml", "MyStack");

        let source = FileConfigSource::new(temp.path()).with_env(EnvOverrides::default());

        let default = source.load_default().expect("default failed");
        assert_eq!(default.stack_name(), "DefaultStack");

        let named = source
            .load_named("teststack")
            .expect("named failed")
            .expect("profile should exist");
        assert_eq!(named.stack_name(), "MyStack");

        assert!(source.load_named("notfound").expect("lookup failed").is_none());
    }

    #[test]
    fn test_named_profile_ignores_stack_name_override() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        write_config(temp.path(), "kiln.yaml", "DefaultStack");
        write_config(temp.path(), "teststack.kiln.yaml", "MyStack");
        std::fs::write(
            temp.path().join(".env"),
            "KILN_STACK_NAME=ProdStack\nKILN_WAIT_FREQUENCY=0\n",
        )
        .expect("write failed");

        let source = FileConfigSource::new(temp.path()).with_env(EnvOverrides::default());

        let named = source
            .load_named("teststack")
            .expect("named failed")
            .expect("profile should exist");
        assert_eq!(named.stack_name(), "MyStack");
        assert_eq!(named.polling.wait_frequency_secs, 0);

        let default = source.load_default().expect("default failed");
        assert_eq!(default.stack_name(), "ProdStack");
        assert!(!std::env::var("KILN_STACK_NAME").is_ok_and(|v| v == "ProdStack"));
    }

    #[test]
    fn test_profile_dir_is_searched() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let profiles = TempDir::new().expect("Failed to create temp dir");
        write_config(profiles.path(), "staging.kiln.yml", "StagingStack");

        let source = FileConfigSource::new(temp.path())
            .with_env(EnvOverrides::default())
            .with_profile_dir(profiles.path());
        let named = source
            .load_named("staging")
            .expect("named failed")
            .expect("profile should exist");
        assert_eq!(named.stack_name(), "StagingStack");
    }

    #[test]
    fn test_path_like_profile_names_are_not_found() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let source = FileConfigSource::new(temp.path()).with_env(EnvOverrides::default());
        assert!(source.load_named("../etc/passwd").expect("lookup failed").is_none());
        assert!(source.load_named("").expect("lookup failed").is_none());
    }

    #[test]
    fn test_invalid_profile_is_an_error() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        write_config(temp.path(), "bad.kiln.yaml", "9-lives");

        let source = FileConfigSource::new(temp.path()).with_env(EnvOverrides::default());
        assert!(source.load_named("bad").is_err());
    }
}
