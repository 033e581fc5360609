//! Configuration parser for loading configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, KilnError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::spec::Configuration;

/// Configuration parser for loading stack configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// The returned configuration remembers the file's directory so the
    /// template path can be resolved relative to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Configuration> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(KilnError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            KilnError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        let config = self.parse_yaml(&content, Some(path))?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        Ok(config.with_base_dir(dir))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<Configuration> {
        debug!("Parsing YAML configuration");

        let mut config: Configuration = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            KilnError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        if let Some(base) = &self.base_path {
            config.base_dir = Some(base.clone());
        }

        debug!("Parsed configuration for stack: {}", config.main.stack_name);
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an override
    /// is malformed.
    pub fn load_with_env(
        &self,
        path: impl AsRef<Path>,
        env: &EnvOverrides,
        scope: OverrideScope,
    ) -> Result<Configuration> {
        let mut config = self.load_file(path)?;
        env.apply(&mut config, scope)?;
        Ok(config)
    }
}

/// Overrides the stack name.
pub const ENV_STACK_NAME: &str = "KILN_STACK_NAME";
/// Overrides the backend region.
pub const ENV_REGION: &str = "KILN_REGION";
/// Overrides the polling interval, in seconds.
pub const ENV_WAIT_FREQUENCY: &str = "KILN_WAIT_FREQUENCY";

const OVERRIDE_VARS: [&str; 3] = [ENV_STACK_NAME, ENV_REGION, ENV_WAIT_FREQUENCY];

/// Which configuration the overrides are applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideScope {
    /// The default configuration; every override applies.
    Default,
    /// A profile named on the command line; its stack name is never replaced.
    Profile,
}

/// Override values read from the process environment and `.env` files.
///
/// Values are collected into this map; loading a `.env` file never changes
/// the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    vars: HashMap<String, String>,
}

impl EnvOverrides {
    /// Collects the override variables set in the process environment.
    #[must_use]
    pub fn from_process() -> Self {
        let vars = OVERRIDE_VARS
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| ((*key).to_string(), value)))
            .collect();
        Self { vars }
    }

    /// Sets one override.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Adds overrides from `<dir>/.env`, if present.
    ///
    /// Values already set take precedence over the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be parsed.
    pub fn with_dotenv(mut self, dir: &Path) -> Result<Self> {
        let env_path = dir.join(".env");
        if !env_path.exists() {
            debug!(".env file not found at: {}", env_path.display());
            return Ok(self);
        }

        info!("Loading environment from: {}", env_path.display());
        let dotenv_error = |e: dotenvy::Error| {
            KilnError::Config(ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })
        };

        for item in dotenvy::from_path_iter(&env_path).map_err(dotenv_error)? {
            let (key, value) = item.map_err(dotenv_error)?;
            if OVERRIDE_VARS.contains(&key.as_str()) {
                self.vars.entry(key).or_insert(value);
            }
        }

        Ok(self)
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Applies the overrides to `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if an override is malformed.
    pub fn apply(&self, config: &mut Configuration, scope: OverrideScope) -> Result<()> {
        if let Some(name) = self.get(ENV_STACK_NAME) {
            match scope {
                OverrideScope::Default => {
                    debug!("Overriding main.stack_name from environment");
                    config.main.stack_name = name.to_string();
                }
                OverrideScope::Profile if name != config.main.stack_name => {
                    warn!(
                        "Ignoring {ENV_STACK_NAME}={name}: the named profile targets stack {}",
                        config.main.stack_name
                    );
                }
                OverrideScope::Profile => {}
            }
        }

        if let Some(region) = self.get(ENV_REGION) {
            debug!("Overriding main.region from environment");
            config.main.region = Some(region.to_string());
        }

        if let Some(freq) = self.get(ENV_WAIT_FREQUENCY) {
            debug!("Overriding polling.wait_frequency_secs from environment");
            config.polling.wait_frequency_secs = freq.trim().parse().map_err(|_| {
                KilnError::Config(ConfigError::validation(
                    format!("{ENV_WAIT_FREQUENCY} must be a number of seconds, got '{freq}'"),
                    "polling.wait_frequency_secs",
                ))
            })?;
        }

        Ok(())
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["kiln.yaml", "kiln.yml"];

/// Suffixes of named profile files.
pub const PROFILE_SUFFIXES: &[&str] = &[".kiln.yaml", ".kiln.yml"];

/// Finds the configuration file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(KilnError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}
