//! Configuration module for Kiln.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `kiln.yaml` and named profiles
//! - Validation of configuration values
//! - Template loading and hashing for change-set names

mod hash;
mod parser;
mod source;
mod spec;
mod template;
mod validator;

pub use hash::{TemplateHasher, CHANGE_SET_PREFIX};
pub use parser::{
    find_config_file, ConfigParser, EnvOverrides, OverrideScope, DEFAULT_CONFIG_FILES,
    PROFILE_SUFFIXES,
};
pub use source::{ConfigSource, FileConfigSource, MemoryConfigSource};
pub use spec::{
    BackendKind, ConfirmationConfig, Configuration, MainConfig, NonInteractivePolicy, PollingConfig,
    DEFAULT_WAIT_FREQUENCY_SECS,
};
pub use template::{FileTemplateSource, Template, TemplateSource};
pub use validator::{ConfigValidator, ValidationResult};
