//! Configuration validation.
//!
//! Catches configuration mistakes locally, before the backend is contacted.

use crate::error::{ConfigError, KilnError, Result};
use tracing::debug;

use super::spec::{BackendKind, Configuration, MainConfig, PollingConfig};

/// Maximum stack name length accepted by the backend.
const MAX_STACK_NAME_LEN: usize = 128;

/// Maximum deployment name length accepted by Deployment Manager.
const MAX_DEPLOYMENT_NAME_LEN: usize = 63;

/// Capabilities the backend understands.
const KNOWN_CAPABILITIES: &[&str] = &[
    "CAPABILITY_IAM",
    "CAPABILITY_NAMED_IAM",
    "CAPABILITY_AUTO_EXPAND",
];

/// Validator for stack configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found.
    pub fn validate(&self, config: &Configuration) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_main(&config.main, &mut result);
        Self::validate_parameters(config, &mut result);
        Self::validate_polling(&config.polling, &mut result);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(KilnError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    fn validate_main(main: &MainConfig, result: &mut ValidationResult) {
        if main.stack_name.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("main.stack_name"),
                message: String::from("Stack name cannot be empty"),
            });
        } else if !is_valid_stack_name(&main.stack_name) {
            result.errors.push(ValidationError {
                field: String::from("main.stack_name"),
                message: format!(
                    "Stack name '{}' is invalid. Must start with a letter and contain only letters, digits and hyphens.",
                    main.stack_name
                ),
            });
        }

        if main.template.as_os_str().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("main.template"),
                message: String::from("Template path cannot be empty"),
            });
        }

        if main.backend == BackendKind::DeploymentManager {
            Self::validate_deployment_manager(main, result);
        }

        if main.template_bucket.as_ref().is_some_and(String::is_empty) {
            result.errors.push(ValidationError {
                field: String::from("main.template_bucket"),
                message: String::from("Template bucket cannot be empty when set"),
            });
        }
    }

    fn validate_deployment_manager(main: &MainConfig, result: &mut ValidationResult) {
        if main.project.as_ref().is_none_or(String::is_empty) {
            result.errors.push(ValidationError {
                field: String::from("main.project"),
                message: String::from("A project is required for the deployment-manager backend"),
            });
        }

        if !main.stack_name.is_empty() && !is_valid_deployment_name(&main.stack_name) {
            result.errors.push(ValidationError {
                field: String::from("main.stack_name"),
                message: format!(
                    "Deployment name '{}' is invalid. Must start with a lowercase letter, contain only lowercase letters, digits and hyphens, and not end with a hyphen.",
                    main.stack_name
                ),
            });
        }

        if main.template_bucket.is_some() {
            result
                .warnings
                .push(String::from("main.template_bucket is ignored by the deployment-manager backend"));
        }
    }

    fn validate_parameters(config: &Configuration, result: &mut ValidationResult) {
        for key in config.parameters.keys() {
            if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
                result.errors.push(ValidationError {
                    field: format!("parameters.{key}"),
                    message: format!("Parameter key '{key}' must be alphanumeric"),
                });
            }
        }

        for capability in &config.capabilities {
            if !KNOWN_CAPABILITIES.contains(&capability.as_str()) {
                result
                    .warnings
                    .push(format!("Unknown capability '{capability}' will be passed as-is"));
            }
        }
    }

    fn validate_polling(polling: &PollingConfig, result: &mut ValidationResult) {
        if polling.max_attempts == Some(0) {
            result.errors.push(ValidationError {
                field: String::from("polling.max_attempts"),
                message: String::from("max_attempts must be at least 1"),
            });
        }

        if polling.timeout_secs == Some(0) {
            result.errors.push(ValidationError {
                field: String::from("polling.timeout_secs"),
                message: String::from("timeout_secs must be at least 1"),
            });
        }

        if polling.wait_frequency_secs == 0 {
            result
                .warnings
                .push(String::from("wait_frequency_secs is 0: backend is polled without delay"));
        }
    }
}

/// Checks a deployment name against Deployment Manager's naming rules.
fn is_valid_deployment_name(name: &str) -> bool {
    name.len() <= MAX_DEPLOYMENT_NAME_LEN
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Checks a stack name against the backend's naming rules.
fn is_valid_stack_name(name: &str) -> bool {
    if name.len() > MAX_STACK_NAME_LEN {
        return false;
    }

    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}
