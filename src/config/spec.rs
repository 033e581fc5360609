//! Configuration specification types for Kiln.
//!
//! These types map to a `kiln.yaml` file (or a named `<profile>.kiln.yaml`)
//! and describe which stack an invocation targets and how it is driven.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default polling interval in seconds.
pub const DEFAULT_WAIT_FREQUENCY_SECS: u64 = 10;

/// The root configuration structure for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Configuration {
    /// Stack identity and backend location.
    pub main: MainConfig,
    /// Template parameters passed to the backend.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Capabilities acknowledged on stack mutation (e.g. `CAPABILITY_IAM`).
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Polling behaviour of wait loops.
    #[serde(default)]
    pub polling: PollingConfig,
    /// Confirmation behaviour for updates.
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    /// Directory the configuration was loaded from.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// Stack identity and backend location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MainConfig {
    /// Name of the stack on the backend.
    pub stack_name: String,
    /// Path to the stack template, relative to the configuration file.
    pub template: PathBuf,
    /// Backend region.
    #[serde(default)]
    pub region: Option<String>,
    /// Named credentials profile.
    #[serde(default)]
    pub profile: Option<String>,
    /// Bucket used to upload templates too large to send inline.
    #[serde(default)]
    pub template_bucket: Option<String>,
    /// Provisioning backend the stack lives on.
    #[serde(default)]
    pub backend: BackendKind,
    /// Cloud project owning the deployment (Deployment Manager only).
    #[serde(default)]
    pub project: Option<String>,
}

/// Supported provisioning backends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// AWS CloudFormation stacks.
    #[default]
    Cloudformation,
    /// Google Cloud Deployment Manager deployments.
    DeploymentManager,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cloudformation => write!(f, "cloudformation"),
            Self::DeploymentManager => write!(f, "deployment-manager"),
        }
    }
}

/// Polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollingConfig {
    /// Seconds between polls. Zero polls without delay.
    #[serde(default = "default_wait_frequency")]
    pub wait_frequency_secs: u64,
    /// Maximum number of checks per wait.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Maximum wall-clock seconds per wait.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// How update confirmation is obtained.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ConfirmationConfig {
    /// Apply non-empty change sets without asking.
    #[serde(default)]
    pub auto_accept: bool,
    /// What to do when nobody can be asked.
    #[serde(default)]
    pub non_interactive: NonInteractivePolicy,
}

/// Decision taken when confirmation is needed but the session is not interactive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NonInteractivePolicy {
    /// Leave the change set unexecuted.
    #[default]
    Decline,
    /// Execute the change set.
    Accept,
}

const fn default_wait_frequency() -> u64 {
    DEFAULT_WAIT_FREQUENCY_SECS
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            wait_frequency_secs: DEFAULT_WAIT_FREQUENCY_SECS,
            max_attempts: None,
            timeout_secs: None,
        }
    }
}

impl PollingConfig {
    /// Returns the polling interval.
    #[must_use]
    pub const fn wait_frequency(&self) -> Duration {
        Duration::from_secs(self.wait_frequency_secs)
    }

    /// Returns the wall-clock bound, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Configuration {
    /// Creates a configuration for a stack with default settings.
    #[must_use]
    pub fn new(stack_name: impl Into<String>, template: impl Into<PathBuf>) -> Self {
        Self {
            main: MainConfig {
                stack_name: stack_name.into(),
                template: template.into(),
                region: None,
                profile: None,
                template_bucket: None,
                backend: BackendKind::Cloudformation,
                project: None,
            },
            parameters: BTreeMap::new(),
            capabilities: Vec::new(),
            polling: PollingConfig::default(),
            confirmation: ConfirmationConfig::default(),
            base_dir: None,
        }
    }

    /// Returns the stack name in effect.
    #[must_use]
    pub fn stack_name(&self) -> &str {
        &self.main.stack_name
    }

    /// Returns the polling interval in effect.
    #[must_use]
    pub const fn wait_frequency(&self) -> Duration {
        self.polling.wait_frequency()
    }

    /// Targets a Deployment Manager deployment in `project`.
    #[must_use]
    pub fn with_deployment_manager(mut self, project: impl Into<String>) -> Self {
        self.main.backend = BackendKind::DeploymentManager;
        self.main.project = Some(project.into());
        self
    }

    /// Sets the polling interval in seconds.
    #[must_use]
    pub const fn with_wait_frequency(mut self, secs: u64) -> Self {
        self.polling.wait_frequency_secs = secs;
        self
    }

    /// Sets whether change sets are applied without confirmation.
    #[must_use]
    pub const fn with_auto_accept(mut self, auto_accept: bool) -> Self {
        self.confirmation.auto_accept = auto_accept;
        self
    }

    /// Returns the template path resolved against the configuration directory.
    #[must_use]
    pub fn template_path(&self) -> PathBuf {
        match &self.base_dir {
            Some(dir) if self.main.template.is_relative() => dir.join(&self.main.template),
            _ => self.main.template.clone(),
        }
    }

    /// Records the directory the configuration was loaded from.
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.base_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_path_resolution() {
        let config = Configuration::new("web", "stack.yaml").with_base_dir("/srv/infra");
        assert_eq!(config.template_path(), PathBuf::from("/srv/infra/stack.yaml"));

        let config = Configuration::new("web", "/abs/stack.yaml").with_base_dir("/srv/infra");
        assert_eq!(config.template_path(), PathBuf::from("/abs/stack.yaml"));
    }

    #[test]
    fn test_backend_defaults_to_cloudformation() {
        let config: Configuration =
            serde_yaml::from_str("main:\n  stack_name: web\n  template: t.yaml\n").expect("parse failed");
        assert_eq!(config.main.backend, BackendKind::Cloudformation);

        let config: Configuration = serde_yaml::from_str(
            "main:\n  stack_name: web\n  template: t.yaml\n  backend: deployment-manager\n  project: infra-prod\n",
        )
        .expect("parse failed");
        assert_eq!(config.main.backend, BackendKind::DeploymentManager);
        assert_eq!(config.main.project.as_deref(), Some("infra-prod"));
    }

    #[test]
    fn test_zero_wait_frequency_is_kept() {
        let config = Configuration::new("web", "stack.yaml").with_wait_frequency(0);
        assert_eq!(config.wait_frequency(), Duration::ZERO);
    }
}
