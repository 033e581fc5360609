//! Provisioning backend abstraction.
//!
//! The orchestrator drives backends only through [`ProviderGateway`]:
//! template validation, change-set creation, inspection and execution,
//! stack creation, deletion and status, plus two blocking wait primitives.

mod cloudformation;
mod deployment_manager;
mod provider;
mod types;
pub mod wait;

pub use cloudformation::{CloudFormationGateway, TemplatePlacement, MAX_INLINE_TEMPLATE_BYTES};
pub use deployment_manager::{DeploymentManagerGateway, ACCESS_TOKEN_VAR, DEPLOYMENT_MANAGER_API_URL};
#[cfg(test)]
pub use provider::MockProviderGateway;
pub use provider::ProviderGateway;
pub use types::{
    Change, ChangeAction, ChangeSet, ChangeSetStatus, Stack, StackOutput, StackParameters,
    StackStatus,
};

use tracing::debug;

use crate::config::{BackendKind, Configuration};
use crate::error::Result;
use crate::poller::Poller;

/// Builds the gateway for the backend named in `main.backend`.
///
/// # Errors
///
/// Returns an error if the backend client cannot be set up.
pub async fn connect(config: &Configuration, poller: Poller) -> Result<Box<dyn ProviderGateway>> {
    debug!("Connecting to {} backend", config.main.backend);
    match config.main.backend {
        BackendKind::Cloudformation => Ok(Box::new(CloudFormationGateway::from_config(config, poller).await)),
        BackendKind::DeploymentManager => Ok(Box::new(DeploymentManagerGateway::from_config(config, poller)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_deployment_manager_needs_a_project() {
        let mut config = Configuration::new("web", "config.yaml");
        config.main.backend = BackendKind::DeploymentManager;

        let err = connect(&config, Poller::new(Duration::ZERO)).await.err().expect("expected error");
        assert_eq!(err.to_string(), "cannot connect to deployment-manager: main.project is not set");
    }
}
