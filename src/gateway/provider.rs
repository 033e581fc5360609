//! Provider gateway trait definition.
//!
//! This is the only surface the orchestrator uses to talk to a provisioning
//! backend. Implementations perform no retries: every error is returned as
//! the backend produced it.

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::config::Template;
use crate::error::Result;

use super::types::{ChangeSet, Stack, StackParameters, StackStatus};

/// Trait for provisioning backends.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Validates a template without mutating anything.
    async fn validate_template(&self, template: &Template) -> Result<()>;

    /// Creates a change set against an existing stack.
    async fn create_change_set(
        &self,
        stack_name: &str,
        template: &Template,
        params: &StackParameters,
    ) -> Result<ChangeSet>;

    /// Describes a change set, including its computed changes.
    async fn describe_change_set(&self, change_set_id: &str) -> Result<ChangeSet>;

    /// Executes a change set.
    async fn execute_change_set(&self, change_set_id: &str) -> Result<()>;

    /// Describes a stack.
    ///
    /// Returns `None` if the stack does not exist.
    async fn describe_stack(&self, stack_name: &str) -> Result<Option<Stack>>;

    /// Starts creating a stack and returns its identifier.
    async fn create_stack(
        &self,
        stack_name: &str,
        template: &Template,
        params: &StackParameters,
    ) -> Result<String>;

    /// Starts deleting a stack.
    async fn delete_stack(&self, stack_name: &str) -> Result<()>;

    /// Blocks until the stack reaches one of `targets`.
    ///
    /// Fails as soon as the backend reports a failed terminal state.
    async fn wait_until_stack_stable(&self, stack_name: &str, targets: &[StackStatus])
    -> Result<()>;

    /// Blocks until the change set's changes are computed.
    async fn wait_until_change_set_ready(&self, change_set_id: &str) -> Result<()>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}
