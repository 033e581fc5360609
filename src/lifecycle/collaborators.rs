//! Injectable collaborators of the lifecycle: the failure sink and the
//! confirmation prompt.

#[cfg(test)]
use mockall::automock;

use async_trait::async_trait;

use super::outcome::Failure;

/// Sink for the single terminal failure of an invocation.
#[cfg_attr(test, automock)]
pub trait FailureReporter: Send + Sync {
    /// Reports a failure. Called at most once per invocation.
    fn report_failure(&self, failure: &Failure);
}

/// Asks an operator whether a change set should be applied.
///
/// `confirm` is awaited, so callers can abandon a pending answer on
/// cancellation.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// Shows `prompt` and returns true if the operator accepts.
    async fn confirm(&self, prompt: &str) -> bool;

    /// Returns true if an operator can be asked at all.
    fn is_interactive(&self) -> bool;
}
