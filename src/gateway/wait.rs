//! Wait primitives built on the [`Poller`].
//!
//! Backends implement `wait_until_*` by delegating here, so every backend
//! shares the same "not yet / done / failed" interpretation of statuses.

use tracing::debug;

use crate::error::{BackendError, Result, WaitError};
use crate::poller::Poller;

use super::provider::ProviderGateway;
use super::types::{ChangeSetStatus, StackStatus};

/// Polls `describe_stack` until the stack reaches one of `targets`.
///
/// A missing stack counts as [`StackStatus::Absent`]. A failed terminal
/// status that is not a target ends the wait with
/// [`WaitError::FailureState`].
///
/// # Errors
///
/// Returns the backend error, a failure-state error, or the poller's
/// timeout/cancellation error.
pub async fn stack_stable<G>(
    gateway: &G,
    poller: &Poller,
    stack_name: &str,
    targets: &[StackStatus],
) -> Result<()>
where
    G: ProviderGateway + ?Sized,
{
    let waiting_for = format!("stack {stack_name} to become {}", describe_targets(targets));

    poller
        .wait_until(&waiting_for, || async move {
            let stack = gateway.describe_stack(stack_name).await?;
            let status = stack.as_ref().map_or(StackStatus::Absent, |s| s.status);
            debug!("Stack {stack_name} is {status}");

            if targets.contains(&status) {
                return Ok(true);
            }

            match stack {
                Some(stack) if status.is_failed() => Err(WaitError::FailureState {
                    resource: format!("stack {stack_name}"),
                    status: stack.raw_status,
                    reason: stack.status_reason.unwrap_or_default(),
                }
                .into()),
                None => Err(BackendError::StackNotFound {
                    name: stack_name.to_string(),
                }
                .into()),
                Some(_) => Ok(false),
            }
        })
        .await
}

/// Polls `describe_change_set` until its changes are computed.
///
/// # Errors
///
/// Returns the backend error, a failure-state error when the backend could
/// not compute the change set, or the poller's timeout/cancellation error.
pub async fn change_set_ready<G>(gateway: &G, poller: &Poller, change_set_id: &str) -> Result<()>
where
    G: ProviderGateway + ?Sized,
{
    let waiting_for = format!("change set {change_set_id} to be ready");

    poller
        .wait_until(&waiting_for, || async move {
            let change_set = gateway.describe_change_set(change_set_id).await?;
            match change_set.status {
                ChangeSetStatus::Ready => Ok(true),
                ChangeSetStatus::Pending => Ok(false),
                ChangeSetStatus::Failed(reason) => Err(WaitError::FailureState {
                    resource: format!("change set {}", change_set.name),
                    status: String::from("FAILED"),
                    reason,
                }
                .into()),
            }
        })
        .await
}

fn describe_targets(targets: &[StackStatus]) -> String {
    targets
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" or ")
}
