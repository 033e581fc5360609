//! Change-set protocol for one update attempt.
//!
//! validate, plan, wait for the plan, inspect, confirm, execute, wait for
//! the stack. Steps run strictly in order and none is retried. An empty
//! change set is never executed.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{ConfirmationConfig, NonInteractivePolicy, Template};
use crate::gateway::{ChangeSet, ProviderGateway, StackParameters, StackStatus};
use crate::lifecycle::{step, Confirmer, Failure, Phase};

/// How an update attempt ended without failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    /// The change set was empty; nothing was executed.
    NoChanges(ChangeSet),
    /// The change set was not confirmed; nothing was executed.
    Declined(ChangeSet),
    /// The change set was executed and the stack is available.
    Applied(ChangeSet),
}

/// Drives one change set from creation to a settled stack.
pub struct ChangePlanner<'a, G: ProviderGateway + ?Sized> {
    /// Backend.
    gateway: &'a G,
    /// Operator prompt.
    confirmer: &'a dyn Confirmer,
    /// Confirmation policy.
    confirmation: ConfirmationConfig,
    /// Invocation-wide cancellation.
    cancel: &'a CancellationToken,
}

impl<'a, G: ProviderGateway + ?Sized> ChangePlanner<'a, G> {
    /// Creates a planner.
    #[must_use]
    pub const fn new(
        gateway: &'a G,
        confirmer: &'a dyn Confirmer,
        confirmation: ConfirmationConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            gateway,
            confirmer,
            confirmation,
            cancel,
        }
    }

    /// Runs the update protocol against `stack_name`.
    ///
    /// # Errors
    ///
    /// Returns the first failing step. Later steps are not run.
    pub async fn apply(
        &self,
        stack_name: &str,
        template: &Template,
        params: &StackParameters,
    ) -> Result<PlanOutcome, Failure> {
        step(self.cancel, Phase::Validate, self.gateway.validate_template(template)).await?;

        let created = step(
            self.cancel,
            Phase::CreateChangeSet,
            self.gateway.create_change_set(stack_name, template, params),
        )
        .await?;
        debug!("Created change set {} ({})", created.name, created.id);

        step(
            self.cancel,
            Phase::AwaitChangeSet,
            self.gateway.wait_until_change_set_ready(&created.id),
        )
        .await?;

        let change_set = step(
            self.cancel,
            Phase::InspectChangeSet,
            self.gateway.describe_change_set(&created.id),
        )
        .await?;

        if change_set.is_empty() {
            info!("No changes to apply to stack {stack_name}");
            return Ok(PlanOutcome::NoChanges(change_set));
        }

        info!("Change set {}", change_set.summary());
        debug!("{change_set}");
        if !self.confirmed(stack_name, &change_set).await? {
            info!("Change set {} was not applied", change_set.name);
            return Ok(PlanOutcome::Declined(change_set));
        }

        step(
            self.cancel,
            Phase::ExecuteChangeSet,
            self.gateway.execute_change_set(&change_set.id),
        )
        .await?;

        step(
            self.cancel,
            Phase::AwaitStack,
            self.gateway
                .wait_until_stack_stable(stack_name, &[StackStatus::Available]),
        )
        .await?;

        info!("Stack {stack_name} updated");
        Ok(PlanOutcome::Applied(change_set))
    }

    /// Decides whether a non-empty change set may be executed.
    ///
    /// The confirmer is asked at most once, and a pending answer is abandoned
    /// when the invocation is cancelled.
    async fn confirmed(&self, stack_name: &str, change_set: &ChangeSet) -> Result<bool, Failure> {
        if self.confirmation.auto_accept {
            debug!("Auto-accepting change set {}", change_set.name);
            return Ok(true);
        }

        if !self.confirmer.is_interactive() {
            let accept = self.confirmation.non_interactive == NonInteractivePolicy::Accept;
            debug!("Not interactive, change set accepted: {accept}");
            return Ok(accept);
        }

        let prompt = confirmation_prompt(stack_name, change_set);
        step(self.cancel, Phase::Confirm, async {
            Ok(self.confirmer.confirm(&prompt).await)
        })
        .await
    }
}

/// Builds the text shown to the operator before executing a change set.
#[must_use]
pub fn confirmation_prompt(stack_name: &str, change_set: &ChangeSet) -> String {
    format!("{change_set}\nApply these changes to stack '{stack_name}'?")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BackendError, KilnError, WaitError};
    use crate::gateway::{Change, ChangeAction, ChangeSetStatus, MockProviderGateway};
    use crate::lifecycle::MockConfirmer;

    fn change_set(changes: Vec<Change>) -> ChangeSet {
        let mut cs = ChangeSet::pending("cs-id", "kiln-1", "stack-id", "NotEmptyStack");
        cs.status = ChangeSetStatus::Ready;
        cs.changes = changes;
        cs
    }

    fn modify() -> Change {
        Change {
            action: ChangeAction::Modify,
            logical_id: String::from("Queue"),
            physical_id: Some(String::from("queue-1")),
            resource_type: String::from("AWS::SQS::Queue"),
            replacement: Some(String::from("False")),
        }
    }

    fn gateway_until_inspect(changes: Vec<Change>) -> MockProviderGateway {
        let mut gateway = MockProviderGateway::new();
        gateway.expect_validate_template().times(1).returning(|_| Ok(()));
        gateway
            .expect_create_change_set()
            .times(1)
            .returning(|name, _, _| Ok(ChangeSet::pending("cs-id", "kiln-1", "stack-id", name)));
        gateway
            .expect_wait_until_change_set_ready()
            .withf(|id| id == "cs-id")
            .times(1)
            .returning(|_| Ok(()));
        gateway
            .expect_describe_change_set()
            .times(1)
            .returning(move |_| Ok(change_set(changes.clone())));
        gateway
    }

    fn auto_accept() -> ConfirmationConfig {
        ConfirmationConfig {
            auto_accept: true,
            ..ConfirmationConfig::default()
        }
    }

    #[tokio::test]
    async fn test_empty_change_set_is_not_executed() {
        let mut gateway = gateway_until_inspect(Vec::new());
        gateway.expect_execute_change_set().never();
        gateway.expect_wait_until_stack_stable().never();
        let mut confirmer = MockConfirmer::new();
        confirmer.expect_confirm().never();
        let cancel = CancellationToken::new();

        let planner = ChangePlanner::new(&gateway, &confirmer, auto_accept(), &cancel);
        let outcome = planner
            .apply("EmptyStack", &Template::inline("{}"), &StackParameters::default())
            .await
            .expect("plan failed");

        assert!(matches!(outcome, PlanOutcome::NoChanges(_)));
    }

    #[tokio::test]
    async fn test_auto_accept_executes_once() {
        let mut gateway = gateway_until_inspect(vec![modify()]);
        gateway
            .expect_execute_change_set()
            .withf(|id| id == "cs-id")
            .times(1)
            .returning(|_| Ok(()));
        gateway
            .expect_wait_until_stack_stable()
            .withf(|name, targets| name == "NotEmptyStack" && targets == [StackStatus::Available].as_slice())
            .times(1)
            .returning(|_, _| Ok(()));
        let mut confirmer = MockConfirmer::new();
        confirmer.expect_confirm().never();
        let cancel = CancellationToken::new();

        let planner = ChangePlanner::new(&gateway, &confirmer, auto_accept(), &cancel);
        let outcome = planner
            .apply("NotEmptyStack", &Template::inline("{}"), &StackParameters::default())
            .await
            .expect("plan failed");

        assert!(matches!(outcome, PlanOutcome::Applied(cs) if cs.change_count() == 1));
    }

    #[tokio::test]
    async fn test_interactive_decline_stops() {
        let mut gateway = gateway_until_inspect(vec![modify()]);
        gateway.expect_execute_change_set().never();
        let mut confirmer = MockConfirmer::new();
        confirmer.expect_is_interactive().return_const(true);
        confirmer
            .expect_confirm()
            .withf(|prompt| prompt.contains("Apply these changes to stack 'NotEmptyStack'?"))
            .times(1)
            .return_const(false);
        let cancel = CancellationToken::new();

        let planner =
            ChangePlanner::new(&gateway, &confirmer, ConfirmationConfig::default(), &cancel);
        let outcome = planner
            .apply("NotEmptyStack", &Template::inline("{}"), &StackParameters::default())
            .await
            .expect("plan failed");

        assert!(matches!(outcome, PlanOutcome::Declined(_)));
    }

    #[tokio::test]
    async fn test_non_interactive_policy_decides() {
        let mut gateway = gateway_until_inspect(vec![modify()]);
        gateway.expect_execute_change_set().times(1).returning(|_| Ok(()));
        gateway
            .expect_wait_until_stack_stable()
            .times(1)
            .returning(|_, _| Ok(()));
        let mut confirmer = MockConfirmer::new();
        confirmer.expect_is_interactive().return_const(false);
        confirmer.expect_confirm().never();
        let cancel = CancellationToken::new();

        let confirmation = ConfirmationConfig {
            auto_accept: false,
            non_interactive: NonInteractivePolicy::Accept,
        };
        let planner = ChangePlanner::new(&gateway, &confirmer, confirmation, &cancel);
        let outcome = planner
            .apply("NotEmptyStack", &Template::inline("{}"), &StackParameters::default())
            .await
            .expect("plan failed");

        assert!(matches!(outcome, PlanOutcome::Applied(_)));
    }

    #[tokio::test]
    async fn test_validation_error_stops_before_change_set() {
        let mut gateway = MockProviderGateway::new();
        gateway
            .expect_validate_template()
            .times(1)
            .returning(|_| Err(BackendError::validation("Template format error: unsupported structure.").into()));
        gateway.expect_create_change_set().never();
        let confirmer = MockConfirmer::new();
        let cancel = CancellationToken::new();

        let planner = ChangePlanner::new(&gateway, &confirmer, auto_accept(), &cancel);
        let failure = planner
            .apply("NotEmptyStack", &Template::inline("{}"), &StackParameters::default())
            .await
            .unwrap_err();

        assert_eq!(failure.phase, Phase::Validate);
        assert_eq!(failure.message(), "Template format error: unsupported structure.");
    }

    #[tokio::test]
    async fn test_execute_error_skips_wait() {
        let mut gateway = gateway_until_inspect(vec![modify()]);
        gateway
            .expect_execute_change_set()
            .times(1)
            .returning(|_| Err(BackendError::api("ExecuteChangeSet", "change set is not executable").into()));
        gateway.expect_wait_until_stack_stable().never();
        let confirmer = MockConfirmer::new();
        let cancel = CancellationToken::new();

        let planner = ChangePlanner::new(&gateway, &confirmer, auto_accept(), &cancel);
        let failure = planner
            .apply("NotEmptyStack", &Template::inline("{}"), &StackParameters::default())
            .await
            .unwrap_err();

        assert_eq!(failure.phase, Phase::ExecuteChangeSet);
        assert_eq!(failure.message(), "change set is not executable");
    }

    /// Backend steps of the update protocol, in order.
    const STEPS: [Phase; 6] = [
        Phase::Validate,
        Phase::CreateChangeSet,
        Phase::AwaitChangeSet,
        Phase::InspectChangeSet,
        Phase::ExecuteChangeSet,
        Phase::AwaitStack,
    ];

    fn step_error(phase: Phase) -> KilnError {
        match phase {
            Phase::Validate => BackendError::validation("Template format error: unsupported structure.").into(),
            Phase::AwaitChangeSet => WaitError::FailureState {
                resource: String::from("change set cs-id"),
                status: String::from("FAILED"),
                reason: String::from("Parameter KeyName does not exist"),
            }
            .into(),
            Phase::AwaitStack => WaitError::FailureState {
                resource: String::from("stack NotEmptyStack"),
                status: String::from("UPDATE_ROLLBACK_COMPLETE"),
                reason: String::from("Resource update cancelled"),
            }
            .into(),
            other => BackendError::api("Step", format!("{other} rejected by backend")).into(),
        }
    }

    /// A gateway whose `failing` step errors; earlier steps succeed once and
    /// later steps are never reached.
    fn gateway_failing_at(failing: Phase) -> MockProviderGateway {
        let position = STEPS.iter().position(|p| *p == failing).expect("backend step");
        let times = |i: usize| usize::from(i <= position);
        let fails = |i: usize| i == position;
        let mut gateway = MockProviderGateway::new();

        let fail = fails(0);
        gateway
            .expect_validate_template()
            .times(times(0))
            .returning(move |_| if fail { Err(step_error(STEPS[0])) } else { Ok(()) });
        let fail = fails(1);
        gateway
            .expect_create_change_set()
            .times(times(1))
            .returning(move |name, _, _| {
                if fail {
                    Err(step_error(STEPS[1]))
                } else {
                    Ok(ChangeSet::pending("cs-id", "kiln-1", "stack-id", name))
                }
            });
        let fail = fails(2);
        gateway
            .expect_wait_until_change_set_ready()
            .times(times(2))
            .returning(move |_| if fail { Err(step_error(STEPS[2])) } else { Ok(()) });
        let fail = fails(3);
        gateway
            .expect_describe_change_set()
            .times(times(3))
            .returning(move |_| {
                if fail {
                    Err(step_error(STEPS[3]))
                } else {
                    Ok(change_set(vec![modify()]))
                }
            });
        let fail = fails(4);
        gateway
            .expect_execute_change_set()
            .times(times(4))
            .returning(move |_| if fail { Err(step_error(STEPS[4])) } else { Ok(()) });
        let fail = fails(5);
        gateway
            .expect_wait_until_stack_stable()
            .times(times(5))
            .returning(move |_, _| if fail { Err(step_error(STEPS[5])) } else { Ok(()) });

        gateway
    }

    #[tokio::test]
    async fn test_each_step_error_stops_the_update() {
        for phase in STEPS {
            let gateway = gateway_failing_at(phase);
            let confirmer = MockConfirmer::new();
            let cancel = CancellationToken::new();

            let planner = ChangePlanner::new(&gateway, &confirmer, auto_accept(), &cancel);
            let failure = planner
                .apply("NotEmptyStack", &Template::inline("{}"), &StackParameters::default())
                .await
                .unwrap_err();

            assert_eq!(failure.phase, phase);
            assert_eq!(failure.message(), step_error(phase).to_string(), "{phase}");
        }
    }

    #[tokio::test]
    async fn test_rolled_back_update_reports_backend_reason() {
        let gateway = gateway_failing_at(Phase::AwaitStack);
        let confirmer = MockConfirmer::new();
        let cancel = CancellationToken::new();

        let planner = ChangePlanner::new(&gateway, &confirmer, auto_accept(), &cancel);
        let failure = planner
            .apply("NotEmptyStack", &Template::inline("{}"), &StackParameters::default())
            .await
            .unwrap_err();

        assert_eq!(
            failure.message(),
            "stack NotEmptyStack reached failure state UPDATE_ROLLBACK_COMPLETE: Resource update cancelled"
        );
    }

    /// Operator who never answers; cancels the invocation while asked.
    struct UnansweredPrompt {
        cancel: CancellationToken,
    }

    #[async_trait::async_trait]
    impl Confirmer for UnansweredPrompt {
        async fn confirm(&self, _prompt: &str) -> bool {
            self.cancel.cancel();
            std::future::pending().await
        }

        fn is_interactive(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_cancel_abandons_pending_confirmation() {
        let mut gateway = gateway_until_inspect(vec![modify()]);
        gateway.expect_execute_change_set().never();
        gateway.expect_wait_until_stack_stable().never();
        let cancel = CancellationToken::new();
        let confirmer = UnansweredPrompt {
            cancel: cancel.clone(),
        };

        let planner =
            ChangePlanner::new(&gateway, &confirmer, ConfirmationConfig::default(), &cancel);
        let failure = planner
            .apply("NotEmptyStack", &Template::inline("{}"), &StackParameters::default())
            .await
            .unwrap_err();

        assert_eq!(failure.phase, Phase::Confirm);
        assert!(failure.error.is_cancelled());
    }
}
