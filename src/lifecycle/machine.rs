//! Create, update, delete and status pipelines.
//!
//! Every pipeline starts with profile resolution, so a bad profile fails
//! before a gateway even exists. Pipelines return their result to a single
//! finishing step, which is the only place a failure is reported.

use std::fmt;
use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{ConfigSource, Configuration, NonInteractivePolicy, Template, TemplateSource};
use crate::error::BackendError;
use crate::gateway::{ProviderGateway, Stack, StackParameters, StackStatus};
use crate::planner::{ChangePlanner, PlanOutcome};
use crate::resolver::{ResolvedStack, StackResolver};

use super::collaborators::{Confirmer, FailureReporter};
use super::outcome::{step, Completion, Failure, Outcome, Phase};

/// A lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Create a new stack.
    Create,
    /// Update an existing stack through a change set.
    Update,
    /// Delete an existing stack.
    Delete,
    /// Describe an existing stack.
    Status,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Status => "status",
        };
        write!(f, "{s}")
    }
}

/// Stack lifecycle state machine.
///
/// States are implicit in the position within each pipeline.
pub struct Lifecycle<'a> {
    /// Default and named configurations.
    configs: &'a dyn ConfigSource,
    /// Template loader.
    templates: &'a dyn TemplateSource,
    /// Operator prompt for updates.
    confirmer: &'a dyn Confirmer,
    /// Sink for the terminal failure.
    reporter: &'a dyn FailureReporter,
    /// Invocation-wide cancellation.
    cancel: CancellationToken,
    /// Forces auto-accept regardless of configuration.
    auto_accept: bool,
    /// Overrides the configured non-interactive policy.
    non_interactive: Option<NonInteractivePolicy>,
}

impl<'a> Lifecycle<'a> {
    /// Creates a lifecycle over its collaborators.
    #[must_use]
    pub fn new(
        configs: &'a dyn ConfigSource,
        templates: &'a dyn TemplateSource,
        confirmer: &'a dyn Confirmer,
        reporter: &'a dyn FailureReporter,
    ) -> Self {
        Self {
            configs,
            templates,
            confirmer,
            reporter,
            cancel: CancellationToken::new(),
            auto_accept: false,
            non_interactive: None,
        }
    }

    /// Stops in-flight backend calls and waits when the token fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Applies non-empty change sets without asking.
    #[must_use]
    pub const fn with_auto_accept(mut self, auto_accept: bool) -> Self {
        self.auto_accept = auto_accept;
        self
    }

    /// Overrides the configured decision for non-interactive sessions.
    #[must_use]
    pub const fn with_non_interactive(mut self, policy: Option<NonInteractivePolicy>) -> Self {
        self.non_interactive = policy;
        self
    }

    /// Runs one operation end to end and reports its outcome.
    ///
    /// `connect` builds the gateway from the resolved configuration; it is
    /// not called if resolution fails.
    pub async fn run<G, C, Fut>(&self, operation: Operation, profile: Option<&str>, connect: C) -> Outcome
    where
        G: ProviderGateway + ?Sized,
        C: FnOnce(Configuration) -> Fut,
        Fut: Future<Output = crate::error::Result<Box<G>>>,
    {
        debug!("Running {operation}");

        let resolved = match self.resolve(profile) {
            Ok(resolved) => resolved,
            Err(failure) => return self.finish(None, Err(failure)),
        };

        let stack_name = resolved.stack_name().to_string();
        let gateway = match connect(resolved.config.clone()).await {
            Ok(gateway) => gateway,
            Err(e) => return self.finish(Some(stack_name), Err(Failure::new(Phase::Connect, e))),
        };
        let gateway = &*gateway;
        debug!("Using {} backend", gateway.backend_type());

        let result = match operation {
            Operation::Create => self.create(gateway, &resolved).await,
            Operation::Update => self.update(gateway, &resolved).await,
            Operation::Delete => self.delete(gateway, &resolved).await,
            Operation::Status => self.status(gateway, &resolved).await,
        };

        self.finish(Some(stack_name), result)
    }

    /// Resolves the configuration for an optional profile argument.
    ///
    /// # Errors
    ///
    /// Fails in [`Phase::Resolve`] if the profile is unknown or invalid.
    pub fn resolve(&self, profile: Option<&str>) -> Result<ResolvedStack, Failure> {
        let mut resolved = StackResolver::new(self.configs)
            .resolve(profile)
            .map_err(|e| Failure::new(Phase::Resolve, e))?;

        let confirmation = &mut resolved.config.confirmation;
        confirmation.auto_accept |= self.auto_accept;
        if let Some(policy) = self.non_interactive {
            confirmation.non_interactive = policy;
        }

        Ok(resolved)
    }

    /// Creates the stack and waits until it is available.
    ///
    /// # Errors
    ///
    /// Fails without mutating anything if the stack already exists or the
    /// template is rejected.
    pub async fn create<G>(&self, gateway: &G, resolved: &ResolvedStack) -> Result<Completion, Failure>
    where
        G: ProviderGateway + ?Sized,
    {
        let name = resolved.stack_name();
        if self.describe(gateway, name).await?.is_some() {
            return Err(Failure::new(
                Phase::Describe,
                BackendError::StackExists {
                    name: name.to_string(),
                }
                .into(),
            ));
        }

        let template = self.load_template(&resolved.config)?;
        step(&self.cancel, Phase::Validate, gateway.validate_template(&template)).await?;

        let params = StackParameters::from_config(&resolved.config);
        let stack_id = step(
            &self.cancel,
            Phase::CreateStack,
            gateway.create_stack(name, &template, &params),
        )
        .await?;
        info!("Creating stack {name} ({stack_id})");

        step(
            &self.cancel,
            Phase::AwaitStack,
            gateway.wait_until_stack_stable(name, &[StackStatus::Available]),
        )
        .await?;

        info!("Stack {name} created");
        Ok(Completion::Created { stack_id })
    }

    /// Updates an existing stack through a change set.
    ///
    /// # Errors
    ///
    /// Fails without mutating anything if the stack does not exist, otherwise
    /// with the first failing step of the change-set protocol.
    pub async fn update<G>(&self, gateway: &G, resolved: &ResolvedStack) -> Result<Completion, Failure>
    where
        G: ProviderGateway + ?Sized,
    {
        let name = resolved.stack_name();
        self.existing(gateway, name).await?;

        let template = self.load_template(&resolved.config)?;
        let params = StackParameters::from_config(&resolved.config);
        let planner = ChangePlanner::new(
            gateway,
            self.confirmer,
            resolved.config.confirmation,
            &self.cancel,
        );

        let completion = match planner.apply(name, &template, &params).await? {
            PlanOutcome::NoChanges(change_set) => Completion::NoChanges { change_set },
            PlanOutcome::Declined(change_set) => Completion::Declined { change_set },
            PlanOutcome::Applied(change_set) => Completion::Updated { change_set },
        };
        Ok(completion)
    }

    /// Deletes an existing stack and waits until it is gone.
    ///
    /// # Errors
    ///
    /// Fails if the stack does not exist or deletion does not complete.
    pub async fn delete<G>(&self, gateway: &G, resolved: &ResolvedStack) -> Result<Completion, Failure>
    where
        G: ProviderGateway + ?Sized,
    {
        let name = resolved.stack_name();
        self.existing(gateway, name).await?;

        step(&self.cancel, Phase::DeleteStack, gateway.delete_stack(name)).await?;
        step(
            &self.cancel,
            Phase::AwaitStack,
            gateway.wait_until_stack_stable(name, &[StackStatus::Absent]),
        )
        .await?;

        info!("Stack {name} deleted");
        Ok(Completion::Deleted)
    }

    /// Describes an existing stack.
    ///
    /// # Errors
    ///
    /// Fails if the stack does not exist.
    pub async fn status<G>(&self, gateway: &G, resolved: &ResolvedStack) -> Result<Completion, Failure>
    where
        G: ProviderGateway + ?Sized,
    {
        let stack = self.existing(gateway, resolved.stack_name()).await?;
        Ok(Completion::Status { stack })
    }

    async fn describe<G>(&self, gateway: &G, name: &str) -> Result<Option<Stack>, Failure>
    where
        G: ProviderGateway + ?Sized,
    {
        step(&self.cancel, Phase::Describe, gateway.describe_stack(name)).await
    }

    async fn existing<G>(&self, gateway: &G, name: &str) -> Result<Stack, Failure>
    where
        G: ProviderGateway + ?Sized,
    {
        self.describe(gateway, name).await?.ok_or_else(|| {
            Failure::new(
                Phase::Describe,
                BackendError::StackNotFound {
                    name: name.to_string(),
                }
                .into(),
            )
        })
    }

    fn load_template(&self, config: &Configuration) -> Result<Template, Failure> {
        let template = self
            .templates
            .load(config)
            .map_err(|e| Failure::new(Phase::LoadTemplate, e))?;

        if let Some(path) = template.path() {
            debug!("Loaded template {} ({} bytes)", path.display(), template.size());
        }
        Ok(template)
    }

    /// Turns a pipeline result into the invocation outcome.
    ///
    /// This is the only place a failure reaches the reporter.
    fn finish(&self, stack_name: Option<String>, result: Result<Completion, Failure>) -> Outcome {
        match result {
            Ok(completion) => Outcome::Success {
                stack_name: stack_name.unwrap_or_default(),
                completion,
            },
            Err(failure) => {
                debug!("Failed during {}", failure.phase);
                self.reporter.report_failure(&failure);
                Outcome::Failure(failure)
            }
        }
    }
}
