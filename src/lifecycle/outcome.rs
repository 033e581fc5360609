//! Terminal outcome of one invocation.

use std::fmt;
use std::future::Future;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{KilnError, Result, WaitError};
use crate::gateway::{ChangeSet, Stack};

/// Pipeline step during which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Resolving the configuration profile.
    Resolve,
    /// Reading the stack template.
    LoadTemplate,
    /// Connecting to the provisioning backend.
    Connect,
    /// Validating the template on the backend.
    Validate,
    /// Reading the current stack.
    Describe,
    /// Creating a change set.
    CreateChangeSet,
    /// Waiting for the change set to be computed.
    AwaitChangeSet,
    /// Reading the computed changes.
    InspectChangeSet,
    /// Waiting for the operator to confirm.
    Confirm,
    /// Executing the change set.
    ExecuteChangeSet,
    /// Waiting for the stack to settle.
    AwaitStack,
    /// Starting stack creation.
    CreateStack,
    /// Starting stack deletion.
    DeleteStack,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Resolve => "resolve",
            Self::LoadTemplate => "load-template",
            Self::Connect => "connect",
            Self::Validate => "validate",
            Self::Describe => "describe",
            Self::CreateChangeSet => "create-change-set",
            Self::AwaitChangeSet => "await-change-set",
            Self::InspectChangeSet => "inspect-change-set",
            Self::Confirm => "confirm",
            Self::ExecuteChangeSet => "execute-change-set",
            Self::AwaitStack => "await-stack",
            Self::CreateStack => "create-stack",
            Self::DeleteStack => "delete-stack",
        };
        write!(f, "{s}")
    }
}

/// A failed invocation.
#[derive(Debug)]
pub struct Failure {
    /// Step that failed.
    pub phase: Phase,
    /// Underlying error.
    pub error: KilnError,
}

impl Failure {
    /// Creates a failure for a phase.
    #[must_use]
    pub const fn new(phase: Phase, error: KilnError) -> Self {
        Self { phase, error }
    }

    /// Returns the error text exactly as produced by the failing component.
    #[must_use]
    pub fn message(&self) -> String {
        self.error.to_string()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

/// What a successful invocation achieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Completion {
    /// The stack was created.
    Created {
        /// Backend stack identifier.
        stack_id: String,
    },
    /// A change set was executed and the stack settled.
    Updated {
        /// Executed change set.
        change_set: ChangeSet,
    },
    /// The change set was empty and was not executed.
    NoChanges {
        /// Inspected change set.
        change_set: ChangeSet,
    },
    /// The operator declined the change set.
    Declined {
        /// Declined change set.
        change_set: ChangeSet,
    },
    /// The stack was deleted.
    Deleted,
    /// The stack was described.
    Status {
        /// Described stack.
        stack: Stack,
    },
}

/// Exactly one of these ends every invocation.
#[derive(Debug)]
pub enum Outcome {
    /// The invocation succeeded.
    Success {
        /// Stack the invocation targeted.
        stack_name: String,
        /// What was achieved.
        completion: Completion,
    },
    /// The invocation failed and the failure was reported.
    Failure(Failure),
}

impl Outcome {
    /// Returns true if the invocation failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns the failure, if any.
    #[must_use]
    pub const fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failure(failure) => Some(failure),
            Self::Success { .. } => None,
        }
    }

    /// Returns the completion, if the invocation succeeded.
    #[must_use]
    pub const fn completion(&self) -> Option<&Completion> {
        match self {
            Self::Success { completion, .. } => Some(completion),
            Self::Failure(_) => None,
        }
    }
}

/// Runs one backend step, tagging its error with `phase`.
///
/// The step is abandoned with a cancellation failure if `cancel` fires
/// first.
///
/// # Errors
///
/// Returns the step's error or a cancellation error, tagged with `phase`.
pub async fn step<T, F>(cancel: &CancellationToken, phase: Phase, fut: F) -> std::result::Result<T, Failure>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Failure::new(
            phase,
            WaitError::Cancelled {
                waiting_for: phase.to_string(),
            }
            .into(),
        )),
        result = fut => result.map_err(|e| Failure::new(phase, e)),
    }
}
