//! Backend-neutral stack and change-set types.
//!
//! Statuses here are observed from the backend, never set locally.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::Configuration;

/// A provisioned stack as observed on the backend.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Stack {
    /// Stack name.
    pub name: String,
    /// Opaque backend identifier.
    pub id: Option<String>,
    /// Normalised status.
    pub status: StackStatus,
    /// Status exactly as the backend reported it.
    pub raw_status: String,
    /// Backend explanation of the status, if any.
    pub status_reason: Option<String>,
    /// When the stack was created.
    pub created_at: Option<DateTime<Utc>>,
    /// Stack outputs.
    pub outputs: Vec<StackOutput>,
}

/// A single stack output.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StackOutput {
    /// Output key.
    pub key: String,
    /// Output value.
    pub value: String,
    /// Optional description.
    pub description: Option<String>,
}

/// Normalised stack status.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum StackStatus {
    /// The stack does not exist.
    Absent,
    /// Creation is in progress.
    Creating,
    /// The stack is stable and usable.
    Available,
    /// An update is in progress.
    Updating,
    /// An update is finishing or rolling back.
    UpdatingInProgress,
    /// The last update failed.
    UpdateFailed,
    /// Creation failed and the stack was rolled back.
    CreateFailed,
    /// Deletion is in progress.
    Deleting,
    /// Deletion failed.
    DeleteFailed,
}

impl StackStatus {
    /// Returns true if the backend reports a failed terminal state.
    #[must_use]
    pub const fn is_failed(self) -> bool {
        matches!(
            self,
            Self::UpdateFailed | Self::CreateFailed | Self::DeleteFailed
        )
    }
}

impl std::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Creating => "creating",
            Self::Available => "available",
            Self::Updating => "updating",
            Self::UpdatingInProgress => "updating-in-progress",
            Self::UpdateFailed => "update-failed",
            Self::CreateFailed => "create-failed",
            Self::Deleting => "deleting",
            Self::DeleteFailed => "delete-failed",
        };
        write!(f, "{s}")
    }
}

impl Stack {
    /// Creates a stack record with no outputs.
    #[must_use]
    pub fn new(name: impl Into<String>, status: StackStatus) -> Self {
        Self {
            name: name.into(),
            id: None,
            status,
            raw_status: status.to_string(),
            status_reason: None,
            created_at: None,
            outputs: Vec::new(),
        }
    }

    /// Sets the backend identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A backend-computed, not yet applied diff against a stack.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChangeSet {
    /// Backend identifier.
    pub id: String,
    /// Change-set name.
    pub name: String,
    /// Identifier of the owning stack.
    pub stack_id: String,
    /// Name of the owning stack.
    pub stack_name: String,
    /// Proposed changes, in backend order.
    pub changes: Vec<Change>,
    /// Computation status.
    pub status: ChangeSetStatus,
}

/// Computation status of a change set.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase", tag = "state", content = "reason")]
pub enum ChangeSetStatus {
    /// The backend is still computing changes.
    Pending,
    /// Changes are computed and can be inspected.
    Ready,
    /// Computation failed.
    Failed(String),
}

/// One proposed resource change.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Change {
    /// What happens to the resource.
    pub action: ChangeAction,
    /// Logical resource id in the template.
    pub logical_id: String,
    /// Physical resource id, if the resource exists.
    pub physical_id: Option<String>,
    /// Resource type.
    pub resource_type: String,
    /// Whether the change replaces the resource.
    pub replacement: Option<String>,
}

/// Resource change action.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// Resource is added.
    Add,
    /// Resource is modified in place or replaced.
    Modify,
    /// Resource is removed.
    Remove,
    /// Existing resource is imported.
    Import,
    /// Action is decided at execution time.
    Dynamic,
    /// Action the backend reported that Kiln does not model.
    Other(String),
}

impl ChangeAction {
    /// Parses a backend action name.
    #[must_use]
    pub fn parse(action: &str) -> Self {
        match action.to_ascii_lowercase().as_str() {
            "add" => Self::Add,
            "modify" => Self::Modify,
            "remove" => Self::Remove,
            "import" => Self::Import,
            "dynamic" => Self::Dynamic,
            _ => Self::Other(action.to_string()),
        }
    }
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Modify => write!(f, "modify"),
            Self::Remove => write!(f, "remove"),
            Self::Import => write!(f, "import"),
            Self::Dynamic => write!(f, "dynamic"),
            Self::Other(action) => write!(f, "{action}"),
        }
    }
}

impl ChangeSet {
    /// Creates a pending change set with no inspected changes.
    #[must_use]
    pub fn pending(
        id: impl Into<String>,
        name: impl Into<String>,
        stack_id: impl Into<String>,
        stack_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stack_id: stack_id.into(),
            stack_name: stack_name.into(),
            changes: Vec::new(),
            status: ChangeSetStatus::Pending,
        }
    }

    /// Returns true if applying the change set would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the number of changes.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    /// Counts changes with the given action.
    #[must_use]
    pub fn count_action(&self, action: &ChangeAction) -> usize {
        self.changes.iter().filter(|c| &c.action == action).count()
    }

    /// One-line summary such as `kiln-1 for stack web: 1 to add, 0 to modify, 2 to remove`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} for stack {}: {} to add, {} to modify, {} to remove",
            self.name,
            self.stack_name,
            self.count_action(&ChangeAction::Add),
            self.count_action(&ChangeAction::Modify),
            self.count_action(&ChangeAction::Remove)
        )
    }
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.action, self.resource_type, self.logical_id)?;
        if let Some(replacement) = self.replacement.as_deref().filter(|r| *r != "False") {
            write!(f, " (replacement: {replacement})")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.changes.is_empty() {
            return write!(f, "Change set {} for stack {}: no changes", self.name, self.stack_name);
        }

        writeln!(
            f,
            "Change set {} for stack {} ({} changes):",
            self.name,
            self.stack_name,
            self.changes.len()
        )?;
        for (i, change) in self.changes.iter().enumerate() {
            writeln!(f, "  {}. {change}", i + 1)?;
        }
        Ok(())
    }
}

/// Parameters and capabilities sent with a stack mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackParameters {
    /// Template parameter values.
    pub values: BTreeMap<String, String>,
    /// Acknowledged capabilities.
    pub capabilities: Vec<String>,
}

impl StackParameters {
    /// Takes parameters and capabilities from a configuration.
    #[must_use]
    pub fn from_config(config: &Configuration) -> Self {
        Self {
            values: config.parameters.clone(),
            capabilities: config.capabilities.clone(),
        }
    }
}
