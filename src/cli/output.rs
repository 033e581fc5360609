//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::gateway::{ChangeAction, ChangeSet, Stack, StackStatus};
use crate::lifecycle::{Completion, Failure, Outcome, Phase};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Change row for table display.
#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Logical ID")]
    logical_id: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Replacement")]
    replacement: String,
}

/// Stack output row for table display.
#[derive(Tabled)]
struct OutputRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the outcome of an invocation.
    #[must_use]
    pub fn format_outcome(&self, outcome: &Outcome) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&OutcomeJson::from(outcome)).unwrap_or_default()
            }
            OutputFormat::Text => match outcome {
                Outcome::Success {
                    stack_name,
                    completion,
                } => Self::format_completion_text(stack_name, completion),
                Outcome::Failure(failure) => Self::format_failure_text(failure),
            },
        }
    }

    fn format_completion_text(stack_name: &str, completion: &Completion) -> String {
        match completion {
            Completion::Created { stack_id } => {
                format!("{} Stack {stack_name} created ({stack_id})\n", "✓".green())
            }
            Completion::Updated { change_set } => {
                let mut output = Self::format_change_set_text(change_set);
                let _ = writeln!(output, "\n{} Stack {stack_name} updated", "✓".green());
                output
            }
            Completion::NoChanges { .. } => format!(
                "{} No changes to apply - stack {stack_name} is up to date.\n",
                "✓".green()
            ),
            Completion::Declined { change_set } => format!(
                "{} Change set {} was not applied to stack {stack_name}.\n",
                "⚠".yellow(),
                change_set.name
            ),
            Completion::Deleted => format!("{} Stack {stack_name} deleted\n", "✓".green()),
            Completion::Status { stack } => Self::format_stack_text(stack),
        }
    }

    /// Formats a failure with the step it happened in.
    pub(crate) fn format_failure_text(failure: &Failure) -> String {
        format!("{} {} (during {})\n", "✗".red(), failure.message(), failure.phase)
    }

    /// Formats a change set for display.
    #[must_use]
    pub fn format_change_set(&self, change_set: &ChangeSet) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(change_set).unwrap_or_default(),
            OutputFormat::Text => Self::format_change_set_text(change_set),
        }
    }

    fn format_change_set_text(change_set: &ChangeSet) -> String {
        let mut output = String::new();
        let _ = write!(
            output,
            "\nChange set {} for stack {}\n\n",
            change_set.name, change_set.stack_name
        );

        if change_set.is_empty() {
            output.push_str("   No changes.\n");
            return output;
        }

        let rows: Vec<ChangeRow> = change_set
            .changes
            .iter()
            .enumerate()
            .map(|(i, c)| ChangeRow {
                index: i + 1,
                action: Self::format_action(&c.action),
                logical_id: c.logical_id.clone(),
                resource_type: c.resource_type.clone(),
                replacement: c.replacement.clone().unwrap_or_default(),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = write!(
            output,
            "\nChanges: {} to add, {} to modify, {} to remove\n",
            change_set.count_action(&ChangeAction::Add).to_string().green(),
            change_set.count_action(&ChangeAction::Modify).to_string().yellow(),
            change_set.count_action(&ChangeAction::Remove).to_string().red()
        );

        output
    }

    /// Formats a stack for display.
    #[must_use]
    pub fn format_stack(&self, stack: &Stack) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(stack).unwrap_or_default(),
            OutputFormat::Text => Self::format_stack_text(stack),
        }
    }

    fn format_stack_text(stack: &Stack) -> String {
        let mut output = String::new();

        let _ = write!(output, "\nStack: {}\n\n", stack.name);
        let _ = writeln!(
            output,
            "   Status: {} ({})",
            Self::format_status(stack.status),
            stack.raw_status
        );
        if let Some(reason) = &stack.status_reason {
            let _ = writeln!(output, "   Reason: {reason}");
        }
        if let Some(id) = &stack.id {
            let _ = writeln!(output, "   ID: {id}");
        }
        if let Some(created) = stack.created_at {
            let _ = writeln!(output, "   Created: {}", created.format("%Y-%m-%d %H:%M"));
        }

        if !stack.outputs.is_empty() {
            output.push_str("\nOutputs:\n");
            let rows: Vec<OutputRow> = stack
                .outputs
                .iter()
                .map(|o| OutputRow {
                    key: o.key.clone(),
                    value: o.value.clone(),
                    description: Self::truncate(o.description.as_deref().unwrap_or_default(), 40),
                })
                .collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        output
    }

    /// Formats a change action with color.
    fn format_action(action: &ChangeAction) -> String {
        match action {
            ChangeAction::Add => "+add".green().to_string(),
            ChangeAction::Modify => "~modify".yellow().to_string(),
            ChangeAction::Remove => "-remove".red().to_string(),
            other => other.to_string().dimmed().to_string(),
        }
    }

    /// Formats a stack status with color.
    fn format_status(status: StackStatus) -> String {
        let text = status.to_string();
        if status.is_failed() {
            text.red().to_string()
        } else if status == StackStatus::Available {
            text.green().to_string()
        } else {
            text.yellow().to_string()
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

// JSON serialization helpers

#[derive(Serialize)]
struct OutcomeJson<'a> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<&'a str>,
    #[serde(flatten)]
    completion: Option<&'a Completion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phase: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl<'a> From<&'a Outcome> for OutcomeJson<'a> {
    fn from(outcome: &'a Outcome) -> Self {
        match outcome {
            Outcome::Success {
                stack_name,
                completion,
            } => Self {
                status: "success",
                stack: Some(stack_name),
                completion: Some(completion),
                phase: None,
                message: None,
            },
            Outcome::Failure(failure) => Self {
                status: "failure",
                stack: None,
                completion: None,
                phase: Some(failure.phase),
                message: Some(failure.message()),
            },
        }
    }
}
