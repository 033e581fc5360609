//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::lifecycle::Operation;

/// Kiln - safe create, update and delete of infrastructure stacks.
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "KILN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Give up after this many seconds.
    #[arg(long, global = true, env = "KILN_TIMEOUT", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the stack and wait until it is available.
    Create {
        /// Named profile (`<PROFILE>.kiln.yaml`) instead of the default configuration.
        profile: Option<String>,
    },

    /// Update the stack through a change set.
    Update {
        /// Named profile (`<PROFILE>.kiln.yaml`) instead of the default configuration.
        profile: Option<String>,

        /// Apply the change set without asking.
        #[arg(short, long)]
        yes: bool,

        /// Apply the change set when no terminal is attached.
        #[arg(long)]
        accept_non_interactive: bool,
    },

    /// Delete the stack and wait until it is gone.
    Delete {
        /// Named profile (`<PROFILE>.kiln.yaml`) instead of the default configuration.
        profile: Option<String>,
    },

    /// Show the current state of the stack.
    Status {
        /// Named profile (`<PROFILE>.kiln.yaml`) instead of the default configuration.
        profile: Option<String>,
    },
}

impl Commands {
    /// Returns the lifecycle operation this command runs.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::Create { .. } => Operation::Create,
            Self::Update { .. } => Operation::Update,
            Self::Delete { .. } => Operation::Delete,
            Self::Status { .. } => Operation::Status,
        }
    }

    /// Returns the named profile, if one was given.
    #[must_use]
    pub fn profile(&self) -> Option<&str> {
        match self {
            Self::Create { profile }
            | Self::Update { profile, .. }
            | Self::Delete { profile }
            | Self::Status { profile } => profile.as_deref(),
        }
    }

    /// Returns true if change sets are applied without asking.
    #[must_use]
    pub const fn auto_accept(&self) -> bool {
        matches!(self, Self::Update { yes: true, .. })
    }

    /// Returns true if change sets are applied when no terminal is attached.
    #[must_use]
    pub const fn accept_non_interactive(&self) -> bool {
        matches!(
            self,
            Self::Update {
                accept_non_interactive: true,
                ..
            }
        )
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}
