//! CLI module for Kiln.
//!
//! This module provides the command-line interface, output rendering and
//! the terminal confirmation prompt.

mod commands;
mod output;
mod prompt;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
pub use prompt::{TerminalConfirmer, TerminalReporter};
