//! Terminal implementations of the lifecycle collaborators.

use async_trait::async_trait;
use std::io::{self, BufRead, IsTerminal, Write};
use tracing::{error, warn};

use crate::lifecycle::{Confirmer, Failure, FailureReporter};

use super::output::OutputFormatter;

/// Asks for confirmation on stderr and reads the answer from stdin.
///
/// The blocking read runs on the blocking thread pool, so the prompt can be
/// abandoned on Ctrl-C or when the deadline passes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirmer;

impl TerminalConfirmer {
    /// Creates a terminal confirmer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Confirmer for TerminalConfirmer {
    async fn confirm(&self, prompt: &str) -> bool {
        {
            let mut stderr = io::stderr().lock();
            if write!(stderr, "{prompt} [y/N] ").and_then(|()| stderr.flush()).is_err() {
                return false;
            }
        }

        let answer = tokio::task::spawn_blocking(|| {
            let mut answer = String::new();
            io::stdin().lock().read_line(&mut answer).map(|_| answer)
        })
        .await;

        match answer {
            Ok(Ok(answer)) => is_yes(&answer),
            Ok(Err(e)) => {
                warn!("Failed to read confirmation: {e}");
                false
            }
            Err(e) => {
                warn!("Confirmation prompt aborted: {e}");
                false
            }
        }
    }

    fn is_interactive(&self) -> bool {
        io::stdin().is_terminal() && io::stderr().is_terminal()
    }
}

/// Accepts `y` and `yes` in any case; everything else declines.
fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Prints the terminal failure and its phase to stderr, or logs it in quiet
/// mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalReporter {
    /// Log instead of printing, e.g. when JSON goes to stdout.
    quiet: bool,
}

impl TerminalReporter {
    /// Creates a terminal reporter.
    #[must_use]
    pub const fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl FailureReporter for TerminalReporter {
    fn report_failure(&self, failure: &Failure) {
        if self.quiet {
            error!(phase = %failure.phase, "{}", failure.message());
        } else {
            eprint!("{}", OutputFormatter::format_failure_text(failure));
        }
    }
}
