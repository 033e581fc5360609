//! Kiln CLI entrypoint.
//!
//! This is the main entrypoint for the kiln command-line tool.

use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use kiln::cli::{Cli, OutputFormat, OutputFormatter, TerminalConfirmer, TerminalReporter};
use kiln::config::{Configuration, FileConfigSource, FileTemplateSource, NonInteractivePolicy};
use kiln::lifecycle::{Lifecycle, Outcome};
use kiln::poller::Poller;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(run(&cli));
    // An abandoned confirmation prompt may still be blocked on stdin.
    runtime.shutdown_background();

    let formatter = OutputFormatter::new(cli.output);
    let rendered = formatter.format_outcome(&outcome);
    let shown = match (cli.output, &outcome) {
        // The reporter already printed the failure and its phase to stderr.
        (OutputFormat::Text, Outcome::Failure(_)) => Ok(()),
        _ => writeln!(std::io::stdout(), "{rendered}"),
    };
    if let Err(e) = shown {
        warn!("Failed to write output: {e}");
    }

    if outcome.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Runs the selected lifecycle operation.
async fn run(cli: &Cli) -> Outcome {
    let cancel = CancellationToken::new();
    watch_for_cancellation(cancel.clone(), cli.timeout.map(Duration::from_secs));

    let start_dir = std::env::current_dir().unwrap_or_else(|_| ".".into());
    let configs = FileConfigSource::new(start_dir)
        .with_default_path(cli.config.clone())
        .with_user_profile_dir();
    let templates = FileTemplateSource;
    let confirmer = TerminalConfirmer::new();
    let reporter = TerminalReporter::new(matches!(cli.output, OutputFormat::Json));

    let non_interactive = cli
        .command
        .accept_non_interactive()
        .then_some(NonInteractivePolicy::Accept);

    let lifecycle = Lifecycle::new(&configs, &templates, &confirmer, &reporter)
        .with_cancellation(cancel.clone())
        .with_auto_accept(cli.command.auto_accept())
        .with_non_interactive(non_interactive);

    lifecycle
        .run(
            cli.command.operation(),
            cli.command.profile(),
            |config: Configuration| async move {
                let poller = Poller::from_config(&config.polling).with_cancellation(cancel);
                kiln::gateway::connect(&config, poller).await
            },
        )
        .await
}

/// Cancels `cancel` on Ctrl-C or when `timeout` elapses.
fn watch_for_cancellation(cancel: CancellationToken, timeout: Option<Duration>) {
    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            () = cancel.cancelled() => return,
            Ok(()) = tokio::signal::ctrl_c() => debug!("Interrupted"),
            () = deadline => debug!("Timeout reached"),
        }

        cancel.cancel();
    });
}
