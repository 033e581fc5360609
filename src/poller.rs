//! Bounded polling of backend conditions.
//!
//! The poller re-checks a condition at a constant interval until the check
//! reports done, the check fails, a bound is exceeded, or the invocation is
//! cancelled. There is no backoff and no jitter.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::PollingConfig;
use crate::error::{Result, WaitError};

/// Constant-interval poller.
#[derive(Debug, Clone)]
pub struct Poller {
    /// Delay between checks. Zero checks back-to-back.
    interval: Duration,
    /// Maximum number of checks.
    max_attempts: Option<u32>,
    /// Maximum time spent waiting.
    timeout: Option<Duration>,
    /// Invocation-wide cancellation.
    cancel: CancellationToken,
}

impl Poller {
    /// Creates an unbounded poller with the given interval.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Creates a poller from polling configuration.
    #[must_use]
    pub fn from_config(polling: &PollingConfig) -> Self {
        Self {
            interval: polling.wait_frequency(),
            max_attempts: polling.max_attempts,
            timeout: polling.timeout(),
            cancel: CancellationToken::new(),
        }
    }

    /// Limits the number of checks.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Limits the time spent waiting.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stops waiting when the token is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the polling interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Polls `check` until it returns `Ok(true)`.
    ///
    /// `Ok(false)` means "not yet" and schedules another check. An `Err` from
    /// the check ends the wait immediately and is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns the check's error, [`WaitError::Timeout`] when a bound is
    /// exceeded, or [`WaitError::Cancelled`] when the token fires.
    pub async fn wait_until<F, Fut>(&self, waiting_for: &str, mut check: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(Self::cancelled(waiting_for));
            }

            attempts = attempts.saturating_add(1);
            if check().await? {
                debug!("{waiting_for} reached after {attempts} checks");
                return Ok(());
            }
            trace!("{waiting_for} not reached yet (check {attempts})");

            if self.max_attempts.is_some_and(|max| attempts >= max) {
                return Err(Self::timed_out(waiting_for, attempts));
            }

            let mut delay = self.interval;
            if let Some(timeout) = self.timeout {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    return Err(Self::timed_out(waiting_for, attempts));
                }
                delay = delay.min(timeout.saturating_sub(elapsed));
            }

            if delay.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                () = self.cancel.cancelled() => return Err(Self::cancelled(waiting_for)),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn timed_out(waiting_for: &str, attempts: u32) -> crate::error::KilnError {
        WaitError::Timeout {
            waiting_for: waiting_for.to_string(),
            attempts,
        }
        .into()
    }

    fn cancelled(waiting_for: &str) -> crate::error::KilnError {
        debug!("Stopped waiting for {waiting_for}: cancelled");
        WaitError::Cancelled {
            waiting_for: waiting_for.to_string(),
        }
        .into()
    }
}
