//! Bounded retry with exponential backoff.
//!
//! [`RetryManager::execute`] drives one fallible async operation through the
//! attempt state machine:
//!
//! ```text
//! Idle -> Attempting -> Succeeded
//!                    -> Retrying -> Attempting ...
//!                    -> FailedPermanently
//!                    -> Cancelled
//! ```
//!
//! Three limits stop a sequence: the attempt budget (`max_retries`), the
//! overall `timeout` measured from the first attempt, and the error category
//! (permission, corruption and validation errors are never retried). The
//! cancellation token is checked before every attempt and raced against every
//! backoff sleep; an attempt that is already running is allowed to finish.
//! The timeout drops the running attempt's future. Work that future handed
//! to another thread keeps running, and waiting for it is the caller's job.

use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{MergeError, Result};

/// States of an attempt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Not started.
    Idle,
    /// An attempt is running.
    Attempting,
    /// Waiting out a backoff delay.
    Retrying,
    /// An attempt succeeded.
    Succeeded,
    /// No further attempts will be made.
    FailedPermanently,
    /// The cancellation token fired.
    Cancelled,
}

/// Why a sequence stopped without success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The error category is not retryable.
    NotRetryable,
    /// The attempt budget ran out.
    RetriesExhausted,
    /// The overall timeout elapsed.
    TimedOut,
}

/// Terminal outcome of an attempt sequence.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// An attempt succeeded after `retries` failed attempts.
    Succeeded {
        /// The operation's value.
        value: T,
        /// Failed attempts before the successful one.
        retries: u32,
    },
    /// The sequence gave up.
    Failed {
        /// The last error observed.
        error: MergeError,
        /// Attempts made.
        attempts: u32,
        /// Which limit stopped it.
        reason: StopReason,
    },
    /// Cancellation was observed.
    Cancelled {
        /// Attempts made before cancellation.
        attempts: u32,
    },
}

impl<T> RetryOutcome<T> {
    /// Terminal state this outcome corresponds to.
    pub fn state(&self) -> RetryState {
        match self {
            Self::Succeeded { .. } => RetryState::Succeeded,
            Self::Failed { .. } => RetryState::FailedPermanently,
            Self::Cancelled { .. } => RetryState::Cancelled,
        }
    }

    /// Whether the operation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Failed attempts before success, or all attempts otherwise.
    pub fn retries(&self) -> u32 {
        match self {
            Self::Succeeded { retries, .. } => *retries,
            Self::Failed { attempts, .. } | Self::Cancelled { attempts } => *attempts,
        }
    }
}

/// Runs operations under a [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryManager {
    config: RetryConfig,
}

impl RetryManager {
    /// Create a manager for the given config.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The config in use.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds or a limit is reached.
    pub async fn execute<F, Fut, T>(
        &self,
        name: &str,
        cancel: &CancellationToken,
        operation: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_with_hook(name, cancel, operation, |_| {}).await
    }

    /// Like [`execute`](Self::execute), calling `on_failure` after every
    /// retryable failure, before the backoff delay starts.
    pub async fn execute_with_hook<F, Fut, T, H>(
        &self,
        name: &str,
        cancel: &CancellationToken,
        mut operation: F,
        mut on_failure: H,
    ) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        H: FnMut(&MergeError),
    {
        let max_attempts = self.config.max_retries.max(1);
        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                debug!(operation = name, attempt, "Cancelled before attempt");
                return RetryOutcome::Cancelled { attempts: attempt };
            }

            let result = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match timeout(remaining, operation()).await {
                        Ok(result) => result,
                        Err(_) => Err(timed_out(started)),
                    }
                }
                None => operation().await,
            };
            attempt += 1;

            let error = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = name, attempt, "Succeeded after retry");
                    }
                    return RetryOutcome::Succeeded {
                        value,
                        retries: attempt - 1,
                    };
                }
                Err(error) => error,
            };

            if matches!(error, MergeError::TimedOut { .. }) {
                return give_up(name, error, attempt, StopReason::TimedOut);
            }

            if !error.is_retryable() {
                return give_up(name, error, attempt, StopReason::NotRetryable);
            }

            if attempt >= max_attempts {
                return give_up(name, error, attempt, StopReason::RetriesExhausted);
            }

            on_failure(&error);

            let mut delay = self.config.delay_for(attempt - 1);
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining <= delay {
                    // The next attempt could not start before the deadline.
                    return give_up(name, error, attempt, StopReason::TimedOut);
                }
                delay = delay.min(remaining);
            }

            warn!(
                operation = name,
                attempt,
                max_attempts,
                category = %error.category(),
                error = %error,
                delay_ms = delay.as_millis() as u64,
                "Attempt failed, retrying"
            );

            if !backoff(cancel, delay).await {
                debug!(operation = name, attempt, "Cancelled during backoff");
                return RetryOutcome::Cancelled { attempts: attempt };
            }
        }
    }
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

/// Sleep for `delay` unless cancelled first. Returns false on cancellation.
async fn backoff(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(delay) => true,
    }
}

fn timed_out(started: Instant) -> MergeError {
    MergeError::TimedOut {
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

fn give_up<T>(name: &str, error: MergeError, attempts: u32, reason: StopReason) -> RetryOutcome<T> {
    warn!(
        operation = name,
        attempts,
        ?reason,
        category = %error.category(),
        error = %error,
        "Giving up"
    );
    RetryOutcome::Failed {
        error,
        attempts,
        reason,
    }
}
