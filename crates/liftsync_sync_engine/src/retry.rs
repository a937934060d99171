//! Bounded retry with exponential backoff.
//!
//! The executor retries a unit of work as a whole. It never looks inside the
//! operation, so it is only safe around operations that are idempotent.

use crate::config::RetryConfig;
use crate::error::SyncError;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Errors the executor can classify for logging.
///
/// Classification never changes control flow: every failure is retried
/// while attempts remain.
pub trait Retryable {
    /// Returns true if the failure looks transient.
    fn is_retryable(&self) -> bool;
}

impl Retryable for SyncError {
    fn is_retryable(&self) -> bool {
        SyncError::is_retryable(self)
    }
}

/// Something observed while retrying.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryEvent {
    /// An attempt failed. `next_delay` is `None` when no attempt follows.
    AttemptFailed {
        /// Name of the unit of work.
        label: String,
        /// 1-based attempt number.
        attempt: u32,
        /// Rendered error.
        error: String,
        /// Wait before the next attempt.
        next_delay: Option<Duration>,
    },
    /// The operation succeeded after at least one failure.
    Recovered {
        /// Name of the unit of work.
        label: String,
        /// 1-based attempt number that succeeded.
        attempt: u32,
    },
    /// The operation failed terminally.
    Exhausted {
        /// Name of the unit of work.
        label: String,
        /// Attempts made.
        attempts: u32,
        /// Rendered last error.
        error: String,
    },
}

/// Receives retry events. Observers cannot influence control flow.
pub trait RetryObserver: Send + Sync {
    /// Called for every event.
    fn on_event(&self, event: &RetryEvent);
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RetryObserver for NoopObserver {
    fn on_event(&self, _event: &RetryEvent) {}
}

/// Terminal failure of a retried operation.
#[derive(Debug)]
pub struct Exhausted<E> {
    /// The last error.
    pub error: E,
    /// Attempts made.
    pub attempts: u32,
}

/// Runs operations with bounded retries.
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    observer: Arc<dyn RetryObserver>,
}

impl RetryExecutor {
    /// Creates an executor without an observer.
    pub fn new(config: RetryConfig) -> Self {
        Self::with_observer(config, Arc::new(NoopObserver))
    }

    /// Creates an executor that reports to `observer`.
    pub fn with_observer(config: RetryConfig, observer: Arc<dyn RetryObserver>) -> Self {
        Self { config, observer }
    }

    /// Returns the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation` until it succeeds or runs out of attempts. Any
    /// error is retried. The operation receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, Exhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "recovered after retry");
                        self.observer.on_event(&RetryEvent::Recovered {
                            label: label.to_string(),
                            attempt,
                        });
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let can_retry = attempt < max_attempts;
                    let next_delay = can_retry.then(|| self.config.delay_for_attempt(attempt));

                    warn!(
                        label,
                        attempt,
                        max_attempts,
                        transient = error.is_retryable(),
                        retrying = can_retry,
                        "attempt failed: {error}"
                    );
                    self.observer.on_event(&RetryEvent::AttemptFailed {
                        label: label.to_string(),
                        attempt,
                        error: error.to_string(),
                        next_delay,
                    });

                    let Some(delay) = next_delay else {
                        self.observer.on_event(&RetryEvent::Exhausted {
                            label: label.to_string(),
                            attempts: attempt,
                            error: error.to_string(),
                        });
                        return Err(Exhausted {
                            error,
                            attempts: attempt,
                        });
                    };

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RemoteError, SyncError};
    use parking_lot::Mutex;
    use tokio::time::Instant;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<RetryEvent>>);

    impl RetryObserver for Recorder {
        fn on_event(&self, event: &RetryEvent) {
            self.0.lock().push(event.clone());
        }
    }

    fn unavailable() -> SyncError {
        RemoteError::Unavailable("offline".into()).into()
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_backoff() {
        let recorder = Arc::new(Recorder::default());
        let executor = RetryExecutor::with_observer(RetryConfig::default(), recorder.clone());
        let started = Instant::now();
        let attempts_at = Mutex::new(Vec::new());

        let result = executor
            .run("plan", |attempt| {
                attempts_at.lock().push(started.elapsed());
                async move {
                    if attempt < 3 {
                        Err(unavailable())
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(
            *attempts_at.lock(),
            vec![
                Duration::ZERO,
                Duration::from_millis(1000),
                Duration::from_millis(3000)
            ]
        );

        let events = recorder.0.lock();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            RetryEvent::AttemptFailed { attempt: 1, next_delay: Some(d), .. } if *d == Duration::from_millis(1000)
        ));
        assert!(matches!(
            &events[1],
            RetryEvent::AttemptFailed { attempt: 2, next_delay: Some(d), .. } if *d == Duration::from_millis(2000)
        ));
        assert!(matches!(&events[2], RetryEvent::Recovered { attempt: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_error() {
        let executor = RetryExecutor::new(RetryConfig::default());
        let started = Instant::now();

        let err = executor
            .run("session", |attempt| async move {
                Err::<(), _>(SyncError::from(RemoteError::Unavailable(format!("try {attempt}"))))
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 3);
        assert!(err.error.to_string().contains("try 3"));
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_failure_is_retried() {
        let executor = RetryExecutor::new(RetryConfig::default());
        let started = Instant::now();
        let calls = Mutex::new(0u32);

        let value = executor
            .run("plan", |attempt| {
                *calls.lock() += 1;
                async move {
                    if attempt == 1 {
                        Err(SyncError::from(RemoteError::Rejected {
                            table: "training_plans",
                            status: Some(400),
                            message: "bad filter".into(),
                        }))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(*calls.lock(), 2);
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_uses_every_attempt() {
        let recorder = Arc::new(Recorder::default());
        let executor = RetryExecutor::with_observer(RetryConfig::default(), recorder.clone());
        let started = Instant::now();

        let err = executor
            .run("set", |_| async {
                Err::<(), _>(SyncError::from(RemoteError::Decode("bad json".into())))
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 3);
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
        assert!(matches!(
            recorder.0.lock().last(),
            Some(RetryEvent::Exhausted { attempts: 3, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_config_never_waits() {
        let executor = RetryExecutor::new(RetryConfig::no_retry());
        let started = Instant::now();

        let err = executor
            .run("session", |_| async {
                Err::<(), _>(SyncError::from(RemoteError::Timeout))
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_emits_nothing() {
        let recorder = Arc::new(Recorder::default());
        let executor = RetryExecutor::with_observer(RetryConfig::default(), recorder.clone());

        let value = executor
            .run("plan", |_| async { Ok::<_, SyncError>(7) })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert!(recorder.0.lock().is_empty());
    }
}
