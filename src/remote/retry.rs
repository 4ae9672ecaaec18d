use crate::error::RemoteError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How long to wait before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same delay between every attempt.
    Fixed(Duration),
    /// `2^attempt * base` plus a random jitter below `base`.
    Exponential { base: Duration },
}

impl Backoff {
    /// Delay after the failed attempt with the given zero-based index.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base } => {
                let scaled = base.saturating_mul(2u32.saturating_pow(attempt.min(16)));
                scaled.saturating_add(jitter(base))
            }
        }
    }
}

fn jitter(below: Duration) -> Duration {
    let ceiling = below.as_millis() as u64;
    if ceiling == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..ceiling))
}

/// The outcome of one attempt.
#[derive(Debug)]
pub enum Step<T, E> {
    /// Terminal success.
    Done(T),
    /// Not there yet; try again if the budget allows.
    Retry(E),
    /// Terminal failure; stop immediately.
    Fail(E),
}

/// Why a bounded run stopped without success.
#[derive(Debug, PartialEq)]
pub enum Halt<E> {
    Failed(E),
    Exhausted { attempts: u32, last: E },
}

/// A bounded attempt budget with a delay schedule.
///
/// Both throttling retry (error-code based) and version polling (status based)
/// are instances of this; they differ in backoff and in how a step is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Runs `step` until it reports `Done` or `Fail`, or the attempt budget runs out.
    /// `step` receives the zero-based attempt index.
    pub async fn run<T, E, F, Fut>(&self, mut step: F) -> Result<T, Halt<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Step<T, E>>,
    {
        let budget = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match step(attempt).await {
                Step::Done(value) => return Ok(value),
                Step::Fail(error) => return Err(Halt::Failed(error)),
                Step::Retry(error) => {
                    if attempt + 1 >= budget {
                        return Err(Halt::Exhausted {
                            attempts: budget,
                            last: error,
                        });
                    }
                    tokio::time::sleep(self.backoff.delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Wraps remote calls with exponential backoff on throttling errors.
/// Every other error is returned immediately.
#[derive(Debug, Clone)]
pub struct RetryingExecutor {
    policy: RetryPolicy,
}

impl Default for RetryingExecutor {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(500))
    }
}

impl RetryingExecutor {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            policy: RetryPolicy::new(max_attempts, Backoff::Exponential { base: base_delay }),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Executes `call`, retrying while it fails with a throttling error.
    /// When the budget runs out the last throttling error is returned.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        self.policy
            .run(|attempt| {
                let pending = call();
                async move {
                    match pending.await {
                        Ok(value) => Step::Done(value),
                        Err(error) if error.is_throttling() => {
                            warn!(operation, attempt, %error, "throttled, backing off");
                            Step::Retry(error)
                        }
                        Err(error) => Step::Fail(error),
                    }
                }
            })
            .await
            .map_err(|halt| match halt {
                Halt::Failed(error) | Halt::Exhausted { last: error, .. } => error,
            })
    }
}
