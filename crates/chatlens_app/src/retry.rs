use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBuilder};
use chatlens_config::RetryConfig;
use chatlens_domain::{Analysis, AnnotationClient, AnnotationFailure, Conversation};
use derive_setters::Setters;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

lazy_static! {
    static ref RETRY_HINT: Option<Regex> =
        Regex::new(r"(?i)try again in (\d+(?:\.\d+)?)\s*(ms|s)\b").ok();
}

/// Wait suggested inside a provider error message, e.g.
/// `Please try again in 1.25s` or `try again in 300ms`.
pub fn retry_hint(message: &str) -> Option<Duration> {
    let captures = RETRY_HINT.as_ref()?.captures(message)?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    let seconds = match captures.get(2)?.as_str().to_ascii_lowercase().as_str() {
        "ms" => value / 1000.0,
        _ => value,
    };
    // Hints beyond what a Duration holds saturate; callers cap them anyway.
    Some(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX))
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

#[derive(Debug, Clone, PartialEq, Setters)]
#[setters(into)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff_base: Duration,
    pub max_delay: Duration,
    /// Adds a uniform random wait in [0, 1) s to computed backoffs.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_base: config.backoff_base(),
            max_delay: config.max_delay(),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// `backoff_base * 2^attempt`, capped at `max_delay`.
    pub fn exponential(&self, attempt: usize) -> Duration {
        ExponentialBuilder::default()
            .with_min_delay(self.backoff_base)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(attempt + 1)
            .build()
            .nth(attempt)
            .unwrap_or(self.max_delay)
    }

    /// Wait before the attempt following `attempt`. A `Retry-After` value wins
    /// over a hint in the message, which wins over exponential backoff. Hints
    /// are capped at `max_delay`; jitter is added on top of the already capped
    /// exponential value.
    pub fn delay(&self, failure: &AnnotationFailure, attempt: usize) -> Duration {
        match failure.retry_after.or_else(|| retry_hint(&failure.message)) {
            Some(hint) => hint.min(self.max_delay),
            None => self.exponential(attempt) + self.random_jitter(),
        }
    }

    fn random_jitter(&self) -> Duration {
        if self.jitter {
            Duration::from_secs_f64(rand::random::<f64>())
        } else {
            Duration::ZERO
        }
    }
}

/// Result of one retried annotation call.
#[derive(Debug)]
pub struct RetryOutcome {
    pub result: Result<Analysis, AnnotationFailure>,
    pub attempts: usize,
    pub backoffs: Vec<Duration>,
}

impl RetryOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

enum State {
    Attempt(usize),
    Backoff { attempt: usize, delay: Duration },
    Success { analysis: Analysis, attempts: usize },
    Abort { failure: AnnotationFailure, attempts: usize },
}

/// Runs an annotation call with bounded retries on rate limiting. Timeouts
/// and other failures abort straight away.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn run<C: AnnotationClient + ?Sized>(
        &self,
        client: &C,
        conversation: &Conversation,
    ) -> RetryOutcome {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut backoffs = Vec::new();
        let mut state = State::Attempt(0);

        loop {
            state = match state {
                State::Attempt(attempt) => match client.analyze(conversation).await {
                    Ok(analysis) => State::Success { analysis, attempts: attempt + 1 },
                    Err(failure) if failure.is_rate_limited() && attempt + 1 < max_attempts => {
                        State::Backoff { attempt, delay: self.policy.delay(&failure, attempt) }
                    }
                    Err(failure) => State::Abort { failure, attempts: attempt + 1 },
                },
                State::Backoff { attempt, delay } => {
                    warn!(
                        dialogue_id = %conversation.dialogue_id,
                        attempt = attempt + 1,
                        max_attempts,
                        wait_ms = delay.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    self.sleeper.sleep(delay).await;
                    backoffs.push(delay);
                    State::Attempt(attempt + 1)
                }
                State::Success { analysis, attempts } => {
                    return RetryOutcome { result: Ok(analysis), attempts, backoffs };
                }
                State::Abort { failure, attempts } => {
                    debug!(
                        dialogue_id = %conversation.dialogue_id,
                        attempts,
                        kind = %failure.kind,
                        "Giving up on conversation"
                    );
                    return RetryOutcome { result: Err(failure), attempts, backoffs };
                }
            };
        }
    }
}
