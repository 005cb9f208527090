//! Bounded retry with exponential backoff for capability calls

use std::future::Future;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::types::StageKind;

/// Attempt limit, backoff schedule, and per-attempt time budget
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    multiplier: u32,
    max_backoff: Duration,
    attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        multiplier: u32,
        max_backoff: Duration,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            multiplier: multiplier.max(1),
            max_backoff,
            attempt_timeout,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            config.backoff_multiplier,
            Duration::from_millis(config.max_backoff_ms),
            config.stage_timeout(),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the `attempt`-th failure (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run a pipeline stage; an attempt over budget fails with `StageTimeout`
    pub async fn run_stage<T, F, Fut>(&self, stage: StageKind, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let secs = self.attempt_timeout.as_secs();
        self.run(stage.as_str(), || Error::StageTimeout { stage, secs }, op)
            .await
    }

    /// Run any other capability call; an attempt over budget fails as transient
    pub async fn run_named<T, F, Fut>(&self, label: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let budget = self.attempt_timeout;
        self.run(
            label,
            || Error::transient(format!("{} timed out after {:?}", label, budget)),
            op,
        )
        .await
    }

    async fn run<T, F, Fut>(
        &self,
        label: &str,
        on_timeout: impl Fn() -> Error,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(on_timeout()),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        "{} attempt {}/{} failed: {}; retrying in {:?}",
                        label,
                        attempt,
                        self.max_attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        tracing::error!(
                            "{} failed after {} attempts: {}",
                            label,
                            attempt,
                            err
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}
