//! Retry of commands that lost an optimistic-locking race.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use flowable_core::FlowableResult;

use super::{CommandInterceptor, Invocation, Next};
use crate::command::CommandOutput;

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff: base * 2^(attempt - 1)
    #[default]
    Exponential,
    /// Linear backoff: base * attempt
    Linear,
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt (0 = no retries)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Create a policy with fixed delays.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Create a policy with exponential backoff.
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Delay before retry number `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 2_u32.saturating_pow(attempt - 1);
                self.base_delay.saturating_mul(factor)
            }
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
        };

        delay.min(self.max_delay)
    }

    /// Check if more retries are allowed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Re-runs a top-level command that failed with an optimistic-locking error.
///
/// Each attempt goes through the rest of the chain again, so it gets a fresh
/// transaction and a fresh command context. Nested invocations are never
/// retried here: their failure belongs to the enclosing command, which is
/// retried as a whole. When retries run out, the last error is returned
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct RetryInterceptor {
    policy: RetryPolicy,
}

impl RetryInterceptor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl CommandInterceptor for RetryInterceptor {
    fn execute(
        &self,
        mut invocation: Invocation<'_>,
        next: Next<'_>,
    ) -> FlowableResult<CommandOutput> {
        if invocation.is_nested() {
            return next.proceed(invocation);
        }

        let mut retries = 0;
        loop {
            match next.proceed(invocation.reborrow()) {
                Err(e) if e.is_optimistic_locking() && self.policy.should_retry(retries) => {
                    retries += 1;
                    let delay = self.policy.delay_for_attempt(retries);
                    info!(
                        command = invocation.command_name(),
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "optimistic locking failure, retrying command"
                    );
                    thread::sleep(delay);
                }
                Err(e) if e.is_optimistic_locking() => {
                    warn!(
                        command = invocation.command_name(),
                        retries,
                        error = %e,
                        "giving up on command after optimistic locking failures"
                    );
                    return Err(e);
                }
                other => return other,
            }
        }
    }
}
