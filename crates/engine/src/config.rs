//! Engine configuration

use crate::types::QueueName;
use std::time::Duration;

/// Retry behaviour applied by the broker when a job fails
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total delivery attempts before a job is terminally failed
    pub max_attempts: u32,
    /// Base delay; attempt n waits base * 2^(n-1)
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Delay before redelivering after the given failed attempt (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.backoff_base * 2u32.saturating_pow(exp)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
        }
    }
}

/// Bounds on how many finished jobs a clean pass may remove
#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    /// Max completed entries removed per clean call
    pub completed: usize,
    /// Max failed entries removed per clean call
    pub failed: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            completed: 100,
            failed: 200,
        }
    }
}

/// Engine-wide configuration, injected at construction
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    pub retention: RetentionConfig,
    /// Simulated execution delay for dry-run jobs
    pub dry_run_delay: Duration,
    /// Execution budget for a single handler invocation
    pub handler_timeout: Duration,
    /// How often idle workers poll their queue
    pub poll_interval: Duration,
    concurrency: [(QueueName, usize); 5],
}

impl EngineConfig {
    /// Bounded worker count for a queue
    pub fn concurrency_for(&self, queue: QueueName) -> usize {
        self.concurrency
            .iter()
            .find(|(q, _)| *q == queue)
            .map(|(_, n)| *n)
            .unwrap_or(1)
    }

    pub fn with_concurrency(mut self, queue: QueueName, limit: usize) -> Self {
        for entry in self.concurrency.iter_mut() {
            if entry.0 == queue {
                entry.1 = limit.max(1);
            }
        }
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_dry_run_delay(mut self, delay: Duration) -> Self {
        self.dry_run_delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            retention: RetentionConfig::default(),
            dry_run_delay: Duration::from_millis(200),
            handler_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(100),
            concurrency: [
                (QueueName::AgentActions, 5),
                (QueueName::ContentGeneration, 3),
                (QueueName::TechnicalSeo, 5),
                (QueueName::CmsPublishing, 2),
                (QueueName::Verification, 10),
            ],
        }
    }
}
