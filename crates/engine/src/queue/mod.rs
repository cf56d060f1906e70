//! Job broker
//!
//! Durable queue/topic abstraction with priority, delayed visibility,
//! dedup-by-key, retry with exponential backoff, progress reporting and
//! pause/resume/clean controls. The engine only depends on the `JobBroker`
//! trait; `MemoryBroker` is the in-process implementation.

use crate::config::{RetentionConfig, RetryPolicy};
use crate::error::{EngineError, Result};
use crate::types::{JobId, JobPayload, QueueName, QueueStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Options supplied when enqueuing a job
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    /// 1-100; higher dispatches first
    pub priority: u8,
    pub delay: Duration,
    /// Broker dedup id; a second add with the same id returns the first job
    pub dedup_id: String,
}

/// What the broker decided after a failed delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Job will be redelivered after the given backoff
    Retried { attempt: u32, delay: Duration },
    /// Attempts exhausted; job is terminally failed
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

/// One enqueued job
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub payload: JobPayload,
    pub priority: u8,
    pub attempts: u32,
    pub progress: u8,
}

#[derive(Debug, Clone)]
struct JobEntry {
    job: Job,
    dedup_id: String,
    state: JobState,
    available_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    seq: u64,
}

#[derive(Default)]
struct QueueState {
    entries: HashMap<JobId, JobEntry>,
    dedup: HashMap<String, JobId>,
    paused: bool,
}

/// Broker interface consumed by the executor and workers
#[async_trait]
pub trait JobBroker: Send + Sync {
    async fn add(
        &self,
        queue: QueueName,
        name: &str,
        payload: JobPayload,
        opts: EnqueueOptions,
    ) -> Result<JobId>;

    /// Next dispatchable job, marked active; None when empty, paused or all
    /// delayed
    async fn fetch(&self, queue: QueueName) -> Result<Option<Job>>;

    async fn complete(&self, queue: QueueName, job_id: JobId) -> Result<()>;

    /// Record a failed delivery and decide between redelivery and terminal
    /// failure per the retry policy
    async fn fail(&self, queue: QueueName, job_id: JobId, error: &str) -> Result<RetryOutcome>;

    async fn report_progress(&self, queue: QueueName, job_id: JobId, progress: u8) -> Result<()>;

    async fn stats(&self, queue: QueueName) -> Result<QueueStats>;

    /// Stop dispatching new jobs; in-flight jobs continue
    async fn pause(&self, queue: QueueName) -> Result<()>;

    async fn resume(&self, queue: QueueName) -> Result<()>;

    /// Remove completed/failed entries older than `ttl`, bounded by the
    /// configured retention counts. Returns how many were removed.
    async fn clean(&self, queue: QueueName, ttl: Duration) -> Result<usize>;
}

/// In-memory broker with one logical queue per `QueueName`
pub struct MemoryBroker {
    queues: HashMap<QueueName, Mutex<QueueState>>,
    retry: RetryPolicy,
    retention: RetentionConfig,
    seq: Mutex<u64>,
}

impl MemoryBroker {
    pub fn new(retry: RetryPolicy, retention: RetentionConfig) -> Self {
        let queues = QueueName::ALL
            .into_iter()
            .map(|q| (q, Mutex::new(QueueState::default())))
            .collect();
        Self {
            queues,
            retry,
            retention,
            seq: Mutex::new(0),
        }
    }

    fn queue(&self, queue: QueueName) -> Result<&Mutex<QueueState>> {
        self.queues
            .get(&queue)
            .ok_or_else(|| EngineError::QueueNotFound(queue.to_string()))
    }

    fn next_seq(&self) -> u64 {
        let mut seq = self.seq.lock();
        *seq += 1;
        *seq
    }
}

#[async_trait]
impl JobBroker for MemoryBroker {
    async fn add(
        &self,
        queue: QueueName,
        name: &str,
        payload: JobPayload,
        opts: EnqueueOptions,
    ) -> Result<JobId> {
        let mut state = self.queue(queue)?.lock();

        if let Some(existing) = state.dedup.get(&opts.dedup_id) {
            tracing::debug!(queue = %queue, dedup_id = %opts.dedup_id, "Duplicate add deduplicated");
            return Ok(*existing);
        }

        let id = Uuid::new_v4();
        let entry = JobEntry {
            job: Job {
                id,
                name: name.to_string(),
                payload,
                priority: opts.priority,
                attempts: 0,
                progress: 0,
            },
            dedup_id: opts.dedup_id.clone(),
            state: JobState::Waiting,
            available_at: Utc::now()
                + chrono::Duration::from_std(opts.delay).unwrap_or_else(|_| chrono::Duration::zero()),
            finished_at: None,
            seq: self.next_seq(),
        };
        state.dedup.insert(opts.dedup_id, id);
        state.entries.insert(id, entry);
        Ok(id)
    }

    async fn fetch(&self, queue: QueueName) -> Result<Option<Job>> {
        let mut state = self.queue(queue)?.lock();
        if state.paused {
            return Ok(None);
        }

        let now = Utc::now();
        // Highest priority wins; FIFO within equal priority via seq
        let next = state
            .entries
            .values()
            .filter(|e| e.state == JobState::Waiting && e.available_at <= now)
            .max_by(|a, b| {
                a.job
                    .priority
                    .cmp(&b.job.priority)
                    .then(b.seq.cmp(&a.seq))
            })
            .map(|e| e.job.id);

        match next {
            Some(id) => {
                let entry = state
                    .entries
                    .get_mut(&id)
                    .ok_or_else(|| EngineError::JobNotFound(id.to_string()))?;
                entry.state = JobState::Active;
                entry.job.attempts += 1;
                Ok(Some(entry.job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn complete(&self, queue: QueueName, job_id: JobId) -> Result<()> {
        let mut state = self.queue(queue)?.lock();
        let entry = state
            .entries
            .get_mut(&job_id)
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;
        entry.state = JobState::Completed;
        entry.job.progress = 100;
        entry.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn fail(&self, queue: QueueName, job_id: JobId, error: &str) -> Result<RetryOutcome> {
        let mut state = self.queue(queue)?.lock();
        let entry = state
            .entries
            .get_mut(&job_id)
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;

        let attempts = entry.job.attempts;
        if attempts < self.retry.max_attempts {
            let delay = self.retry.backoff_for(attempts);
            entry.state = JobState::Waiting;
            entry.available_at =
                Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
            tracing::warn!(
                queue = %queue,
                job_id = %job_id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error,
                "Job failed, scheduling redelivery"
            );
            Ok(RetryOutcome::Retried {
                attempt: attempts,
                delay,
            })
        } else {
            entry.state = JobState::Failed;
            entry.finished_at = Some(Utc::now());
            tracing::error!(
                queue = %queue,
                job_id = %job_id,
                attempts,
                error,
                "Job failed terminally, attempts exhausted"
            );
            Ok(RetryOutcome::Exhausted { attempts })
        }
    }

    async fn report_progress(&self, queue: QueueName, job_id: JobId, progress: u8) -> Result<()> {
        let mut state = self.queue(queue)?.lock();
        let entry = state
            .entries
            .get_mut(&job_id)
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;
        entry.job.progress = progress.min(100);
        Ok(())
    }

    async fn stats(&self, queue: QueueName) -> Result<QueueStats> {
        let state = self.queue(queue)?.lock();
        let now = Utc::now();
        let mut stats = QueueStats {
            paused: state.paused,
            ..Default::default()
        };
        for entry in state.entries.values() {
            match entry.state {
                JobState::Waiting if entry.available_at > now => stats.delayed += 1,
                JobState::Waiting => stats.waiting += 1,
                JobState::Active => stats.active += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn pause(&self, queue: QueueName) -> Result<()> {
        self.queue(queue)?.lock().paused = true;
        tracing::info!(queue = %queue, "Queue paused");
        Ok(())
    }

    async fn resume(&self, queue: QueueName) -> Result<()> {
        self.queue(queue)?.lock().paused = false;
        tracing::info!(queue = %queue, "Queue resumed");
        Ok(())
    }

    async fn clean(&self, queue: QueueName, ttl: Duration) -> Result<usize> {
        let mut state = self.queue(queue)?.lock();
        let cutoff = Utc::now() - chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());

        let mut expired: Vec<(JobId, JobState, DateTime<Utc>)> = state
            .entries
            .values()
            .filter_map(|e| match (e.state, e.finished_at) {
                (JobState::Completed | JobState::Failed, Some(at)) if at <= cutoff => {
                    Some((e.job.id, e.state, at))
                }
                _ => None,
            })
            .collect();
        // Oldest first so retention bounds keep the most recent entries
        expired.sort_by_key(|(_, _, at)| *at);

        let mut removed_completed = 0;
        let mut removed_failed = 0;
        let mut removed = 0;
        for (id, job_state, _) in expired {
            let allowed = match job_state {
                JobState::Completed => {
                    removed_completed += 1;
                    removed_completed <= self.retention.completed
                }
                _ => {
                    removed_failed += 1;
                    removed_failed <= self.retention.failed
                }
            };
            if !allowed {
                continue;
            }
            if let Some(entry) = state.entries.remove(&id) {
                state.dedup.remove(&entry.dedup_id);
                removed += 1;
            }
        }
        tracing::info!(queue = %queue, removed, "Queue cleaned");
        Ok(removed)
    }
}
