//! Job executors
//!
//! One bounded worker pool per logical queue. Each pool polls its queue,
//! enforces the action policy (dry-run simulation vs. production handler
//! dispatch), drives run/action state transitions and hands failures back to
//! the broker so its retry policy governs redelivery.

use crate::config::EngineConfig;
use crate::engine::EngineEvent;
use crate::error::{EngineError, Result};
use crate::handler::HandlerRegistry;
use crate::persistence::StatusStore;
use crate::queue::{Job, JobBroker, RetryOutcome};
use crate::types::{ActionStatus, Environment, HandlerStats, QueueName, RunStatus};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::time::{interval, sleep, timeout};
use tracing::{debug, error, info};

/// Shared dependencies for all queue pools
pub(crate) struct WorkerContext {
    pub broker: Arc<dyn JobBroker>,
    pub store: Arc<dyn StatusStore>,
    pub handlers: HandlerRegistry,
    pub config: EngineConfig,
    pub event_tx: mpsc::UnboundedSender<EngineEvent>,
}

/// Spawn the bounded worker pool for one queue.
///
/// A semaphore caps in-flight jobs at the queue's configured concurrency; the
/// dispatch loop polls while permits are available and stops taking new work
/// on shutdown, letting in-flight jobs drain.
pub(crate) fn spawn_queue_pool(
    queue: QueueName,
    ctx: Arc<WorkerContext>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let limit = ctx.config.concurrency_for(queue);
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut poll = interval(ctx.config.poll_interval);

        info!(queue = %queue, concurrency = limit, "Queue workers started");

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    loop {
                        let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                            break;
                        };
                        match ctx.broker.fetch(queue).await {
                            Ok(Some(job)) => {
                                let ctx = ctx.clone();
                                tokio::spawn(async move {
                                    let _permit = permit;
                                    process_job(queue, &ctx, job).await;
                                });
                            }
                            Ok(None) => break,
                            Err(e) => {
                                error!(queue = %queue, error = %e, "Failed to fetch job");
                                break;
                            }
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!(queue = %queue, "Queue pool stopping dispatch");
                        break;
                    }
                }
            }
        }

        // Wait for in-flight jobs to finish
        let _ = semaphore.acquire_many(limit as u32).await;
        info!(queue = %queue, "Queue workers stopped");
    })
}

/// Run one delivery; a bookkeeping error (store unavailable mid-delivery) is
/// handed back to the broker like a handler failure so the job re-enters the
/// retry policy instead of staying active forever.
async fn process_job(queue: QueueName, ctx: &WorkerContext, job: Job) {
    let action_id = job.payload.action_id.clone();
    if let Err(e) = run_job(queue, ctx, &job).await {
        error!(queue = %queue, action_id = %action_id, error = %e, "Job processing failed");
        match ctx.broker.fail(queue, job.id, &e.to_string()).await {
            Ok(retry) => {
                let _ = ctx.event_tx.send(EngineEvent::JobFailed {
                    queue,
                    action_id,
                    run_id: job.payload.run_id,
                    error: e.to_string(),
                    will_retry: matches!(retry, RetryOutcome::Retried { .. }),
                });
            }
            Err(fail_err) => {
                error!(
                    queue = %queue,
                    job_id = %job.id,
                    error = %fail_err,
                    "Failed to return job to the broker"
                );
            }
        }
    }
}

/// Drive one delivery of a job through the run/action state machines.
///
/// Run: queued -> running -> {succeeded | failed}. Action: queued -> running
/// -> {needs_verification | failed}. A retried delivery re-enters running on
/// the same run row.
async fn run_job(queue: QueueName, ctx: &WorkerContext, job: &Job) -> Result<()> {
    let mut run = ctx
        .store
        .get_run(&job.payload.run_id)
        .await?
        .ok_or_else(|| EngineError::RunNotFound(job.payload.run_id.to_string()))?;

    run.status = RunStatus::Running;
    run.started_at = Some(Utc::now());
    run.error = None;
    ctx.store.update_run(&run).await?;
    ctx.store
        .set_action_status(&job.payload.action_id, ActionStatus::Running)
        .await?;
    let _ = ctx.event_tx.send(EngineEvent::JobStarted {
        queue,
        action_id: job.payload.action_id.clone(),
        run_id: run.id,
    });
    ctx.broker.report_progress(queue, job.id, 25).await?;

    let started = Instant::now();
    let outcome = execute_policy(queue, ctx, job).await;

    match outcome {
        Ok(stats) => {
            run.status = RunStatus::Succeeded;
            run.completed_at = Some(Utc::now());
            run.stats = Some(stats);
            ctx.store.update_run(&run).await?;
            // Success still awaits external verification, not "completed"
            ctx.store
                .set_action_status(&job.payload.action_id, ActionStatus::NeedsVerification)
                .await?;
            ctx.broker.report_progress(queue, job.id, 100).await?;
            ctx.broker.complete(queue, job.id).await?;
            let _ = ctx.event_tx.send(EngineEvent::JobCompleted {
                queue,
                action_id: job.payload.action_id.clone(),
                run_id: run.id,
            });
            debug!(queue = %queue, action_id = %job.payload.action_id, "Job succeeded");
        }
        Err(e) => {
            run.status = RunStatus::Failed;
            run.completed_at = Some(Utc::now());
            run.error = Some(format!(
                "{} (after {}ms)",
                e,
                started.elapsed().as_millis()
            ));
            ctx.store.update_run(&run).await?;
            ctx.store
                .set_action_status(&job.payload.action_id, ActionStatus::Failed)
                .await?;

            // Hand the failure back so the broker's retry policy decides
            let retry = ctx.broker.fail(queue, job.id, &e.to_string()).await?;
            let will_retry = matches!(retry, RetryOutcome::Retried { .. });
            let _ = ctx.event_tx.send(EngineEvent::JobFailed {
                queue,
                action_id: job.payload.action_id.clone(),
                run_id: run.id,
                error: e.to_string(),
                will_retry,
            });
        }
    }

    Ok(())
}

/// Apply the policy gate: dry runs simulate with a fixed delay and zero-effect
/// stats and never touch the production handler; everything else dispatches to
/// the registered handler under the configured execution budget.
async fn execute_policy(queue: QueueName, ctx: &WorkerContext, job: &Job) -> Result<HandlerStats> {
    if job.payload.policy.environment == Environment::DryRun {
        sleep(ctx.config.dry_run_delay).await;
        ctx.broker.report_progress(queue, job.id, 50).await?;
        return Ok(HandlerStats::simulated());
    }

    let handler = ctx
        .handlers
        .get(&job.payload.action_type)
        .ok_or_else(|| EngineError::Handler {
            action_type: job.payload.action_type.clone(),
            message: "no handler registered".to_string(),
        })?;

    ctx.broker.report_progress(queue, job.id, 50).await?;
    match timeout(ctx.config.handler_timeout, handler.execute(&job.payload)).await {
        Ok(Ok(stats)) => Ok(stats),
        Ok(Err(e)) => Err(EngineError::Handler {
            action_type: job.payload.action_type.clone(),
            message: e.to_string(),
        }),
        Err(_) => Err(EngineError::HandlerTimeout {
            action_type: job.payload.action_type.clone(),
            timeout_ms: ctx.config.handler_timeout.as_millis() as u64,
        }),
    }
}
