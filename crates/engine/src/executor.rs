//! Plan executor
//!
//! Persists run/action records for every unblocked action in a plan, routes
//! each action to its logical queue and enqueues the job with an idempotency
//! key as the broker dedup id. Per-action failures are isolated: one action's
//! persistence or enqueue failure is logged and skipped, the loop continues.

use crate::error::{EngineError, Result};
use crate::planner::priority_score;
use crate::queue::{EnqueueOptions, JobBroker};
use crate::persistence::StatusStore;
use crate::types::{
    ActionStatus, ExecutionPlan, ExecutionSummary, JobPayload, QueueName, RunRecord,
    WorkflowAction, WorkflowTemplate,
};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

pub struct PlanExecutor {
    broker: Arc<dyn JobBroker>,
    store: Arc<dyn StatusStore>,
}

/// Policy snapshot persisted with each run: the action policy merged with the
/// workflow ordering metadata the worker may need later. Plan-driven runs also
/// record the target site; the single-action bypass has none.
fn policy_snapshot(action: &WorkflowAction, site_url: Option<&str>) -> serde_json::Value {
    let mut snapshot = serde_json::json!({
        "environment": action.policy.environment,
        "requires_approval": action.policy.requires_approval,
        "constraints": action.policy.constraints,
        "workflow_order": action.order,
        "workflow_dependencies": action.depends_on,
        "estimated_duration": action.estimated_duration,
    });
    if let (Some(url), Some(map)) = (site_url, snapshot.as_object_mut()) {
        map.insert("site_url".to_string(), serde_json::json!(url));
    }
    snapshot
}

impl PlanExecutor {
    pub fn new(broker: Arc<dyn JobBroker>, store: Arc<dyn StatusStore>) -> Self {
        Self { broker, store }
    }

    /// Enqueue one action outside of full planning
    pub async fn queue_single(
        &self,
        action: &WorkflowAction,
        user_token: &str,
        priority: u8,
        delay: Duration,
    ) -> Result<crate::types::JobId> {
        let queue = QueueName::route(&action.action_type).ok_or_else(|| {
            EngineError::Validation(format!(
                "No queue route for action type '{}'",
                action.action_type
            ))
        })?;

        let idempotency_key = format!("{}:{}", action.id, Uuid::new_v4());
        let run = RunRecord::queued(
            action.id.clone(),
            idempotency_key.clone(),
            policy_snapshot(action, None),
        );
        let run_id = run.id;
        self.store.create_run(run).await?;
        self.store
            .set_action_status(&action.id, ActionStatus::Queued)
            .await?;

        let payload = JobPayload {
            action_id: action.id.clone(),
            action_type: action.action_type.clone(),
            user_token: user_token.to_string(),
            run_id,
            idempotency_key: idempotency_key.clone(),
            policy: action.policy.clone(),
            payload: action.payload.clone(),
        };
        self.broker
            .add(
                queue,
                &action.action_type,
                payload,
                EnqueueOptions {
                    priority,
                    delay,
                    dedup_id: idempotency_key,
                },
            )
            .await
    }

    /// Execute a plan: persist and enqueue every unblocked template action.
    ///
    /// Returns a summary regardless of per-action failures; the parent idea is
    /// marked adopted after the loop either way.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        template: &WorkflowTemplate,
        user_token: &str,
        site_url: &str,
    ) -> ExecutionSummary {
        let blocked: HashSet<&str> = plan
            .blocked_actions
            .iter()
            .map(|b| b.action_id.as_str())
            .collect();

        // Every plan action starts as proposed; ready ones are promoted to
        // queued below, blocked ones stay proposed until a later re-plan.
        for action in &template.actions {
            if let Err(e) = self
                .store
                .set_action_status(&action.id, ActionStatus::Proposed)
                .await
            {
                warn!(action_id = %action.id, error = %e, "Failed to record proposed action");
            }
        }

        let mut action_ids = Vec::new();
        for action in &template.actions {
            if blocked.contains(action.id.as_str()) {
                continue;
            }
            match self
                .enqueue_action(plan, template, action, user_token, site_url)
                .await
            {
                Ok(()) => action_ids.push(action.id.clone()),
                Err(e) => {
                    // Partial-success: skip this action, keep the siblings
                    warn!(
                        action_id = %action.id,
                        error = %e,
                        "Failed to queue action, skipping"
                    );
                }
            }
        }

        if let Err(e) = self.store.mark_idea_adopted(&plan.idea_id, Utc::now()).await {
            warn!(idea_id = %plan.idea_id, error = %e, "Failed to mark idea adopted");
        }

        let mut message = format!(
            "Queued {} of {} actions from '{}' (est. {} min)",
            action_ids.len(),
            template.actions.len(),
            template.name,
            plan.total_estimated_duration,
        );
        if !plan.warnings.is_empty() {
            message.push_str(&format!(". Warnings: {}", plan.warnings.join("; ")));
        }

        info!(idea_id = %plan.idea_id, queued = action_ids.len(), "Plan executed");
        ExecutionSummary {
            action_ids,
            message,
        }
    }

    async fn enqueue_action(
        &self,
        plan: &ExecutionPlan,
        template: &WorkflowTemplate,
        action: &WorkflowAction,
        user_token: &str,
        site_url: &str,
    ) -> Result<()> {
        let queue = QueueName::route(&action.action_type).ok_or_else(|| {
            EngineError::Validation(format!(
                "No queue route for action type '{}'",
                action.action_type
            ))
        })?;

        // Unique per enqueue attempt; the broker dedups redeliveries by it
        let idempotency_key = format!("{}:{}:{}", plan.idea_id, action.id, Uuid::new_v4());

        let run = RunRecord::queued(
            action.id.clone(),
            idempotency_key.clone(),
            policy_snapshot(action, Some(site_url)),
        );
        let run_id = run.id;
        self.store
            .create_run(run)
            .await
            .map_err(|e| EngineError::ActionCreation(e.to_string()))?;
        self.store
            .set_action_status(&action.id, ActionStatus::Queued)
            .await
            .map_err(|e| EngineError::ActionCreation(e.to_string()))?;

        let payload = JobPayload {
            action_id: action.id.clone(),
            action_type: action.action_type.clone(),
            user_token: user_token.to_string(),
            run_id,
            idempotency_key: idempotency_key.clone(),
            policy: action.policy.clone(),
            payload: action.payload.clone(),
        };

        self.broker
            .add(
                queue,
                &action.action_type,
                payload,
                EnqueueOptions {
                    priority: priority_score(
                        action.order,
                        template.risk_level,
                        action.estimated_duration,
                    ),
                    delay: Duration::ZERO,
                    dedup_id: idempotency_key,
                },
            )
            .await?;
        Ok(())
    }
}
