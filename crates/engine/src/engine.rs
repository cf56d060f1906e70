//! Main workflow engine that orchestrates planning and execution

use crate::catalog::TemplateCatalog;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::executor::PlanExecutor;
use crate::handler::HandlerRegistry;
use crate::matcher;
use crate::persistence::StatusStore;
use crate::planner;
use crate::queue::JobBroker;
use crate::resolver::{DependencyResolver, IntegrationStore, PerformanceDataStore, SiteContextProvider};
use crate::types::{
    ActionId, ActionPolicy, Evidence, ExecutionPlan, ExecutionSummary, JobId, QueueName,
    QueueStats, RunId, TemplateCategory, WorkflowAction, WorkflowTemplate,
};
use crate::worker::{WorkerContext, spawn_queue_pool};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::info;

/// Events emitted by the workflow engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    PlanExecuted {
        idea_id: String,
        queued: usize,
        skipped: usize,
    },
    JobStarted {
        queue: QueueName,
        action_id: ActionId,
        run_id: RunId,
    },
    JobCompleted {
        queue: QueueName,
        action_id: ActionId,
        run_id: RunId,
    },
    JobFailed {
        queue: QueueName,
        action_id: ActionId,
        run_id: RunId,
        error: String,
        will_retry: bool,
    },
}

/// Overrides for single-action enqueueing
#[derive(Debug, Clone, Default)]
pub struct QueueActionOptions {
    /// 1-100; defaults to a mid-band priority
    pub priority: Option<u8>,
    pub delay: Option<Duration>,
}

/// Orchestrator holding the injected broker, store and collaborator clients
pub struct WorkflowEngine {
    catalog: TemplateCatalog,
    resolver: DependencyResolver,
    executor: PlanExecutor,
    broker: Arc<dyn JobBroker>,
    config: EngineConfig,
    event_tx: mpsc::UnboundedSender<EngineEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<EngineEvent>>>,
    shutdown_tx: watch::Sender<bool>,
    pools: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl WorkflowEngine {
    /// Create the engine and start one bounded worker pool per queue.
    ///
    /// Fails when the catalog contains an action type with no queue route, so
    /// routing typos surface at startup instead of at dispatch time.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        catalog: TemplateCatalog,
        broker: Arc<dyn JobBroker>,
        store: Arc<dyn StatusStore>,
        integrations: Arc<dyn IntegrationStore>,
        sites: Arc<dyn SiteContextProvider>,
        performance: Arc<dyn PerformanceDataStore>,
        handlers: HandlerRegistry,
    ) -> Result<Self> {
        for template in catalog.all() {
            for action in &template.actions {
                if QueueName::route(&action.action_type).is_none() {
                    return Err(EngineError::Configuration(format!(
                        "Action type '{}' in template '{}' has no queue route",
                        action.action_type, template.id
                    )));
                }
            }
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctx = Arc::new(WorkerContext {
            broker: broker.clone(),
            store: store.clone(),
            handlers,
            config: config.clone(),
            event_tx: event_tx.clone(),
        });

        let pools: Vec<tokio::task::JoinHandle<()>> = QueueName::ALL
            .into_iter()
            .map(|queue| spawn_queue_pool(queue, ctx.clone(), shutdown_rx.clone()))
            .collect();

        info!(templates = catalog.all().len(), "Workflow engine started");

        Ok(Self {
            catalog,
            resolver: DependencyResolver::new(integrations, sites, performance),
            executor: PlanExecutor::new(broker.clone(), store),
            broker,
            config,
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            shutdown_tx,
            pools: Mutex::new(pools),
        })
    }

    // ========== Matching & catalog ==========

    /// Suggest the best-matching template for an idea, or None
    pub fn suggest_workflow(
        &self,
        title: &str,
        hypothesis: Option<&str>,
        evidence: Option<&Evidence>,
    ) -> Option<WorkflowTemplate> {
        matcher::suggest(self.catalog.all(), title, hypothesis, evidence).cloned()
    }

    /// List templates, optionally filtered by category and search term
    pub fn get_workflow_templates(
        &self,
        category: Option<TemplateCategory>,
        search_term: Option<&str>,
    ) -> Vec<WorkflowTemplate> {
        self.catalog
            .search(category, search_term)
            .into_iter()
            .cloned()
            .collect()
    }

    // ========== Planning & execution ==========

    /// Compute an execution plan for one idea + template.
    ///
    /// Always returns a plan; unmet dependencies surface as blocked actions
    /// and warnings, never as an error.
    pub async fn create_execution_plan(
        &self,
        idea_id: &str,
        template: &WorkflowTemplate,
        user_token: &str,
        site_url: &str,
    ) -> ExecutionPlan {
        let unmet = self
            .resolver
            .unmet(&template.dependencies, user_token, site_url)
            .await;
        planner::build_plan(idea_id, template, &unmet)
    }

    /// Persist and enqueue every unblocked action in the plan
    pub async fn execute_workflow_plan(
        &self,
        plan: &ExecutionPlan,
        user_token: &str,
        site_url: &str,
    ) -> Result<ExecutionSummary> {
        let template = self
            .catalog
            .get(&plan.template_id)
            .ok_or_else(|| EngineError::TemplateNotFound(plan.template_id.clone()))?;

        let summary = self
            .executor
            .execute(plan, template, user_token, site_url)
            .await;
        let _ = self.event_tx.send(EngineEvent::PlanExecuted {
            idea_id: plan.idea_id.clone(),
            queued: summary.action_ids.len(),
            skipped: template.actions.len() - summary.action_ids.len(),
        });
        Ok(summary)
    }

    /// Single-action bypass of full planning
    pub async fn queue_action(
        &self,
        action_id: &str,
        user_token: &str,
        action_type: &str,
        payload: serde_json::Value,
        policy: ActionPolicy,
        options: Option<QueueActionOptions>,
    ) -> Result<JobId> {
        let options = options.unwrap_or_default();
        let action = WorkflowAction {
            id: action_id.to_string(),
            action_type: action_type.to_string(),
            title: action_id.to_string(),
            description: String::new(),
            payload,
            policy,
            order: 1,
            depends_on: Vec::new(),
            parallelizable: true,
            estimated_duration: 0,
        };
        self.executor
            .queue_single(
                &action,
                user_token,
                options.priority.unwrap_or(50),
                options.delay.unwrap_or(Duration::ZERO),
            )
            .await
    }

    // ========== Operational controls ==========

    pub async fn get_queue_stats(&self, queue: QueueName) -> Result<QueueStats> {
        self.broker.stats(queue).await
    }

    pub async fn pause_queue(&self, queue: QueueName) -> Result<()> {
        self.broker.pause(queue).await
    }

    pub async fn resume_queue(&self, queue: QueueName) -> Result<()> {
        self.broker.resume(queue).await
    }

    pub async fn clean_queue(&self, queue: QueueName, ttl: Duration) -> Result<usize> {
        self.broker.clean(queue, ttl).await
    }

    /// Take the engine event stream; available once
    pub fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<EngineEvent>> {
        self.event_rx.lock().take()
    }

    /// Current retry policy configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stop dispatching new jobs and wait for in-flight jobs to drain
    pub async fn shutdown(&self) {
        info!("Shutting down workflow engine");
        let _ = self.shutdown_tx.send(true);
        let pools = std::mem::take(&mut *self.pools.lock());
        for pool in pools {
            let _ = pool.await;
        }
        info!("Workflow engine shutdown complete");
    }
}
