use async_trait::async_trait;
use ranklift_engine::{
    ActionHandler, ActionPolicy, ActionStatus, DependencyKind, EngineConfig, EngineError,
    Environment, HandlerRegistry, HandlerStats, IntegrationStore, JobPayload, MemoryBroker,
    MemoryStatusStore, PerformanceDataStore, QueueName, RetentionConfig, RetryPolicy, RiskLevel,
    RunId, RunRecord, RunStatus, SiteContextProvider, StatusStore, TemplateCatalog,
    TemplateCategory, WorkflowAction, WorkflowDependency, WorkflowEngine, WorkflowTemplate,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct StubSite;

#[async_trait]
impl SiteContextProvider for StubSite {
    async fn is_managed(&self, _: &str, _: &str) -> anyhow::Result<bool> {
        Ok(true)
    }
}

struct StubPerformance;

#[async_trait]
impl PerformanceDataStore for StubPerformance {
    async fn has_rows_since(
        &self,
        _: &str,
        _: chrono::DateTime<chrono::Utc>,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }
}

struct StubIntegrations(bool);

#[async_trait]
impl IntegrationStore for StubIntegrations {
    async fn has_active_connection(&self, _: &str, _: &str) -> anyhow::Result<bool> {
        Ok(self.0)
    }
}

/// Counts invocations; fails while `fail_first` has budget left
struct CountingHandler {
    calls: Arc<AtomicUsize>,
    fail_first: usize,
}

#[async_trait]
impl ActionHandler for CountingHandler {
    async fn execute(&self, _job: &JobPayload) -> anyhow::Result<HandlerStats> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            anyhow::bail!("transient failure {call}");
        }
        Ok(HandlerStats {
            patches_applied: 3,
            ..Default::default()
        })
    }
}

fn action(id: &str, action_type: &str, order: u32, environment: Environment) -> WorkflowAction {
    WorkflowAction {
        id: id.to_string(),
        action_type: action_type.to_string(),
        title: id.to_string(),
        description: String::new(),
        payload: serde_json::json!({}),
        policy: ActionPolicy {
            environment,
            requires_approval: false,
            constraints: Default::default(),
        },
        order,
        depends_on: Vec::new(),
        parallelizable: true,
        estimated_duration: 5,
    }
}

fn test_template(environment: Environment) -> WorkflowTemplate {
    WorkflowTemplate {
        id: "test-flow".to_string(),
        name: "Test Flow".to_string(),
        description: "content test flow".to_string(),
        category: TemplateCategory::Content,
        triggers: vec!["content".to_string()],
        estimated_duration: 15,
        risk_level: RiskLevel::Low,
        actions: vec![
            action("a-brief", "generate_content_brief", 1, environment),
            action("a-article", "generate_article", 1, environment),
            action("a-publish", "publish_cms_draft", 2, environment),
        ],
        dependencies: vec![WorkflowDependency {
            kind: DependencyKind::Integration,
            requirement: "cms_connection".to_string(),
            optional: false,
        }],
    }
}

fn fast_config() -> EngineConfig {
    EngineConfig::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_dry_run_delay(Duration::from_millis(10))
        .with_retry(RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(10),
        })
}

struct Harness {
    engine: WorkflowEngine,
    store: Arc<MemoryStatusStore>,
    calls: Arc<AtomicUsize>,
}

fn harness(environment: Environment, cms_connected: bool, fail_first: usize) -> Harness {
    let _ = tracing_subscriber::fmt::try_init();

    let config = fast_config();
    let store = Arc::new(MemoryStatusStore::new());
    let broker = Arc::new(MemoryBroker::new(config.retry, RetentionConfig::default()));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handlers = HandlerRegistry::new();
    for action_type in [
        "generate_content_brief",
        "generate_article",
        "publish_cms_draft",
    ] {
        handlers.register(
            action_type,
            Arc::new(CountingHandler {
                calls: calls.clone(),
                fail_first,
            }),
        );
    }

    let catalog = TemplateCatalog::new(vec![test_template(environment)]).unwrap();
    let engine = WorkflowEngine::new(
        config,
        catalog,
        broker,
        store.clone(),
        Arc::new(StubIntegrations(cms_connected)),
        Arc::new(StubSite),
        Arc::new(StubPerformance),
        handlers,
    )
    .unwrap();

    Harness {
        engine,
        store,
        calls,
    }
}

#[tokio::test]
async fn blocked_actions_are_skipped_and_ready_actions_get_runs() {
    let h = harness(Environment::DryRun, false, 0);
    let template = h.engine.suggest_workflow("content refresh", None, None).unwrap();

    let plan = h
        .engine
        .create_execution_plan("idea-1", &template, "user", "https://example.com")
        .await;

    // cms_connection is down: publish is blocked, brief and article are ready
    assert_eq!(plan.ready_actions.len(), 2);
    assert_eq!(plan.blocked_actions.len(), 1);
    assert_eq!(plan.blocked_actions[0].action_id, "a-publish");

    let summary = h
        .engine
        .execute_workflow_plan(&plan, "user", "https://example.com")
        .await
        .unwrap();
    assert_eq!(summary.action_ids.len(), 2);

    // The blocked action was proposed but never promoted to queued
    assert_eq!(
        h.store.get_action_status("a-publish").await.unwrap(),
        Some(ActionStatus::Proposed)
    );

    let brief_runs = h.store.runs_for_action("a-brief").await.unwrap();
    let article_runs = h.store.runs_for_action("a-article").await.unwrap();
    let publish_runs = h.store.runs_for_action("a-publish").await.unwrap();
    assert_eq!(brief_runs.len(), 1);
    assert_eq!(article_runs.len(), 1);
    assert!(publish_runs.is_empty());

    assert!(
        h.store
            .idea_adopted_at("idea-1")
            .await
            .unwrap()
            .is_some()
    );

    h.engine.shutdown().await;
}

#[tokio::test]
async fn dry_run_simulates_without_invoking_handlers() {
    let h = harness(Environment::DryRun, true, 0);
    let template = h.engine.suggest_workflow("content refresh", None, None).unwrap();

    let plan = h
        .engine
        .create_execution_plan("idea-2", &template, "user", "https://example.com")
        .await;
    assert!(plan.blocked_actions.is_empty());

    let summary = h
        .engine
        .execute_workflow_plan(&plan, "user", "https://example.com")
        .await
        .unwrap();
    assert_eq!(summary.action_ids.len(), 3);

    tokio::time::sleep(Duration::from_millis(300)).await;

    for action_id in ["a-brief", "a-article", "a-publish"] {
        let runs = h.store.runs_for_action(action_id).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Succeeded);
        assert_eq!(runs[0].stats.as_ref().unwrap().patches_applied, 0);
        assert_eq!(
            h.store.get_action_status(action_id).await.unwrap(),
            Some(ActionStatus::NeedsVerification)
        );
    }

    // The production handlers were never touched
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);

    h.engine.shutdown().await;
}

#[tokio::test]
async fn production_success_reports_handler_stats() {
    let h = harness(Environment::Production, true, 0);
    let template = h.engine.suggest_workflow("content refresh", None, None).unwrap();

    let plan = h
        .engine
        .create_execution_plan("idea-3", &template, "user", "https://example.com")
        .await;
    h.engine
        .execute_workflow_plan(&plan, "user", "https://example.com")
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    let runs = h.store.runs_for_action("a-article").await.unwrap();
    assert_eq!(runs[0].status, RunStatus::Succeeded);
    assert_eq!(runs[0].stats.as_ref().unwrap().patches_applied, 3);
    assert_eq!(
        h.store.get_action_status("a-article").await.unwrap(),
        Some(ActionStatus::NeedsVerification)
    );
    assert_eq!(h.calls.load(Ordering::SeqCst), 3);

    h.engine.shutdown().await;
}

#[tokio::test]
async fn failed_handler_is_retried_on_the_same_run_row() {
    let h = harness(Environment::Production, true, 1);

    // Single-action bypass straight onto the content queue
    h.engine
        .queue_action(
            "solo-article",
            "user",
            "generate_article",
            serde_json::json!({"topic": "retries"}),
            ActionPolicy::production(),
            None,
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;

    // First delivery failed, second succeeded; both reused one run row
    assert_eq!(h.calls.load(Ordering::SeqCst), 2);
    let runs = h.store.runs_for_action("solo-article").await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Succeeded);
    assert_eq!(
        h.store.get_action_status("solo-article").await.unwrap(),
        Some(ActionStatus::NeedsVerification)
    );

    h.engine.shutdown().await;
}

#[tokio::test]
async fn exhausted_retries_leave_run_and_action_failed() {
    let h = harness(Environment::Production, true, usize::MAX);

    h.engine
        .queue_action(
            "doomed-article",
            "user",
            "generate_article",
            serde_json::json!({}),
            ActionPolicy::production(),
            None,
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(800)).await;

    // 3 attempts, then terminal failure visible via stats, never dropped
    assert_eq!(h.calls.load(Ordering::SeqCst), 3);
    let runs = h.store.runs_for_action("doomed-article").await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].error.is_some());
    assert_eq!(
        h.store.get_action_status("doomed-article").await.unwrap(),
        Some(ActionStatus::Failed)
    );
    let stats = h
        .engine
        .get_queue_stats(QueueName::ContentGeneration)
        .await
        .unwrap();
    assert_eq!(stats.failed, 1);

    h.engine.shutdown().await;
}

/// Delegates to an in-memory store but loses every run lookup
struct BrokenRunStore {
    inner: MemoryStatusStore,
}

#[async_trait]
impl StatusStore for BrokenRunStore {
    async fn create_run(&self, run: RunRecord) -> ranklift_engine::Result<()> {
        self.inner.create_run(run).await
    }

    async fn update_run(&self, run: &RunRecord) -> ranklift_engine::Result<()> {
        self.inner.update_run(run).await
    }

    async fn get_run(&self, _: &RunId) -> ranklift_engine::Result<Option<RunRecord>> {
        Err(EngineError::Storage("connection reset".to_string()))
    }

    async fn run_for_key(&self, key: &str) -> ranklift_engine::Result<Option<RunRecord>> {
        self.inner.run_for_key(key).await
    }

    async fn runs_for_action(&self, action_id: &str) -> ranklift_engine::Result<Vec<RunRecord>> {
        self.inner.runs_for_action(action_id).await
    }

    async fn set_action_status(
        &self,
        action_id: &str,
        status: ActionStatus,
    ) -> ranklift_engine::Result<()> {
        self.inner.set_action_status(action_id, status).await
    }

    async fn get_action_status(
        &self,
        action_id: &str,
    ) -> ranklift_engine::Result<Option<ActionStatus>> {
        self.inner.get_action_status(action_id).await
    }

    async fn mark_idea_adopted(
        &self,
        idea_id: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) -> ranklift_engine::Result<()> {
        self.inner.mark_idea_adopted(idea_id, at).await
    }

    async fn idea_adopted_at(
        &self,
        idea_id: &str,
    ) -> ranklift_engine::Result<Option<chrono::DateTime<chrono::Utc>>> {
        self.inner.idea_adopted_at(idea_id).await
    }
}

#[tokio::test]
async fn store_outage_returns_job_to_broker_retry_policy() {
    let _ = tracing_subscriber::fmt::try_init();

    let config = fast_config();
    let broker = Arc::new(MemoryBroker::new(config.retry, RetentionConfig::default()));
    let calls = Arc::new(AtomicUsize::new(0));
    let mut handlers = HandlerRegistry::new();
    handlers.register(
        "generate_article",
        Arc::new(CountingHandler {
            calls: calls.clone(),
            fail_first: 0,
        }),
    );

    let catalog = TemplateCatalog::new(vec![test_template(Environment::Production)]).unwrap();
    let engine = WorkflowEngine::new(
        config,
        catalog,
        broker,
        Arc::new(BrokenRunStore {
            inner: MemoryStatusStore::new(),
        }),
        Arc::new(StubIntegrations(true)),
        Arc::new(StubSite),
        Arc::new(StubPerformance),
        handlers,
    )
    .unwrap();

    engine
        .queue_action(
            "orphaned-article",
            "user",
            "generate_article",
            serde_json::json!({}),
            ActionPolicy::production(),
            None,
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(800)).await;

    // Every delivery hit the outage before reaching the handler, and the
    // broker still drove the job through retries to a visible terminal failure
    // instead of leaving it active
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let stats = engine
        .get_queue_stats(QueueName::ContentGeneration)
        .await
        .unwrap();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.failed, 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn paused_queue_defers_execution_until_resume() {
    let h = harness(Environment::DryRun, true, 0);
    h.engine.pause_queue(QueueName::ContentGeneration).await.unwrap();

    h.engine
        .queue_action(
            "paused-article",
            "user",
            "generate_article",
            serde_json::json!({}),
            ActionPolicy::dry_run(),
            None,
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let runs = h.store.runs_for_action("paused-article").await.unwrap();
    assert_eq!(runs[0].status, RunStatus::Queued);

    h.engine.resume_queue(QueueName::ContentGeneration).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let runs = h.store.runs_for_action("paused-article").await.unwrap();
    assert_eq!(runs[0].status, RunStatus::Succeeded);

    h.engine.shutdown().await;
}

#[tokio::test]
async fn engine_events_cover_the_job_lifecycle() {
    let h = harness(Environment::DryRun, true, 0);
    let mut events = h.engine.subscribe().unwrap();

    h.engine
        .queue_action(
            "observed-article",
            "user",
            "generate_article",
            serde_json::json!({}),
            ActionPolicy::dry_run(),
            None,
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    h.engine.shutdown().await;

    let mut saw_started = false;
    let mut saw_completed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            ranklift_engine::EngineEvent::JobStarted { action_id, .. } => {
                saw_started = saw_started || action_id == "observed-article";
            }
            ranklift_engine::EngineEvent::JobCompleted { action_id, .. } => {
                saw_completed = saw_completed || action_id == "observed-article";
            }
            _ => {}
        }
    }
    assert!(saw_started);
    assert!(saw_completed);
}
