use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a workflow template
pub type TemplateId = String;

/// Unique identifier for an action within a template
pub type ActionId = String;

/// Unique identifier for a queued job
pub type JobId = Uuid;

/// Unique identifier for a run record
pub type RunId = Uuid;

/// Risk classification of a workflow template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Category a template belongs to, used for matching and search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateCategory {
    Setup,
    Technical,
    Content,
}

/// Execution environment for an action policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Environment {
    DryRun,
    Staging,
    Production,
}

/// Policy attached to an action, snapshotted into each run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPolicy {
    pub environment: Environment,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub constraints: HashMap<String, serde_json::Value>,
}

impl ActionPolicy {
    pub fn dry_run() -> Self {
        Self {
            environment: Environment::DryRun,
            requires_approval: false,
            constraints: HashMap::new(),
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            requires_approval: false,
            constraints: HashMap::new(),
        }
    }
}

/// One unit of work in a workflow template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowAction {
    pub id: ActionId,
    pub action_type: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub policy: ActionPolicy,
    /// Stage number; actions with equal order may share a batch
    pub order: u32,
    /// Sibling action ids that must be ready before this one
    #[serde(default)]
    pub depends_on: Vec<ActionId>,
    pub parallelizable: bool,
    /// Estimated duration in minutes
    pub estimated_duration: u32,
}

/// Kind of external prerequisite a template declares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Integration,
    Permission,
    Data,
}

/// External prerequisite for a workflow template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDependency {
    pub kind: DependencyKind,
    pub requirement: String,
    #[serde(default)]
    pub optional: bool,
}

/// Static multi-action procedure definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: TemplateId,
    pub name: String,
    pub description: String,
    pub category: TemplateCategory,
    pub triggers: Vec<String>,
    /// Estimated total duration in minutes
    pub estimated_duration: u32,
    pub risk_level: RiskLevel,
    pub actions: Vec<WorkflowAction>,
    #[serde(default)]
    pub dependencies: Vec<WorkflowDependency>,
}

/// Evidence signals supplied alongside an idea for matching
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evidence {
    pub site_age: Option<String>,
    pub has_technical_issues: Option<bool>,
    pub content_performance: Option<String>,
}

/// An action that cannot be dispatched, with the reason why
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedAction {
    pub action_id: ActionId,
    pub reason: String,
    pub missing: Vec<String>,
}

/// Computed execution artifact for one idea + template
///
/// Batches in `execution_order` are a planning-time grouping only. All ready
/// actions are enqueued together at execute time; a later batch is not gated
/// on the completion of an earlier batch's jobs, only on the pre-execution
/// blocked classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub idea_id: String,
    pub template_id: TemplateId,
    /// Ordered batches; each batch lists actions dispatchable together
    pub execution_order: Vec<Vec<ActionId>>,
    pub ready_actions: Vec<ActionId>,
    pub blocked_actions: Vec<BlockedAction>,
    pub warnings: Vec<String>,
    /// Minutes, assuming parallel completion within a batch
    pub total_estimated_duration: u32,
}

/// Status of a persisted run record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// Status of a persisted action record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Proposed,
    Queued,
    Running,
    /// Terminal-pending: success awaiting external verification
    NeedsVerification,
    Failed,
}

/// Effect statistics reported by a handler
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerStats {
    pub patches_applied: u64,
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
}

impl HandlerStats {
    /// Zero-effect stats for simulated executions
    pub fn simulated() -> Self {
        let mut details = HashMap::new();
        details.insert("simulated".to_string(), serde_json::json!(true));
        Self {
            patches_applied: 0,
            details,
        }
    }
}

/// Persisted execution-attempt record for one action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub action_id: ActionId,
    pub idempotency_key: String,
    /// Policy snapshot merged with workflow ordering metadata
    pub policy: serde_json::Value,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stats: Option<HandlerStats>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn queued(action_id: ActionId, idempotency_key: String, policy: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_id,
            idempotency_key,
            policy,
            status: RunStatus::Queued,
            started_at: None,
            completed_at: None,
            stats: None,
            error: None,
            created_at: Utc::now(),
        }
    }
}

/// Logical queue an action is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueName {
    AgentActions,
    ContentGeneration,
    TechnicalSeo,
    CmsPublishing,
    Verification,
}

impl QueueName {
    pub const ALL: [QueueName; 5] = [
        QueueName::AgentActions,
        QueueName::ContentGeneration,
        QueueName::TechnicalSeo,
        QueueName::CmsPublishing,
        QueueName::Verification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::AgentActions => "agent-actions",
            QueueName::ContentGeneration => "content-generation",
            QueueName::TechnicalSeo => "technical-seo",
            QueueName::CmsPublishing => "cms-publishing",
            QueueName::Verification => "verification",
        }
    }

    /// Explicit action-type routing table, validated at engine startup so a
    /// typo fails construction instead of silently landing on a default queue.
    pub fn route(action_type: &str) -> Option<QueueName> {
        match action_type {
            "content_gap_analysis" | "generate_content_brief" | "generate_article"
            | "content_refresh" => Some(QueueName::ContentGeneration),
            "baseline_technical_audit" | "technical_crawl_audit" | "apply_technical_fixes"
            | "schema_markup_update" => Some(QueueName::TechnicalSeo),
            "connect_cms" | "publish_cms_draft" | "cms_sync" => Some(QueueName::CmsPublishing),
            "verify_setup" | "verify_technical_fixes" | "verify_content_health" => {
                Some(QueueName::Verification)
            }
            "register_site_profile" | "agent_followup" => Some(QueueName::AgentActions),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload enqueued for one action execution attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub action_id: ActionId,
    pub action_type: String,
    pub user_token: String,
    pub run_id: RunId,
    pub idempotency_key: String,
    pub policy: ActionPolicy,
    pub payload: serde_json::Value,
}

/// Result of executing a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub action_ids: Vec<ActionId>,
    pub message: String,
}

/// Per-queue counters surfaced via operational controls
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub delayed: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub paused: bool,
}
