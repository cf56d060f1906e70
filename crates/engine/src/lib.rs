//! Workflow orchestration and execution engine
//!
//! Turns declarative multi-step workflow templates into dependency-checked
//! execution plans, then drives execution through a durable, concurrent,
//! retryable job queue with environment-gated policies.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod handler;
pub mod matcher;
pub mod persistence;
pub mod planner;
pub mod queue;
pub mod resolver;
pub mod types;
mod worker;

pub use catalog::TemplateCatalog;
pub use config::{EngineConfig, RetentionConfig, RetryPolicy};
pub use engine::{EngineEvent, QueueActionOptions, WorkflowEngine};
pub use error::{EngineError, Result};
pub use handler::{ActionHandler, HandlerRegistry};
pub use persistence::{MemoryStatusStore, StatusStore};
pub use queue::{EnqueueOptions, Job, JobBroker, MemoryBroker, RetryOutcome};
pub use resolver::{
    DependencyResolver, IntegrationStore, PerformanceDataStore, SiteContextProvider,
};
pub use types::{
    ActionPolicy, ActionStatus, BlockedAction, DependencyKind, Environment, Evidence,
    ExecutionPlan, ExecutionSummary, HandlerStats, JobPayload, QueueName, QueueStats, RiskLevel,
    RunId, RunRecord, RunStatus, TemplateCategory, WorkflowAction, WorkflowDependency,
    WorkflowTemplate,
};
