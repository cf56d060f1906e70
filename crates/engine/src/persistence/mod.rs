//! Run and action persistence
//!
//! The engine only depends on the `StatusStore` trait; the in-memory
//! implementation backs tests and embedded use. Runs are never deleted by the
//! engine, and each row is mutated only by the worker owning its job, so no
//! cross-row locking is needed beyond the store's own maps.

use crate::error::{EngineError, Result};
use crate::types::{ActionId, ActionStatus, RunId, RunRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Durable store for run/action records and idea adoption marks
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn create_run(&self, run: RunRecord) -> Result<()>;
    async fn update_run(&self, run: &RunRecord) -> Result<()>;
    async fn get_run(&self, run_id: &RunId) -> Result<Option<RunRecord>>;
    /// Lookup by idempotency key, used to verify dedup behaviour
    async fn run_for_key(&self, idempotency_key: &str) -> Result<Option<RunRecord>>;
    async fn runs_for_action(&self, action_id: &str) -> Result<Vec<RunRecord>>;

    async fn set_action_status(&self, action_id: &str, status: ActionStatus) -> Result<()>;
    async fn get_action_status(&self, action_id: &str) -> Result<Option<ActionStatus>>;

    async fn mark_idea_adopted(&self, idea_id: &str, at: DateTime<Utc>) -> Result<()>;
    async fn idea_adopted_at(&self, idea_id: &str) -> Result<Option<DateTime<Utc>>>;
}

/// In-memory status store
#[derive(Default)]
pub struct MemoryStatusStore {
    runs: RwLock<HashMap<RunId, RunRecord>>,
    actions: RwLock<HashMap<ActionId, ActionStatus>>,
    adopted: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn create_run(&self, run: RunRecord) -> Result<()> {
        self.runs.write().insert(run.id, run);
        Ok(())
    }

    async fn update_run(&self, run: &RunRecord) -> Result<()> {
        let mut runs = self.runs.write();
        if !runs.contains_key(&run.id) {
            return Err(EngineError::RunNotFound(run.id.to_string()));
        }
        runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: &RunId) -> Result<Option<RunRecord>> {
        Ok(self.runs.read().get(run_id).cloned())
    }

    async fn run_for_key(&self, idempotency_key: &str) -> Result<Option<RunRecord>> {
        Ok(self
            .runs
            .read()
            .values()
            .find(|r| r.idempotency_key == idempotency_key)
            .cloned())
    }

    async fn runs_for_action(&self, action_id: &str) -> Result<Vec<RunRecord>> {
        Ok(self
            .runs
            .read()
            .values()
            .filter(|r| r.action_id == action_id)
            .cloned()
            .collect())
    }

    async fn set_action_status(&self, action_id: &str, status: ActionStatus) -> Result<()> {
        self.actions.write().insert(action_id.to_string(), status);
        Ok(())
    }

    async fn get_action_status(&self, action_id: &str) -> Result<Option<ActionStatus>> {
        Ok(self.actions.read().get(action_id).copied())
    }

    async fn mark_idea_adopted(&self, idea_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.adopted.write().insert(idea_id.to_string(), at);
        Ok(())
    }

    async fn idea_adopted_at(&self, idea_id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.adopted.read().get(idea_id).copied())
    }
}
