//! Action handlers
//!
//! Production effects live behind the `ActionHandler` trait, keyed by action
//! type. Handlers are external collaborators; the engine only dispatches to
//! them and records their reported stats.

use crate::types::{HandlerStats, JobPayload};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Executes the production effect for one action type
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, job: &JobPayload) -> anyhow::Result<HandlerStats>;
}

/// Registry of handlers keyed by action type
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action_type: &str, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(action_type.to_string(), handler);
    }

    pub fn get(&self, action_type: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(action_type).cloned()
    }
}
