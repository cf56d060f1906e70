//! Dependency resolver
//!
//! Checks a template's external prerequisites against live site state via
//! injected collaborators.

use crate::types::{DependencyKind, WorkflowDependency};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::warn;

/// Third-party connection lookups for (user, site)
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    async fn has_active_connection(&self, user_token: &str, site_url: &str)
    -> anyhow::Result<bool>;
}

/// Site-context lookups (managed flag)
#[async_trait]
pub trait SiteContextProvider: Send + Sync {
    async fn is_managed(&self, user_token: &str, site_url: &str) -> anyhow::Result<bool>;
}

/// Performance-data existence checks over a date range
#[async_trait]
pub trait PerformanceDataStore: Send + Sync {
    async fn has_rows_since(
        &self,
        site_url: &str,
        since: chrono::DateTime<Utc>,
    ) -> anyhow::Result<bool>;
}

/// Trailing window a `data` dependency looks back over
const PERFORMANCE_WINDOW_DAYS: i64 = 90;

/// Resolves template dependencies against injected collaborators
pub struct DependencyResolver {
    integrations: Arc<dyn IntegrationStore>,
    sites: Arc<dyn SiteContextProvider>,
    performance: Arc<dyn PerformanceDataStore>,
}

impl DependencyResolver {
    pub fn new(
        integrations: Arc<dyn IntegrationStore>,
        sites: Arc<dyn SiteContextProvider>,
        performance: Arc<dyn PerformanceDataStore>,
    ) -> Self {
        Self {
            integrations,
            sites,
            performance,
        }
    }

    /// Whether a single dependency is satisfied.
    ///
    /// A collaborator error does not hard-fail the check: the result is
    /// `dependency.optional`, so optional dependencies fail open and required
    /// ones count as missing.
    pub async fn is_satisfied(
        &self,
        dependency: &WorkflowDependency,
        user_token: &str,
        site_url: &str,
    ) -> bool {
        let checked = match dependency.kind {
            DependencyKind::Integration => {
                self.integrations
                    .has_active_connection(user_token, site_url)
                    .await
            }
            DependencyKind::Permission => self.sites.is_managed(user_token, site_url).await,
            DependencyKind::Data => {
                let since = Utc::now() - Duration::days(PERFORMANCE_WINDOW_DAYS);
                self.performance.has_rows_since(site_url, since).await
            }
        };

        match checked {
            Ok(satisfied) => satisfied,
            Err(e) => {
                warn!(
                    requirement = %dependency.requirement,
                    error = %e,
                    "Dependency check failed, treating as optional={}",
                    dependency.optional
                );
                dependency.optional
            }
        }
    }

    /// Return the subset of dependencies that are not satisfied
    pub async fn unmet(
        &self,
        dependencies: &[WorkflowDependency],
        user_token: &str,
        site_url: &str,
    ) -> Vec<WorkflowDependency> {
        let mut missing = Vec::new();
        for dependency in dependencies {
            if !self.is_satisfied(dependency, user_token, site_url).await {
                missing.push(dependency.clone());
            }
        }
        missing
    }
}
