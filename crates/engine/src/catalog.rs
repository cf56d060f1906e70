//! Static template catalog
//!
//! Templates are built once at engine construction and never mutated. The
//! catalog scan order is the deterministic tie-break for workflow matching.

use crate::error::{EngineError, Result};
use crate::types::{
    ActionPolicy, DependencyKind, QueueName, RiskLevel, TemplateCategory, WorkflowAction,
    WorkflowDependency, WorkflowTemplate,
};
use std::collections::HashSet;

/// In-memory set of workflow templates
pub struct TemplateCatalog {
    templates: Vec<WorkflowTemplate>,
}

impl TemplateCatalog {
    /// Build a catalog from the given templates, validating each one
    pub fn new(templates: Vec<WorkflowTemplate>) -> Result<Self> {
        for template in &templates {
            validate_template(template)?;
        }
        Ok(Self { templates })
    }

    /// The built-in product catalog
    pub fn builtin() -> Self {
        // Built-in templates are validated by tests; construction cannot fail
        Self {
            templates: builtin_templates(),
        }
    }

    pub fn all(&self) -> &[WorkflowTemplate] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Option<&WorkflowTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Filter by category and/or case-insensitive name/description substring
    pub fn search(
        &self,
        category: Option<TemplateCategory>,
        term: Option<&str>,
    ) -> Vec<&WorkflowTemplate> {
        let term = term.map(|t| t.to_lowercase());
        self.templates
            .iter()
            .filter(|t| category.is_none_or(|c| t.category == c))
            .filter(|t| {
                term.as_deref().is_none_or(|needle| {
                    t.name.to_lowercase().contains(needle)
                        || t.description.to_lowercase().contains(needle)
                })
            })
            .collect()
    }
}

/// Reject templates with duplicate action ids, dangling depends_on references
/// or action types with no queue route.
fn validate_template(template: &WorkflowTemplate) -> Result<()> {
    let mut seen = HashSet::new();
    for action in &template.actions {
        if !seen.insert(action.id.as_str()) {
            return Err(EngineError::Validation(format!(
                "Template '{}' has duplicate action id '{}'",
                template.id, action.id
            )));
        }
        if QueueName::route(&action.action_type).is_none() {
            return Err(EngineError::Validation(format!(
                "Template '{}' action '{}' has unroutable type '{}'",
                template.id, action.id, action.action_type
            )));
        }
    }
    for action in &template.actions {
        for dep in &action.depends_on {
            if !seen.contains(dep.as_str()) {
                return Err(EngineError::Validation(format!(
                    "Template '{}' action '{}' depends on unknown action '{}'",
                    template.id, action.id, dep
                )));
            }
        }
    }
    Ok(())
}

fn action(
    id: &str,
    action_type: &str,
    title: &str,
    order: u32,
    parallelizable: bool,
    estimated_duration: u32,
) -> WorkflowAction {
    WorkflowAction {
        id: id.to_string(),
        action_type: action_type.to_string(),
        title: title.to_string(),
        description: String::new(),
        payload: serde_json::json!({}),
        policy: ActionPolicy::production(),
        order,
        depends_on: Vec::new(),
        parallelizable,
        estimated_duration,
    }
}

fn dependency(kind: DependencyKind, requirement: &str, optional: bool) -> WorkflowDependency {
    WorkflowDependency {
        kind,
        requirement: requirement.to_string(),
        optional,
    }
}

fn builtin_templates() -> Vec<WorkflowTemplate> {
    vec![
        WorkflowTemplate {
            id: "site-setup".to_string(),
            name: "New Site SEO Setup".to_string(),
            description: "Baseline profile, CMS connection and first technical audit for a new site"
                .to_string(),
            category: TemplateCategory::Setup,
            triggers: vec![
                "setup".to_string(),
                "new site".to_string(),
                "onboard".to_string(),
                "getting started".to_string(),
            ],
            estimated_duration: 45,
            risk_level: RiskLevel::Low,
            actions: vec![
                action(
                    "register-profile",
                    "register_site_profile",
                    "Register site profile",
                    1,
                    true,
                    5,
                ),
                action("connect-cms", "connect_cms", "Connect CMS", 1, true, 10),
                {
                    let mut a = action(
                        "baseline-audit",
                        "baseline_technical_audit",
                        "Baseline technical audit",
                        2,
                        false,
                        20,
                    );
                    a.depends_on = vec!["register-profile".to_string()];
                    a
                },
                {
                    let mut a = action(
                        "verify-setup",
                        "verify_setup",
                        "Verify setup completed",
                        3,
                        false,
                        5,
                    );
                    a.depends_on = vec!["baseline-audit".to_string()];
                    a
                },
            ],
            dependencies: vec![dependency(
                DependencyKind::Permission,
                "technical_modifications",
                true,
            )],
        },
        WorkflowTemplate {
            id: "technical-fix".to_string(),
            name: "Technical Issue Remediation".to_string(),
            description: "Crawl audit, automated fixes and verification for technical SEO issues"
                .to_string(),
            category: TemplateCategory::Technical,
            triggers: vec![
                "technical".to_string(),
                "crawl".to_string(),
                "broken".to_string(),
                "speed".to_string(),
                "fix".to_string(),
            ],
            estimated_duration: 60,
            risk_level: RiskLevel::High,
            actions: vec![
                action(
                    "crawl-audit",
                    "technical_crawl_audit",
                    "Crawl and audit site",
                    1,
                    false,
                    25,
                ),
                {
                    let mut a = action(
                        "apply-fixes",
                        "apply_technical_fixes",
                        "Apply technical fixes",
                        2,
                        false,
                        20,
                    );
                    a.depends_on = vec!["crawl-audit".to_string()];
                    a
                },
                {
                    let mut a = action(
                        "schema-update",
                        "schema_markup_update",
                        "Update schema markup",
                        2,
                        false,
                        10,
                    );
                    a.depends_on = vec!["crawl-audit".to_string()];
                    a
                },
                {
                    let mut a = action(
                        "verify-fixes",
                        "verify_technical_fixes",
                        "Verify fixes",
                        3,
                        false,
                        5,
                    );
                    a.depends_on = vec!["apply-fixes".to_string()];
                    a
                },
            ],
            dependencies: vec![
                dependency(DependencyKind::Permission, "technical_modifications", false),
                dependency(DependencyKind::Data, "performance_history", true),
            ],
        },
        WorkflowTemplate {
            id: "content-refresh".to_string(),
            name: "Content Refresh".to_string(),
            description: "Gap analysis, article generation and CMS publishing for underperforming content"
                .to_string(),
            category: TemplateCategory::Content,
            triggers: vec![
                "content".to_string(),
                "article".to_string(),
                "blog".to_string(),
                "refresh".to_string(),
                "rewrite".to_string(),
            ],
            estimated_duration: 90,
            risk_level: RiskLevel::Medium,
            actions: vec![
                action(
                    "gap-analysis",
                    "content_gap_analysis",
                    "Analyze content gaps",
                    1,
                    false,
                    15,
                ),
                {
                    let mut a = action(
                        "content-brief",
                        "generate_content_brief",
                        "Generate content brief",
                        2,
                        true,
                        10,
                    );
                    a.depends_on = vec!["gap-analysis".to_string()];
                    a
                },
                {
                    let mut a = action(
                        "draft-article",
                        "generate_article",
                        "Draft article",
                        2,
                        true,
                        30,
                    );
                    a.depends_on = vec!["gap-analysis".to_string()];
                    a
                },
                {
                    let mut a = action(
                        "publish-draft",
                        "publish_cms_draft",
                        "Publish draft to CMS",
                        3,
                        false,
                        10,
                    );
                    a.depends_on = vec!["draft-article".to_string()];
                    a
                },
                {
                    let mut a = action(
                        "verify-content",
                        "verify_content_health",
                        "Verify content health",
                        4,
                        false,
                        5,
                    );
                    a.depends_on = vec!["publish-draft".to_string()];
                    a
                },
            ],
            dependencies: vec![
                dependency(DependencyKind::Integration, "cms_connection", false),
                dependency(DependencyKind::Data, "performance_history", false),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_templates_validate() {
        TemplateCatalog::new(builtin_templates()).unwrap();
    }

    #[test]
    fn search_filters_by_category_and_term() {
        let catalog = TemplateCatalog::builtin();
        let setup = catalog.search(Some(TemplateCategory::Setup), None);
        assert_eq!(setup.len(), 1);
        assert_eq!(setup[0].id, "site-setup");

        let refresh = catalog.search(None, Some("REFRESH"));
        assert_eq!(refresh.len(), 1);
        assert_eq!(refresh[0].id, "content-refresh");
    }

    #[test]
    fn duplicate_action_ids_rejected() {
        let mut template = builtin_templates().remove(0);
        let dup = template.actions[0].clone();
        template.actions.push(dup);
        assert!(TemplateCatalog::new(vec![template]).is_err());
    }

    #[test]
    fn dangling_depends_on_rejected() {
        let mut template = builtin_templates().remove(0);
        template.actions[2].depends_on = vec!["no-such-action".to_string()];
        assert!(TemplateCatalog::new(vec![template]).is_err());
    }
}
