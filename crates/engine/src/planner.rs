//! Execution planner and priority scorer
//!
//! Turns a template plus the resolver's unmet-dependency list into an
//! `ExecutionPlan`: batched dispatch order, ready/blocked classification,
//! duration estimate and warnings.

use crate::types::{
    ActionId, BlockedAction, ExecutionPlan, RiskLevel, WorkflowAction, WorkflowDependency,
    WorkflowTemplate,
};
use std::collections::HashSet;

/// Requirement keys an action type needs to be satisfied before dispatch
pub fn requirements_for(action_type: &str) -> &'static [&'static str] {
    match action_type {
        "connect_cms" | "publish_cms_draft" | "cms_sync" => &["cms_connection"],
        "apply_technical_fixes" | "schema_markup_update" => &["technical_modifications"],
        "content_gap_analysis" => &["performance_history"],
        _ => &[],
    }
}

/// Derive the 1-100 dispatch priority for an action
pub fn priority_score(order: u32, risk: RiskLevel, estimated_duration: u32) -> u8 {
    let risk_bonus: i64 = match risk {
        RiskLevel::High => 10,
        RiskLevel::Medium => 5,
        RiskLevel::Low => 0,
    };
    let duration_bonus: i64 = if estimated_duration < 10 { 5 } else { 0 };
    let score = 50 + (10 - order as i64) * 5 + risk_bonus + duration_bonus;
    score.clamp(1, 100) as u8
}

/// Group actions into dispatch batches.
///
/// Actions are walked in ascending `order`. A batch accumulates while the next
/// action keeps the same order and is parallelizable; any order change or
/// non-parallelizable action flushes the batch. A non-parallelizable action
/// always occupies its own batch.
fn build_batches(sorted: &[&WorkflowAction]) -> Vec<Vec<ActionId>> {
    let mut batches: Vec<Vec<ActionId>> = Vec::new();
    let mut current: Vec<ActionId> = Vec::new();
    let mut current_order: Option<u32> = None;

    for action in sorted {
        let extends_batch =
            current_order == Some(action.order) && action.parallelizable && !current.is_empty();
        if !extends_batch && !current.is_empty() {
            batches.push(std::mem::take(&mut current));
        }
        current.push(action.id.clone());
        current_order = Some(action.order);
        if !action.parallelizable {
            batches.push(std::mem::take(&mut current));
            current_order = None;
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Build the execution plan for one idea + template
pub fn build_plan(
    idea_id: &str,
    template: &WorkflowTemplate,
    unmet: &[WorkflowDependency],
) -> ExecutionPlan {
    let mut sorted: Vec<&WorkflowAction> = template.actions.iter().collect();
    sorted.sort_by_key(|a| a.order);

    let execution_order = build_batches(&sorted);
    let first_batch: HashSet<&str> = execution_order
        .first()
        .map(|batch| batch.iter().map(String::as_str).collect())
        .unwrap_or_default();
    let unmet_requirements: HashSet<&str> =
        unmet.iter().map(|d| d.requirement.as_str()).collect();

    let mut ready_actions: Vec<ActionId> = Vec::new();
    let mut ready_set: HashSet<&str> = HashSet::new();
    let mut blocked_actions: Vec<BlockedAction> = Vec::new();

    for action in &sorted {
        let missing: Vec<String> = requirements_for(&action.action_type)
            .iter()
            .filter(|req| unmet_requirements.contains(**req))
            .map(|req| req.to_string())
            .collect();

        if !missing.is_empty() {
            blocked_actions.push(BlockedAction {
                action_id: action.id.clone(),
                reason: format!("Missing dependencies: {}", missing.join(", ")),
                missing,
            });
            continue;
        }

        let unmet_sibling = action
            .depends_on
            .iter()
            .find(|dep| !ready_set.contains(dep.as_str()) && !first_batch.contains(dep.as_str()));
        if let Some(sibling) = unmet_sibling {
            blocked_actions.push(BlockedAction {
                action_id: action.id.clone(),
                reason: format!("Depends on '{}' which is not ready", sibling),
                missing: vec![sibling.clone()],
            });
            continue;
        }

        ready_set.insert(action.id.as_str());
        ready_actions.push(action.id.clone());
    }

    // Batches run sequentially; members of a batch complete in parallel
    let total_estimated_duration = execution_order
        .iter()
        .map(|batch| {
            batch
                .iter()
                .filter_map(|id| template.actions.iter().find(|a| &a.id == id))
                .map(|a| a.estimated_duration)
                .max()
                .unwrap_or(0)
        })
        .sum();

    let mut warnings = Vec::new();
    if !blocked_actions.is_empty() {
        warnings.push(format!(
            "{} action(s) are blocked by unmet dependencies",
            blocked_actions.len()
        ));
    }
    if template.risk_level == RiskLevel::High {
        warnings.push("High-risk workflow: review actions before approving".to_string());
    }

    ExecutionPlan {
        idea_id: idea_id.to_string(),
        template_id: template.id.clone(),
        execution_order,
        ready_actions,
        blocked_actions,
        warnings,
        total_estimated_duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TemplateCatalog;
    use crate::types::DependencyKind;

    fn template(id: &str) -> WorkflowTemplate {
        TemplateCatalog::builtin().get(id).unwrap().clone()
    }

    #[test]
    fn ready_and_blocked_partition_all_actions() {
        for tmpl in TemplateCatalog::builtin().all() {
            let plan = build_plan("idea-1", tmpl, &[]);
            let mut ids: Vec<&str> = plan
                .ready_actions
                .iter()
                .map(String::as_str)
                .chain(plan.blocked_actions.iter().map(|b| b.action_id.as_str()))
                .collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), tmpl.actions.len());
        }
    }

    #[test]
    fn batches_cover_every_action_once_with_non_decreasing_order() {
        for tmpl in TemplateCatalog::builtin().all() {
            let plan = build_plan("idea-1", tmpl, &[]);
            let flat: Vec<&String> = plan.execution_order.iter().flatten().collect();
            assert_eq!(flat.len(), tmpl.actions.len());

            let order_of = |id: &str| {
                tmpl.actions
                    .iter()
                    .find(|a| a.id == id)
                    .map(|a| a.order)
                    .unwrap()
            };
            let batch_orders: Vec<u32> = plan
                .execution_order
                .iter()
                .map(|batch| order_of(&batch[0]))
                .collect();
            assert!(batch_orders.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn parallel_actions_with_equal_order_share_a_batch() {
        let plan = build_plan("idea-1", &template("site-setup"), &[]);
        // register-profile and connect-cms are order 1 and parallelizable
        assert_eq!(plan.execution_order[0].len(), 2);
    }

    #[test]
    fn non_parallelizable_action_occupies_its_own_batch() {
        let plan = build_plan("idea-1", &template("technical-fix"), &[]);
        // apply-fixes and schema-update share order 2 but are not parallelizable
        for batch in &plan.execution_order {
            assert_eq!(batch.len(), 1);
        }
    }

    #[test]
    fn unmet_requirement_blocks_dependent_actions() {
        let unmet = vec![WorkflowDependency {
            kind: DependencyKind::Integration,
            requirement: "cms_connection".to_string(),
            optional: false,
        }];
        let plan = build_plan("idea-1", &template("content-refresh"), &unmet);

        let blocked: Vec<&str> = plan
            .blocked_actions
            .iter()
            .map(|b| b.action_id.as_str())
            .collect();
        assert!(blocked.contains(&"publish-draft"));
        assert!(plan.warnings.iter().any(|w| w.contains("blocked")));
    }

    #[test]
    fn duration_sums_batch_maxima() {
        let plan = build_plan("idea-1", &template("site-setup"), &[]);
        // batch maxima: max(5, 10) + 20 + 5
        assert_eq!(plan.total_estimated_duration, 35);
    }

    #[test]
    fn high_risk_template_emits_warning() {
        let plan = build_plan("idea-1", &template("technical-fix"), &[]);
        assert!(plan.warnings.iter().any(|w| w.contains("High-risk")));
    }

    #[test]
    fn priority_score_stays_in_range() {
        for order in 1..=20u32 {
            for risk in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
                for duration in [0u32, 5, 9, 10, 120] {
                    let score = priority_score(order, risk, duration);
                    assert!((1..=100).contains(&score));
                }
            }
        }
    }

    #[test]
    fn priority_score_favours_early_risky_short_actions() {
        // 50 + 45 + 10 + 5 = 110, clamped to 100
        assert_eq!(priority_score(1, RiskLevel::High, 5), 100);
        assert_eq!(priority_score(10, RiskLevel::Low, 30), 50);
        assert!(priority_score(2, RiskLevel::High, 5) > priority_score(5, RiskLevel::Low, 30));
    }
}
