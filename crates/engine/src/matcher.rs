//! Workflow matcher
//!
//! Scores catalog templates against a free-text idea plus optional evidence
//! signals and picks the best candidate.

use crate::types::{Evidence, TemplateCategory, WorkflowTemplate};
use tracing::debug;

/// Score one template against the idea text and evidence.
///
/// +1 per trigger substring found (case-insensitive) in title + hypothesis,
/// +2 when an evidence signal aligns with the template category.
fn score_template(template: &WorkflowTemplate, haystack: &str, evidence: Option<&Evidence>) -> u32 {
    let mut score = 0;
    for trigger in &template.triggers {
        if haystack.contains(&trigger.to_lowercase()) {
            score += 1;
        }
    }

    if let Some(evidence) = evidence {
        let aligned = match template.category {
            TemplateCategory::Setup => evidence.site_age.as_deref() == Some("new"),
            TemplateCategory::Technical => evidence.has_technical_issues == Some(true),
            TemplateCategory::Content => evidence.content_performance.as_deref() == Some("poor"),
        };
        if aligned {
            score += 2;
        }
    }

    score
}

/// Select the best-matching template, or None when nothing scores above zero.
///
/// Ties resolve to the earliest catalog entry: the fold only replaces the
/// current best on a strictly greater score, so scan order is the documented
/// deterministic tie-break.
pub fn suggest<'a>(
    templates: &'a [WorkflowTemplate],
    title: &str,
    hypothesis: Option<&str>,
    evidence: Option<&Evidence>,
) -> Option<&'a WorkflowTemplate> {
    let haystack = match hypothesis {
        Some(h) => format!("{} {}", title, h).to_lowercase(),
        None => title.to_lowercase(),
    };

    let mut best: Option<(&WorkflowTemplate, u32)> = None;
    for template in templates {
        let score = score_template(template, &haystack, evidence);
        debug!(template = %template.id, score, "Scored template");
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((template, score));
        }
    }

    best.filter(|(_, score)| *score > 0).map(|(t, _)| t)
}
