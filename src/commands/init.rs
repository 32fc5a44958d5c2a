//! `init` (spec.md §4.7): idempotent setup of issue types and status/type
//! labels, never failing fast.

use crate::commands::CommandContext;
use crate::error::Error;
use crate::log_warn;
use crate::preflight;
use crate::types::{IssueKind, WorkflowState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Existing,
    Fallback,
}

pub struct InitItem {
    pub name: String,
    pub outcome: Outcome,
}

pub struct InitReport {
    pub items: Vec<InitItem>,
    pub errors: Vec<String>,
}

const LABEL_COLOR: &str = "ededed";

pub async fn init(ctx: &CommandContext) -> InitReport {
    let mut items = Vec::new();
    let mut errors: Vec<String> = preflight::run_preflight(&ctx.config)
        .into_iter()
        .map(|e| e.to_string())
        .collect();

    let existing_labels = match ctx.client.rest().list_labels(&ctx.owner, &ctx.repo).await {
        Ok(labels) => labels.into_iter().map(|l| l.name).collect::<Vec<_>>(),
        Err(e) => {
            errors.push(format!("failed to list existing labels: {}", e));
            Vec::new()
        }
    };

    for state in [
        WorkflowState::Backlog,
        WorkflowState::Planning,
        WorkflowState::AwaitingPlanApproval,
        WorkflowState::PlanApproved,
        WorkflowState::InProgress,
        WorkflowState::AwaitingCompletionApproval,
        WorkflowState::Closed,
    ] {
        ensure_label(ctx, &existing_labels, state.status_label(), &mut items, &mut errors).await;
    }

    for kind in [IssueKind::Epic, IssueKind::Task, IssueKind::SubTask] {
        ensure_label(
            ctx,
            &existing_labels,
            format!("type:{}", kind.label_value()),
            &mut items,
            &mut errors,
        )
        .await;
    }

    match ctx.client.graph().list_issue_types(&ctx.owner).await {
        Ok(existing_types) => {
            for kind in [IssueKind::Epic, IssueKind::Task, IssueKind::SubTask] {
                if existing_types.iter().any(|t| t == kind.type_name()) {
                    items.push(InitItem {
                        name: format!("issue type '{}'", kind.type_name()),
                        outcome: Outcome::Existing,
                    });
                } else {
                    log_warn!(
                        "issue type '{}' is not registered and cannot be created without an org-admin endpoint; falling back to label-based typing",
                        kind.type_name()
                    );
                    items.push(InitItem {
                        name: format!("issue type '{}'", kind.type_name()),
                        outcome: Outcome::Fallback,
                    });
                }
            }
        }
        Err(Error::FeatureUnavailable(_)) => {
            for kind in [IssueKind::Epic, IssueKind::Task, IssueKind::SubTask] {
                items.push(InitItem {
                    name: format!("issue type '{}'", kind.type_name()),
                    outcome: Outcome::Fallback,
                });
            }
        }
        Err(e) => errors.push(format!("failed to list issue types: {}", e)),
    }

    InitReport { items, errors }
}

async fn ensure_label(
    ctx: &CommandContext,
    existing_labels: &[String],
    name: String,
    items: &mut Vec<InitItem>,
    errors: &mut Vec<String>,
) {
    if existing_labels.iter().any(|l| l == &name) {
        items.push(InitItem {
            name: name.clone(),
            outcome: Outcome::Existing,
        });
        return;
    }
    match ctx
        .client
        .rest()
        .create_label(&ctx.owner, &ctx.repo, &name, Some(LABEL_COLOR))
        .await
    {
        Ok(_) => items.push(InitItem {
            name,
            outcome: Outcome::Created,
        }),
        Err(e) => errors.push(format!("failed to create label '{}': {}", name, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_variants_are_distinguishable() {
        assert_ne!(Outcome::Created, Outcome::Existing);
        assert_ne!(Outcome::Existing, Outcome::Fallback);
    }
}
