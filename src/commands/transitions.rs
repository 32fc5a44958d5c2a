//! `start-plan` / `submit-plan` / `approve-plan` / `start-work` /
//! `submit-work` / `approve-work` (spec.md §4.7, §4.6).

use chrono::Utc;

use crate::body;
use crate::commands::CommandContext;
use crate::error::Error;
use crate::types::Issue;
use crate::workflow;

pub struct TransitionResult {
    pub issue: Issue,
    pub from_state: crate::types::WorkflowState,
    pub to_state: crate::types::WorkflowState,
}

/// Apply a named transition to an issue: validate current state, evaluate
/// the transition's preconditions, project the new status, append the
/// audit-log entry, and write the body back.
pub async fn apply_transition(
    ctx: &CommandContext,
    transition_name: &str,
    number: u64,
    message: Option<String>,
) -> Result<TransitionResult, Error> {
    let issue = ctx.client.rest().get_issue(&ctx.owner, &ctx.repo, number).await?;
    let current = workflow::current_state(&issue.labels);
    let transition = workflow::check_transition(transition_name, current)?;

    let mut parsed = body::parse(&issue.body);

    if transition_name == "submit-plan" {
        let kind = ctx.client.resolve_kind(&issue);
        let required = workflow::required_sections_for(&ctx.config, kind);
        workflow::check_required_sections(&parsed, required)?;
    }

    if transition_name == "approve-work" {
        let node_id = ctx.client.resolve_node_id(&ctx.owner, &ctx.repo, number).await?;
        let child_numbers = ctx
            .client
            .graph()
            .get_issue_with_children(&node_id)
            .await
            .unwrap_or_default();
        let mut open_children = Vec::new();
        for child_number in child_numbers {
            let child = ctx
                .client
                .rest()
                .get_issue(&ctx.owner, &ctx.repo, child_number)
                .await?;
            if child.open {
                open_children.push(child_number);
            }
        }
        workflow::check_completion(&parsed, &open_children)?;
    }

    let actor = ctx.client.rest().current_user().await?;
    workflow::record_transition(&mut parsed, transition.from, transition.to, &actor, Utc::now(), message);
    let rendered = workflow::render_body(&parsed)?;

    ctx.client
        .rest()
        .update_issue_body(&ctx.owner, &ctx.repo, number, &rendered)
        .await?;
    workflow::project_status(
        &ctx.client,
        &ctx.owner,
        &ctx.repo,
        &issue,
        ctx.config.status_method,
        &ctx.config.target,
        transition.to,
    )
    .await?;

    let mut issue = issue;
    issue.body = rendered;
    issue.open = transition.to != crate::types::WorkflowState::Closed;

    Ok(TransitionResult {
        issue,
        from_state: transition.from,
        to_state: transition.to,
    })
}
