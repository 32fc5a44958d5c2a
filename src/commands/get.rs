//! `get` / `get-epic` / `get-task` / `get-sub-task` (spec.md §4.7).

use crate::body::parse;
use crate::commands::CommandContext;
use crate::error::Error;
use crate::types::{Issue, IssueKind, ParsedBody};
use crate::workflow::current_state;

/// An issue enriched with the hierarchy context the command surface
/// promises: parent (for Task/Sub-task) and children (for Epic/Task).
pub struct GetResult {
    pub issue: Issue,
    pub parsed_body: ParsedBody,
    pub state: crate::types::WorkflowState,
    pub parent_number: Option<u64>,
    pub child_numbers: Vec<u64>,
}

pub async fn get(ctx: &CommandContext, kind: Option<IssueKind>, number: u64) -> Result<GetResult, Error> {
    let issue = ctx.client.rest().get_issue(&ctx.owner, &ctx.repo, number).await?;
    let resolved_kind = ctx.client.resolve_kind(&issue);
    if let Some(expected) = kind {
        if expected != resolved_kind {
            return Err(Error::ParentNotOfExpectedKind {
                expected,
                actual: resolved_kind,
            });
        }
    }

    let parsed_body = parse(&issue.body);
    let state = current_state(&issue.labels);

    let parent_number = parsed_body.references.parent;
    let child_numbers = if matches!(resolved_kind, IssueKind::Epic | IssueKind::Task) {
        let node_id = ctx.client.resolve_node_id(&ctx.owner, &ctx.repo, number).await?;
        ctx.client.graph().get_issue_with_children(&node_id).await.unwrap_or_default()
    } else {
        Vec::new()
    };

    Ok(GetResult {
        issue,
        parsed_body,
        state,
        parent_number,
        child_numbers,
    })
}
