//! `create-epic` / `create-task` / `create-sub-task` (spec.md §4.7).

use crate::commands::{default_body_template, default_creation_labels, ensure_parent_reference, CommandContext};
use crate::error::Error;
use crate::types::{FallbackUsed, Issue, IssueKind};

/// Everything a creation command needs beyond the repo/client context.
pub struct CreateArgs {
    pub title: String,
    pub body: Option<String>,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub milestone: Option<String>,
}

pub struct CreateResult {
    pub issue: Issue,
    pub fallback: FallbackUsed,
}

pub async fn create_epic(ctx: &CommandContext, args: CreateArgs) -> Result<CreateResult, Error> {
    create_with_parent(ctx, IssueKind::Epic, None, args).await
}

pub async fn create_task(
    ctx: &CommandContext,
    parent_epic: u64,
    args: CreateArgs,
) -> Result<CreateResult, Error> {
    let parent = ctx.client.rest().get_issue(&ctx.owner, &ctx.repo, parent_epic).await?;
    let parent_kind = ctx.client.resolve_kind(&parent);
    if parent_kind != IssueKind::Epic {
        return Err(Error::ParentNotOfExpectedKind {
            expected: IssueKind::Epic,
            actual: parent_kind,
        });
    }
    create_with_parent(ctx, IssueKind::Task, Some(parent_epic), args).await
}

pub async fn create_sub_task(
    ctx: &CommandContext,
    parent_task: u64,
    args: CreateArgs,
) -> Result<CreateResult, Error> {
    let parent = ctx.client.rest().get_issue(&ctx.owner, &ctx.repo, parent_task).await?;
    let parent_kind = ctx.client.resolve_kind(&parent);
    if parent_kind != IssueKind::Task {
        return Err(Error::ParentNotOfExpectedKind {
            expected: IssueKind::Task,
            actual: parent_kind,
        });
    }
    create_with_parent(ctx, IssueKind::SubTask, Some(parent_task), args).await
}

async fn create_with_parent(
    ctx: &CommandContext,
    kind: IssueKind,
    parent_number: Option<u64>,
    args: CreateArgs,
) -> Result<CreateResult, Error> {
    let required = crate::workflow::required_sections_for(&ctx.config, kind);
    let mut body = match args.body {
        Some(custom) => custom,
        None => default_body_template(kind, required),
    };
    if let Some(parent_number) = parent_number {
        body = ensure_parent_reference(&body, parent_number);
    }

    let milestone = crate::commands::resolve_milestone(ctx, args.milestone.as_deref()).await?;
    let labels = default_creation_labels(kind, &args.labels);

    let (mut issue, fallback) = match parent_number {
        None => {
            let issue = ctx
                .client
                .rest()
                .create_issue(&ctx.owner, &ctx.repo, &args.title, &body, &labels)
                .await?;
            (issue, FallbackUsed::None)
        }
        Some(parent_number) => {
            let created = ctx
                .client
                .create_typed_child(
                    &ctx.owner,
                    &ctx.repo,
                    kind,
                    &args.title,
                    &body,
                    parent_number,
                    true,
                )
                .await?;
            (created.issue, created.fallback)
        }
    };

    // `create_typed_child` only ever applies the default status/type labels;
    // extra caller-supplied labels still need to land on the created issue.
    if parent_number.is_some() && !args.labels.is_empty() {
        ctx.client
            .rest()
            .add_labels(&ctx.owner, &ctx.repo, issue.number, &args.labels)
            .await?;
        issue.labels.extend(args.labels.iter().cloned());
    }

    if !args.assignees.is_empty() {
        ctx.client
            .rest()
            .add_assignees(&ctx.owner, &ctx.repo, issue.number, &args.assignees)
            .await?;
        issue.assignees = args.assignees;
    }
    if let Some(milestone) = milestone {
        issue.milestone = Some(milestone);
    }

    Ok(CreateResult { issue, fallback })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_args_struct_carries_through_title() {
        let args = CreateArgs {
            title: "Ship it".to_string(),
            body: None,
            labels: vec![],
            assignees: vec![],
            milestone: None,
        };
        assert_eq!(args.title, "Ship it");
    }
}
