//! Workflow Engine (spec.md §4.6): the from→to transition table, precondition
//! evaluation, status projection, and audit-log formatting.

use chrono::{DateTime, Utc};

use crate::body::{self, writer::WriterError};
use crate::client::HybridClient;
use crate::config::{ProjectTargetKey, StatusMethod};
use crate::error::Error;
use crate::log_warn;
use crate::types::{find_transition, parse_workflow_state, Issue, IssueKind, ParsedBody, WorkflowState};

/// Canonicalise an issue's current workflow state from its labels. Multiple
/// `status:*` labels are ambiguous; the lexicographically-first one wins and
/// a warning is logged (spec.md §4.6).
pub fn current_state(labels: &[String]) -> WorkflowState {
    let mut status_labels: Vec<&str> = labels
        .iter()
        .filter_map(|l| l.strip_prefix("status:"))
        .collect();
    status_labels.sort_unstable();

    match status_labels.first() {
        None => WorkflowState::default(),
        Some(first) => {
            if status_labels.len() > 1 {
                log_warn!(
                    "issue has {} status labels ({:?}); treating '{}' as authoritative",
                    status_labels.len(),
                    status_labels,
                    first
                );
            }
            parse_workflow_state(first).unwrap_or_default()
        }
    }
}

/// Validate that `transition_name` applies to `current`, returning the
/// transition row or `IllegalTransition`.
pub fn check_transition(
    transition_name: &str,
    current: WorkflowState,
) -> Result<&'static crate::types::Transition, Error> {
    let transition = find_transition(transition_name)
        .ok_or_else(|| Error::InternalError(format!("unknown transition '{}'", transition_name)))?;
    if transition.from != current {
        return Err(Error::IllegalTransition {
            current,
            attempted: transition.from,
        });
    }
    Ok(transition)
}

/// `submit-plan` precondition: every section named in `required` must be
/// present (case-insensitive title match, non-empty).
pub fn check_required_sections(parsed: &ParsedBody, required: &[String]) -> Result<(), Error> {
    let missing: Vec<String> = required
        .iter()
        .filter(|title| parsed.find_section(title).is_none())
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::RequiredSectionMissing(missing))
    }
}

/// `approve-work` precondition: every todo in every section must be checked,
/// and every child issue must be closed. Re-reads the body and re-resolves
/// children from the caller (spec.md §4.6: "re-read, re-resolve,
/// TOCTOU accepted").
pub fn check_completion(parsed: &ParsedBody, open_children: &[u64]) -> Result<(), Error> {
    let unchecked: Vec<(String, String)> = parsed
        .sections
        .iter()
        .flat_map(|section| {
            section
                .todos
                .iter()
                .filter(|t| !t.checked)
                .map(move |t| (section.title.clone(), t.text.clone()))
        })
        .collect();

    if unchecked.is_empty() && open_children.is_empty() {
        Ok(())
    } else {
        Err(Error::CompletionBlocked {
            open_children: open_children.to_vec(),
            unchecked_todos: unchecked,
        })
    }
}

/// Append the audit-log entry for a completed transition (spec.md §4.6).
pub fn record_transition(
    parsed: &mut ParsedBody,
    from: WorkflowState,
    to: WorkflowState,
    actor: &str,
    timestamp: DateTime<Utc>,
    message: Option<String>,
) {
    body::append_log_entry(parsed, from, to, actor, timestamp, message);
}

/// Re-render the body after a transition edit, surfacing the writer's size
/// ceiling as the same `BodyTooLarge` the rest of the body-edit commands use.
pub fn render_body(parsed: &ParsedBody) -> Result<String, Error> {
    body::write(parsed).map_err(|e| match e {
        WriterError::TooLarge(n) => Error::BodyTooLarge(n),
        WriterError::SectionNotFound(s) => Error::InternalError(format!("unexpected SectionNotFound('{}') while rendering", s)),
        WriterError::DuplicateTodo(s) => Error::InternalError(format!("unexpected DuplicateTodo('{}') while rendering", s)),
    })
}

/// Drive the whole `approve-work` transition's project field/label
/// projection through the Hybrid Client, including the `closed` flag flip
/// (spec.md §4.6: "closed transition additionally flips open/closed").
pub async fn project_status(
    client: &HybridClient,
    owner: &str,
    repo: &str,
    issue: &Issue,
    method: StatusMethod,
    target: &ProjectTargetKey,
    to_state: WorkflowState,
) -> Result<StatusMethod, Error> {
    let applied = client
        .set_workflow_state(owner, repo, issue.number, &issue.labels, method, target, to_state)
        .await?;
    if to_state == WorkflowState::Closed {
        client
            .rest()
            .set_issue_state(owner, repo, issue.number, false)
            .await?;
    }
    Ok(applied)
}

/// Resolve the kind-specific required-sections list, matching on
/// case-insensitive, whitespace-trimmed title as spec.md §4.6 requires.
pub fn required_sections_for<'a>(
    config: &'a crate::config::Config,
    kind: IssueKind,
) -> &'a [String] {
    config
        .required_sections
        .get(&kind)
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}
