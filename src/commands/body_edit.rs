//! `set-body` / `create-todo` / `check-todo` (spec.md §4.7).

use crate::body::{self, writer::WriterError};
use crate::commands::CommandContext;
use crate::error::Error;
use crate::types::Issue;

fn map_writer_error(e: WriterError) -> Error {
    match e {
        WriterError::SectionNotFound(_) => {
            Error::InternalError("unexpected SectionNotFound after section resolution".to_string())
        }
        WriterError::DuplicateTodo(text) => Error::DuplicateTodo(text),
        WriterError::TooLarge(n) => Error::BodyTooLarge(n),
    }
}

/// Replace the entire body atomically (spec.md §4.7: "validates the new
/// body's size").
pub async fn set_body(ctx: &CommandContext, number: u64, new_body: String) -> Result<Issue, Error> {
    let parsed = body::replace_whole_body(&new_body).map_err(map_writer_error)?;
    let rendered = body::write(&parsed).map_err(map_writer_error)?;
    ctx.client
        .rest()
        .update_issue_body(&ctx.owner, &ctx.repo, number, &rendered)
        .await?;
    let mut issue = ctx.client.rest().get_issue(&ctx.owner, &ctx.repo, number).await?;
    issue.body = rendered;
    Ok(issue)
}

/// Case-insensitive section lookup, resolving the caller-supplied title to
/// the section's original title for `create-todo`/`check-todo` (spec.md
/// §4.7: "operate on a specific section (case-insensitive title match)").
fn resolve_section_title(parsed: &crate::types::ParsedBody, section: &str) -> Result<String, Error> {
    parsed
        .find_section(section)
        .map(|s| s.title.clone())
        .ok_or_else(|| {
            Error::SectionNotFound(
                section.to_string(),
                parsed.sections.iter().map(|s| s.title.clone()).collect(),
            )
        })
}

pub async fn create_todo(
    ctx: &CommandContext,
    number: u64,
    section: &str,
    text: &str,
    create_section: bool,
) -> Result<Issue, Error> {
    let issue = ctx.client.rest().get_issue(&ctx.owner, &ctx.repo, number).await?;
    let mut parsed = body::parse(&issue.body);

    let title = match resolve_section_title(&parsed, section) {
        Ok(title) => title,
        Err(Error::SectionNotFound(_, available)) if create_section => {
            body::set_section(&mut parsed, section, "");
            let _ = available;
            section.to_string()
        }
        Err(other) => return Err(other),
    };

    body::add_todo(&mut parsed, &title, text).map_err(map_writer_error)?;
    let rendered = body::write(&parsed).map_err(map_writer_error)?;
    ctx.client
        .rest()
        .update_issue_body(&ctx.owner, &ctx.repo, number, &rendered)
        .await?;

    let mut issue = issue;
    issue.body = rendered;
    Ok(issue)
}

/// Toggle a todo whose text contains `needle` (case-sensitive substring
/// match, since `Todo` text identity is case-sensitive per spec.md §3).
/// Multiple matches within the section are `AmbiguousMatch`.
pub async fn check_todo(ctx: &CommandContext, number: u64, section: &str, needle: &str) -> Result<Issue, Error> {
    let issue = ctx.client.rest().get_issue(&ctx.owner, &ctx.repo, number).await?;
    let mut parsed = body::parse(&issue.body);

    let title = resolve_section_title(&parsed, section)?;
    let matches: Vec<String> = parsed
        .find_section(&title)
        .map(|s| {
            s.todos
                .iter()
                .filter(|t| t.text.contains(needle))
                .map(|t| t.text.clone())
                .collect()
        })
        .unwrap_or_default();

    let target = match matches.as_slice() {
        [only] => only.clone(),
        // Zero or multiple candidates are both non-unique matches; the
        // caller sees the same error shape either way (empty candidate list
        // for zero, the full list for ambiguous).
        many => return Err(Error::AmbiguousMatch(needle.to_string(), many.to_vec())),
    };

    let currently_checked = parsed
        .find_section(&title)
        .and_then(|s| s.todos.iter().find(|t| t.text == target))
        .map(|t| t.checked)
        .unwrap_or(false);

    body::toggle_todo(&mut parsed, &title, &target, !currently_checked).map_err(map_writer_error)?;
    let rendered = body::write(&parsed).map_err(map_writer_error)?;
    ctx.client
        .rest()
        .update_issue_body(&ctx.owner, &ctx.repo, number, &rendered)
        .await?;

    let mut issue = issue;
    issue.body = rendered;
    Ok(issue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParsedBody;

    #[test]
    fn resolve_section_title_is_case_insensitive() {
        let parsed = body::parse("## Acceptance Criteria\n- [ ] x\n");
        assert_eq!(
            resolve_section_title(&parsed, "acceptance criteria").unwrap(),
            "Acceptance Criteria"
        );
    }

    #[test]
    fn resolve_section_title_reports_available_on_miss() {
        let parsed = body::parse("## Summary\ntext\n");
        let err = resolve_section_title(&parsed, "Nope").unwrap_err();
        assert!(matches!(err, Error::SectionNotFound(_, available) if available == vec!["Summary".to_string()]));
    }

    #[test]
    fn empty_parsed_body_has_no_sections_to_resolve() {
        let parsed = ParsedBody::default();
        assert!(resolve_section_title(&parsed, "anything").is_err());
    }
}
