//! Serializes edits back into a body string without touching any byte
//! outside the edited region (spec.md §4.2).

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{ParsedBody, Section, WorkflowState};

/// Issue bodies are capped at this many UTF-16 code units, matching the
/// remote service's own body-size ceiling.
pub const MAX_BODY_CODE_UNITS: usize = 65_536;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("Section '{0}' not found")]
    SectionNotFound(String),
    #[error("Duplicate todo: '{0}' already exists in this section")]
    DuplicateTodo(String),
    #[error("Body exceeds the {0}-code-unit size ceiling")]
    TooLarge(usize),
}

fn check_size(body: &str) -> Result<(), WriterError> {
    let units = body.encode_utf16().count();
    if units > MAX_BODY_CODE_UNITS {
        return Err(WriterError::TooLarge(units));
    }
    Ok(())
}

/// Render a `ParsedBody` back into a single body string.
pub fn write(parsed: &ParsedBody) -> Result<String, WriterError> {
    let mut out = String::new();
    out.push_str(&parsed.prelude);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }

    for section in &parsed.sections {
        if !out.is_empty() && !out.ends_with("\n\n") {
            out.push('\n');
        }
        out.push_str("## ");
        out.push_str(&section.title);
        out.push('\n');
        for line in &section.lines {
            out.push_str(line);
            out.push('\n');
        }
    }

    if parsed.has_log_block || !parsed.log_entries.is_empty() {
        if !out.is_empty() && !out.ends_with("\n\n") {
            out.push('\n');
        }
        out.push_str("## Log\n");
        for entry in &parsed.log_entries {
            out.push_str(&render_log_entry(entry));
        }
    }

    check_size(&out)?;
    Ok(out)
}

fn render_log_entry(entry: &crate::types::LogEntry) -> String {
    let mut s = String::new();
    s.push_str(&format!("### {}\n", entry.timestamp.to_rfc3339()));
    s.push_str(&format!(
        "State changed from `{}` to `{}` by @{}\n",
        entry.from_state, entry.to_state, entry.actor
    ));
    if let Some(message) = &entry.message {
        s.push_str(&format!("Reason: {}\n", message));
    }
    s
}

/// Append a new todo to the end of a named section's todo list, placing it
/// as the last line of the section. Errors if the section is absent or the
/// exact same todo text already exists in that section.
pub fn add_todo(parsed: &mut ParsedBody, section_title: &str, text: &str) -> Result<(), WriterError> {
    let section = find_section_mut(parsed, section_title)?;
    if section.todos.iter().any(|t| t.text == text) {
        return Err(WriterError::DuplicateTodo(text.to_string()));
    }
    let line_index = section.lines.len();
    section.lines.push(format!("- [ ] {}", text));
    section.todos.push(crate::types::Todo {
        text: text.to_string(),
        checked: false,
        line_index,
    });
    Ok(())
}

/// Flip a todo's checkbox in place, rewriting only its own line.
pub fn toggle_todo(
    parsed: &mut ParsedBody,
    section_title: &str,
    todo_text: &str,
    checked: bool,
) -> Result<(), WriterError> {
    let section = find_section_mut(parsed, section_title)?;
    let todo = section
        .todos
        .iter_mut()
        .find(|t| t.text == todo_text)
        .ok_or_else(|| WriterError::SectionNotFound(todo_text.to_string()))?;
    todo.checked = checked;
    let marker = if checked { "x" } else { " " };
    section.lines[todo.line_index] = format!("- [{}] {}", marker, todo.text);
    Ok(())
}

/// Replace a named section's content, preserving the title and every other
/// section verbatim. Creates the section at the end if it does not exist.
pub fn set_section(parsed: &mut ParsedBody, title: &str, content: &str) {
    let lines: Vec<String> = content.lines().map(str::to_string).collect();
    match parsed
        .sections
        .iter_mut()
        .find(|s| s.key() == title.trim().to_lowercase())
    {
        Some(section) => {
            section.lines = lines;
            section.todos = crate::body::parser::parse(&format!("## {}\n{}", section.title, content))
                .sections
                .into_iter()
                .next()
                .map(|s| s.todos)
                .unwrap_or_default();
        }
        None => {
            let rebuilt = crate::body::parser::parse(&format!("## {}\n{}", title, content));
            if let Some(new_section) = rebuilt.sections.into_iter().next() {
                parsed.sections.push(new_section);
            } else {
                parsed.sections.push(Section {
                    title: title.to_string(),
                    lines,
                    todos: Vec::new(),
                });
            }
        }
    }
}

/// Append an audit-log row, creating the `## Log` sentinel heading on first use.
pub fn append_log_entry(
    parsed: &mut ParsedBody,
    from_state: WorkflowState,
    to_state: WorkflowState,
    actor: &str,
    timestamp: DateTime<Utc>,
    message: Option<String>,
) {
    parsed.has_log_block = true;
    parsed.log_entries.push(crate::types::LogEntry {
        from_state,
        to_state,
        actor: actor.to_string(),
        timestamp,
        message,
    });
}

/// Replace the entire body wholesale, re-parsing it fresh.
pub fn replace_whole_body(new_body: &str) -> Result<ParsedBody, WriterError> {
    check_size(new_body)?;
    Ok(crate::body::parser::parse(new_body))
}

fn find_section_mut<'a>(
    parsed: &'a mut ParsedBody,
    title: &str,
) -> Result<&'a mut Section, WriterError> {
    let key = title.trim().to_lowercase();
    parsed
        .sections
        .iter_mut()
        .find(|s| s.key() == key)
        .ok_or_else(|| WriterError::SectionNotFound(title.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::parser::parse;

    #[test]
    fn round_trips_a_simple_body_unchanged() {
        let body = "Intro.\n\n## Summary\nSome text.\n\n## Acceptance Criteria\n- [ ] First\n- [x] Second\n";
        let parsed = parse(body);
        let rendered = write(&parsed).unwrap();
        assert_eq!(rendered, body);
    }

    #[test]
    fn toggle_todo_only_changes_its_own_line() {
        let body = "## Acceptance Criteria\n- [ ] First\n- [ ] Second\n";
        let mut parsed = parse(body);
        toggle_todo(&mut parsed, "Acceptance Criteria", "First", true).unwrap();
        let rendered = write(&parsed).unwrap();
        assert_eq!(rendered, "## Acceptance Criteria\n- [x] First\n- [ ] Second\n");
    }

    #[test]
    fn add_todo_appends_at_end_of_section() {
        let body = "## Acceptance Criteria\n- [ ] First\n";
        let mut parsed = parse(body);
        add_todo(&mut parsed, "Acceptance Criteria", "Second").unwrap();
        let rendered = write(&parsed).unwrap();
        assert_eq!(
            rendered,
            "## Acceptance Criteria\n- [ ] First\n- [ ] Second\n"
        );
    }

    #[test]
    fn add_todo_rejects_exact_duplicate() {
        let body = "## Acceptance Criteria\n- [ ] First\n";
        let mut parsed = parse(body);
        let err = add_todo(&mut parsed, "Acceptance Criteria", "First").unwrap_err();
        assert!(matches!(err, WriterError::DuplicateTodo(_)));
    }

    #[test]
    fn set_section_preserves_other_sections_verbatim() {
        let body = "## Summary\nOld.\n\n## Acceptance Criteria\n- [ ] First\n";
        let mut parsed = parse(body);
        set_section(&mut parsed, "Summary", "New text.");
        let rendered = write(&parsed).unwrap();
        assert_eq!(
            rendered,
            "## Summary\nNew text.\n\n## Acceptance Criteria\n- [ ] First\n"
        );
    }

    #[test]
    fn append_log_entry_creates_sentinel_heading_on_first_use() {
        let body = "## Summary\ntext\n";
        let mut parsed = parse(body);
        assert!(!parsed.has_log_block);
        let ts = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        append_log_entry(
            &mut parsed,
            WorkflowState::Backlog,
            WorkflowState::Planning,
            "alice",
            ts,
            Some("kickoff".to_string()),
        );
        let rendered = write(&parsed).unwrap();
        assert!(rendered.contains("## Log"));
        assert!(rendered.contains("State changed from `backlog` to `planning` by @alice"));
        assert!(rendered.contains("Reason: kickoff"));
    }

    #[test]
    fn body_over_size_ceiling_is_rejected() {
        let huge = "a".repeat(MAX_BODY_CODE_UNITS + 1);
        let err = replace_whole_body(&huge).unwrap_err();
        assert!(matches!(err, WriterError::TooLarge(_)));
    }
}
