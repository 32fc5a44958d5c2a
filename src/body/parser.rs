//! A single forward pass over lines with a small state machine:
//! `{prelude, in-section, in-log-block}` (spec.md §4.1).
//!
//! Never fails: malformed constructs degrade gracefully rather than
//! producing an error. Fenced code blocks are the only opaque region —
//! heading and todo detection are both suspended while inside one.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::types::{LogEntry, ParsedBody, References, Section, Todo};

fn parent_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^\*\*Parent:?\*\*\s*#(\d+)").expect("static regex is valid")
    })
}

fn task_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^- \[.\]\s*#(\d+)").expect("static regex is valid"))
}

fn todo_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^- \[([ xX])\] (.*)$").expect("static regex is valid"))
}

fn log_transition_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^State changed from `([^`]+)` to `([^`]+)` by @(.+)$")
            .expect("static regex is valid")
    })
}

const LOG_SENTINEL: &str = "log";

fn is_section_heading(line: &str) -> bool {
    line.starts_with("## ")
}

fn is_fence_toggle(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// Parse a raw issue body into a `ParsedBody`. Never fails.
pub fn parse(body: &str) -> ParsedBody {
    // Normalise line endings for scanning; the writer only ever emits `\n`,
    // so this only affects hand-edited bodies, not the round-trip property.
    let normalized = body.replace("\r\n", "\n");
    let mut lines: Vec<&str> = if normalized.is_empty() {
        Vec::new()
    } else {
        normalized.split('\n').collect()
    };
    // A trailing `\n` produces one synthetic empty element from `split` that
    // marks line termination, not a blank line of content -- drop it so the
    // writer doesn't reintroduce a blank line that was never there.
    if normalized.ends_with('\n') {
        lines.pop();
    }

    let mut prelude_lines: Vec<&str> = Vec::new();
    let mut sections: Vec<Section> = Vec::new();
    let mut log_lines: Vec<&str> = Vec::new();
    let mut has_log_block = false;

    #[derive(PartialEq)]
    enum State {
        Prelude,
        Section,
        Log,
    }
    let mut state = State::Prelude;
    let mut in_fence = false;

    for raw_line in lines {
        if !in_fence && is_section_heading(raw_line) {
            let title = raw_line[3..].trim().to_string();
            if title.trim().to_lowercase() == LOG_SENTINEL {
                has_log_block = true;
                state = State::Log;
            } else {
                sections.push(Section {
                    title,
                    lines: Vec::new(),
                    todos: Vec::new(),
                });
                state = State::Section;
            }
            in_fence = false;
            continue;
        }

        if is_fence_toggle(raw_line) {
            in_fence = !in_fence;
        }

        match state {
            State::Prelude => prelude_lines.push(raw_line),
            State::Section => {
                let section = sections.last_mut().expect("Section state implies a section exists");
                let line_index = section.lines.len();
                if !in_fence {
                    if let Some(caps) = todo_line_regex().captures(raw_line) {
                        let checked = matches!(&caps[1], "x" | "X");
                        let text = caps[2].trim().to_string();
                        section.todos.push(Todo {
                            text,
                            checked,
                            line_index,
                        });
                    }
                }
                section.lines.push(raw_line.to_string());
            }
            State::Log => log_lines.push(raw_line),
        }
    }

    let prelude = prelude_lines.join("\n");
    let references = extract_references(&prelude);
    let log_entries = parse_log_block(&log_lines);

    ParsedBody {
        prelude,
        sections,
        references,
        log_entries,
        has_log_block,
    }
}

fn extract_references(prelude: &str) -> References {
    let parent = parent_ref_regex()
        .captures(prelude)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok());

    let referenced_tasks = task_ref_regex()
        .captures_iter(prelude)
        .filter_map(|c| c.get(1))
        .filter_map(|m| m.as_str().parse::<u64>().ok())
        .collect();

    References {
        parent,
        referenced_tasks,
    }
}

/// Parse the log block's own line grammar: each entry is a `### <ts>`
/// heading, a `State changed from ... by @actor` line, and an optional
/// `Reason: ...` line running until the next `### ` heading or end of body.
fn parse_log_block(lines: &[&str]) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if let Some(rest) = line.strip_prefix("### ") {
            let timestamp = match DateTime::parse_from_rfc3339(rest.trim()) {
                Ok(dt) => dt.with_timezone(&Utc),
                Err(_) => {
                    i += 1;
                    continue;
                }
            };
            i += 1;
            let transition_line = lines.get(i).copied().unwrap_or("");
            let Some(caps) = log_transition_regex().captures(transition_line) else {
                // Malformed entry body -- skip past this heading only.
                continue;
            };
            let from_state = match crate::types::parse_workflow_state(&caps[1]) {
                Ok(s) => s,
                Err(_) => {
                    i += 1;
                    continue;
                }
            };
            let to_state = match crate::types::parse_workflow_state(&caps[2]) {
                Ok(s) => s,
                Err(_) => {
                    i += 1;
                    continue;
                }
            };
            let actor = caps[3].trim().to_string();
            i += 1;

            let mut message_lines = Vec::new();
            while i < lines.len() && !lines[i].starts_with("### ") {
                message_lines.push(lines[i]);
                i += 1;
            }
            let message = message_lines
                .iter()
                .find_map(|l| l.strip_prefix("Reason: "))
                .map(|m| m.trim().to_string());

            entries.push(LogEntry {
                from_state,
                to_state,
                actor,
                timestamp,
                message,
            });
        } else {
            i += 1;
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorkflowState;

    #[test]
    fn empty_body_yields_empty_document() {
        let parsed = parse("");
        assert_eq!(parsed.prelude, "");
        assert!(parsed.sections.is_empty());
        assert!(parsed.log_entries.is_empty());
        assert!(!parsed.has_log_block);
    }

    #[test]
    fn body_with_no_section_headings_is_all_prelude() {
        let parsed = parse("Just some hand-written text.\nNo headings here.");
        assert_eq!(parsed.prelude, "Just some hand-written text.\nNo headings here.");
        assert!(parsed.sections.is_empty());
    }

    #[test]
    fn parses_sections_and_todos_in_order() {
        let body = "Intro text.\n\n## Summary\nSome summary.\n\n## Acceptance Criteria\n- [ ] First\n- [x] Second\n";
        let parsed = parse(body);
        assert_eq!(parsed.prelude, "Intro text.\n");
        assert_eq!(parsed.sections.len(), 2);
        assert_eq!(parsed.sections[0].title, "Summary");
        assert_eq!(parsed.sections[1].title, "Acceptance Criteria");
        let todos = &parsed.sections[1].todos;
        assert_eq!(todos.len(), 2);
        assert_eq!(todos[0].text, "First");
        assert!(!todos[0].checked);
        assert_eq!(todos[1].text, "Second");
        assert!(todos[1].checked);
    }

    #[test]
    fn deeper_headings_are_opaque_section_content() {
        let body = "## Summary\n### A subheading\nSome text under it.\n";
        let parsed = parse(body);
        assert_eq!(parsed.sections.len(), 1);
        assert!(parsed.sections[0]
            .lines
            .iter()
            .any(|l| l == "### A subheading"));
    }

    #[test]
    fn todo_inside_fenced_code_block_is_not_a_todo() {
        let body = "## Notes\n```\n- [ ] foo\n```\nreal text\n";
        let parsed = parse(body);
        assert_eq!(parsed.sections[0].todos.len(), 0);
        assert!(parsed.sections[0].lines.contains(&"- [ ] foo".to_string()));
    }

    #[test]
    fn parent_reference_extracted_from_prelude() {
        let body = "**Parent:** #10\n\n## Summary\ntext\n";
        let parsed = parse(body);
        assert_eq!(parsed.references.parent, Some(10));
    }

    #[test]
    fn parent_reference_tolerates_flexible_bold_markers_and_case() {
        let body = "**parent** #42\n\n## Summary\ntext\n";
        let parsed = parse(body);
        assert_eq!(parsed.references.parent, Some(42));
    }

    #[test]
    fn epic_prelude_extracts_referenced_tasks() {
        let body = "- [ ] #101\n- [x] #102\n\n## Summary\ntext\n";
        let parsed = parse(body);
        assert_eq!(parsed.references.referenced_tasks, vec![101, 102]);
    }

    #[test]
    fn explicit_parent_wins_over_mentions() {
        let body = "**Parent:** #5\n- [ ] #9\n\n## Summary\ntext\n";
        let parsed = parse(body);
        assert_eq!(parsed.references.parent, Some(5));
        assert_eq!(parsed.references.referenced_tasks, vec![9]);
    }

    #[test]
    fn parses_log_block_entries() {
        let body = "## Summary\ntext\n\n## Log\n### 2026-01-01T00:00:00Z\nState changed from `backlog` to `planning` by @alice\nReason: kickoff\n### 2026-01-02T00:00:00Z\nState changed from `planning` to `awaiting-plan-approval` by @alice\n";
        let parsed = parse(body);
        assert!(parsed.has_log_block);
        assert_eq!(parsed.log_entries.len(), 2);
        assert_eq!(parsed.log_entries[0].from_state, WorkflowState::Backlog);
        assert_eq!(parsed.log_entries[0].to_state, WorkflowState::Planning);
        assert_eq!(parsed.log_entries[0].actor, "alice");
        assert_eq!(parsed.log_entries[0].message.as_deref(), Some("kickoff"));
        assert_eq!(parsed.log_entries[1].message, None);
    }

    #[test]
    fn log_entry_without_reason_has_no_message() {
        let body = "## Log\n### 2026-01-01T00:00:00Z\nState changed from `backlog` to `planning` by @bob\n";
        let parsed = parse(body);
        assert_eq!(parsed.log_entries[0].message, None);
    }
}
