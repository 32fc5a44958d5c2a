use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Issue kind / hierarchy ---

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Epic,
    Task,
    SubTask,
    /// The fallback kind for issues the hierarchy does not otherwise type.
    Issue,
}

impl IssueKind {
    /// Label value used when the remote service has no native issue-type
    /// support (`type:<kind>`).
    pub fn label_value(&self) -> &'static str {
        match self {
            IssueKind::Epic => "epic",
            IssueKind::Task => "task",
            IssueKind::SubTask => "sub-task",
            IssueKind::Issue => "issue",
        }
    }

    /// Native issue-type name as understood by the graph transport.
    pub fn type_name(&self) -> &'static str {
        match self {
            IssueKind::Epic => "Epic",
            IssueKind::Task => "Task",
            IssueKind::SubTask => "Sub-task",
            IssueKind::Issue => "Issue",
        }
    }

    pub fn parent_kind(&self) -> Option<IssueKind> {
        match self {
            IssueKind::Epic => None,
            IssueKind::Task => Some(IssueKind::Epic),
            IssueKind::SubTask => Some(IssueKind::Task),
            IssueKind::Issue => None,
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label_value())
    }
}

pub fn parse_issue_kind(s: &str) -> Result<IssueKind, String> {
    match s.to_lowercase().replace('_', "-").as_str() {
        "epic" => Ok(IssueKind::Epic),
        "task" => Ok(IssueKind::Task),
        "sub-task" | "subtask" => Ok(IssueKind::SubTask),
        "issue" => Ok(IssueKind::Issue),
        _ => Err(format!(
            "Invalid issue kind '{}': expected epic, task, sub-task, or issue",
            s
        )),
    }
}

// --- Workflow state ---

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowState {
    #[default]
    Backlog,
    Planning,
    AwaitingPlanApproval,
    PlanApproved,
    InProgress,
    AwaitingCompletionApproval,
    Closed,
}

impl WorkflowState {
    pub fn label_value(&self) -> &'static str {
        match self {
            WorkflowState::Backlog => "backlog",
            WorkflowState::Planning => "planning",
            WorkflowState::AwaitingPlanApproval => "awaiting-plan-approval",
            WorkflowState::PlanApproved => "plan-approved",
            WorkflowState::InProgress => "in-progress",
            WorkflowState::AwaitingCompletionApproval => "awaiting-completion-approval",
            WorkflowState::Closed => "closed",
        }
    }

    pub fn status_label(&self) -> String {
        format!("status:{}", self.label_value())
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label_value())
    }
}

pub fn parse_workflow_state(s: &str) -> Result<WorkflowState, String> {
    match s {
        "backlog" => Ok(WorkflowState::Backlog),
        "planning" => Ok(WorkflowState::Planning),
        "awaiting-plan-approval" => Ok(WorkflowState::AwaitingPlanApproval),
        "plan-approved" => Ok(WorkflowState::PlanApproved),
        "in-progress" => Ok(WorkflowState::InProgress),
        "awaiting-completion-approval" => Ok(WorkflowState::AwaitingCompletionApproval),
        "closed" => Ok(WorkflowState::Closed),
        other => Err(format!("Unknown workflow state label 'status:{}'", other)),
    }
}

/// One row of the workflow transition table (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub name: &'static str,
    pub from: WorkflowState,
    pub to: WorkflowState,
}

pub const TRANSITIONS: &[Transition] = &[
    Transition {
        name: "start-plan",
        from: WorkflowState::Backlog,
        to: WorkflowState::Planning,
    },
    Transition {
        name: "submit-plan",
        from: WorkflowState::Planning,
        to: WorkflowState::AwaitingPlanApproval,
    },
    Transition {
        name: "approve-plan",
        from: WorkflowState::AwaitingPlanApproval,
        to: WorkflowState::PlanApproved,
    },
    Transition {
        name: "start-work",
        from: WorkflowState::PlanApproved,
        to: WorkflowState::InProgress,
    },
    Transition {
        name: "submit-work",
        from: WorkflowState::InProgress,
        to: WorkflowState::AwaitingCompletionApproval,
    },
    Transition {
        name: "approve-work",
        from: WorkflowState::AwaitingCompletionApproval,
        to: WorkflowState::Closed,
    },
];

pub fn find_transition(name: &str) -> Option<&'static Transition> {
    TRANSITIONS.iter().find(|t| t.name == name)
}

// --- Body document model ---

/// A single checkbox line inside a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Todo {
    pub text: String,
    pub checked: bool,
    /// Index into the owning `Section::lines` of the line this todo was
    /// parsed from (or was written to, for todos appended by the writer).
    /// Lets the writer flip a checkbox in place without touching any other
    /// line in the section.
    pub line_index: usize,
}

/// A level-2 heading and the lines up to the next level-2 heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Title exactly as it appeared in the body (`## <title>`).
    pub title: String,
    /// Every line belonging to this section (prose, tables, fenced code,
    /// continuation lines, and todo lines) in original order, verbatim.
    /// Todo lines are duplicated structurally into `todos`, which indexes
    /// back into this vector by `line_index` rather than owning its own
    /// copy of section text.
    pub lines: Vec<String>,
    pub todos: Vec<Todo>,
}

impl Section {
    /// Case-folded title, used as the section's identity key.
    pub fn key(&self) -> String {
        self.title.trim().to_lowercase()
    }
}

/// `{ from_state, to_state, actor, timestamp, message }` — one row of the
/// append-only audit log embedded at the tail of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub from_state: WorkflowState,
    pub to_state: WorkflowState,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub message: Option<String>,
}

/// `{ parent, referenced_tasks }` extracted from the prelude.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct References {
    pub parent: Option<u64>,
    pub referenced_tasks: Vec<u64>,
}

/// The parsed document model produced by the body parser (spec.md §3, §4.1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBody {
    pub prelude: String,
    pub sections: Vec<Section>,
    pub references: References,
    pub log_entries: Vec<LogEntry>,
    /// `true` if a `## Log` sentinel heading was present in the source,
    /// even if it had no entries yet. Lets the writer distinguish
    /// "no log block" from "empty log block" when appending the first entry.
    pub has_log_block: bool,
}

impl ParsedBody {
    pub fn find_section(&self, title: &str) -> Option<&Section> {
        let key = title.trim().to_lowercase();
        self.sections.iter().find(|s| s.key() == key)
    }

    pub fn find_section_mut(&mut self, title: &str) -> Option<&mut Section> {
        let key = title.trim().to_lowercase();
        self.sections.iter_mut().find(|s| s.key() == key)
    }
}

// --- Remote entities ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub number: u64,
    pub node_id: String,
    pub title: String,
    pub body: String,
    pub kind: IssueKind,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub milestone: Option<String>,
    pub open: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: u64,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Milestone {
    pub number: u64,
    pub title: String,
    pub open: bool,
}

/// Which code path satisfied a routed Hybrid Client operation
/// (spec.md §4.5b); surfaced to the caller for scenarios like S2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackUsed {
    None,
    BodyReference,
    LabelBased,
}

impl FallbackUsed {
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            FallbackUsed::None => None,
            FallbackUsed::BodyReference => Some("body-reference"),
            FallbackUsed::LabelBased => Some("label-based"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_issue_kind_normalizes_subtask_spelling() {
        assert_eq!(parse_issue_kind("subtask").unwrap(), IssueKind::SubTask);
        assert_eq!(parse_issue_kind("sub-task").unwrap(), IssueKind::SubTask);
        assert_eq!(parse_issue_kind("Sub_Task").unwrap(), IssueKind::SubTask);
    }

    #[test]
    fn parse_issue_kind_rejects_unknown() {
        assert!(parse_issue_kind("bogus").is_err());
    }

    #[test]
    fn workflow_state_label_round_trips() {
        for state in [
            WorkflowState::Backlog,
            WorkflowState::Planning,
            WorkflowState::AwaitingPlanApproval,
            WorkflowState::PlanApproved,
            WorkflowState::InProgress,
            WorkflowState::AwaitingCompletionApproval,
            WorkflowState::Closed,
        ] {
            let label = state.label_value();
            assert_eq!(parse_workflow_state(label).unwrap(), state);
        }
    }

    #[test]
    fn transition_table_has_one_row_per_named_transition() {
        let names: Vec<&str> = TRANSITIONS.iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "start-plan",
                "submit-plan",
                "approve-plan",
                "start-work",
                "submit-work",
                "approve-work",
            ]
        );
    }

    #[test]
    fn find_transition_is_case_sensitive_and_exact() {
        assert!(find_transition("start-plan").is_some());
        assert!(find_transition("Start-Plan").is_none());
        assert!(find_transition("start_plan").is_none());
    }

    #[test]
    fn section_key_case_folds_and_trims() {
        let section = Section {
            title: "  Acceptance Criteria ".to_string(),
            lines: vec![],
            todos: vec![],
        };
        assert_eq!(section.key(), "acceptance criteria");
    }
}
