//! Error taxonomy (spec.md §7). One enum, mapped to the six process exit
//! codes and to the user-visible `{title, reason, valid_options}` envelope.

use crate::types::{IssueKind, WorkflowState};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --- Auth (exit 3) ---
    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("Invalid credential: the remote service rejected it")]
    InvalidCredential,

    // --- Config (exit 1) ---
    #[error("Config file not found at {0}")]
    ConfigMissing(String),

    #[error("Config file {file} is invalid at line {line}: {reason}")]
    ConfigInvalid {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("Config is missing required field '{0}'")]
    ConfigMissingField(String),

    // --- Remote access (exit 2, except RepositoryFormatInvalid which is a
    // user error) ---
    #[error("Repository '{0}' is not in 'owner/repo' shape")]
    RepositoryFormatInvalid(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Issue #{0} not found")]
    IssueNotFound(u64),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited, retry after {0:?}")]
    RateLimited(std::time::Duration),

    #[error("Network error: {0}")]
    NetworkError(String),

    // --- Feature detection (caller decides: fallback, or exit 2) ---
    #[error("Feature '{0}' is unavailable on this remote service")]
    FeatureUnavailable(String),

    // --- Workflow (exit 4) ---
    #[error("Illegal transition: issue is in state '{current}', cannot apply transition expecting '{attempted}'")]
    IllegalTransition {
        current: WorkflowState,
        attempted: WorkflowState,
    },

    #[error("Required section(s) missing: {}", .0.join(", "))]
    RequiredSectionMissing(Vec<String>),

    #[error("Completion blocked: {} open child issue(s), {} unchecked todo(s)", .open_children.len(), .unchecked_todos.len())]
    CompletionBlocked {
        open_children: Vec<u64>,
        unchecked_todos: Vec<(String, String)>,
    },

    // --- Body edit (exit 4) ---
    #[error("Duplicate todo: '{0}' already exists in this section")]
    DuplicateTodo(String),

    #[error("Section '{0}' not found")]
    SectionNotFound(String, Vec<String>),

    #[error("Ambiguous match for '{0}': {1:?}")]
    AmbiguousMatch(String, Vec<String>),

    // --- Writer (exit 1) ---
    #[error("Body exceeds the {0}-code-unit size ceiling")]
    BodyTooLarge(usize),

    // --- Hierarchy (exit 2) ---
    #[error("Relationship required but step '{0}' failed; orphan issue was rolled back")]
    RelationshipRequired(String),

    #[error("Parent is of kind {actual}, expected {expected}")]
    ParentNotOfExpectedKind {
        expected: IssueKind,
        actual: IssueKind,
    },

    // --- Internal (exit 5) ---
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ConfigMissing(_)
            | Error::ConfigInvalid { .. }
            | Error::ConfigMissingField(_)
            | Error::RepositoryFormatInvalid(_)
            | Error::InvalidArgument(_)
            | Error::DuplicateTodo(_)
            | Error::SectionNotFound(_, _)
            | Error::AmbiguousMatch(_, _)
            | Error::BodyTooLarge(_) => 1,

            Error::IssueNotFound(_)
            | Error::Forbidden(_)
            | Error::Timeout(_)
            | Error::RateLimited(_)
            | Error::NetworkError(_)
            | Error::FeatureUnavailable(_)
            | Error::RelationshipRequired(_) => 2,

            Error::MissingCredential(_) | Error::InvalidCredential => 3,

            Error::IllegalTransition { .. }
            | Error::RequiredSectionMissing(_)
            | Error::CompletionBlocked { .. }
            | Error::ParentNotOfExpectedKind { .. } => 4,

            Error::InternalError(_) => 5,
        }
    }

    /// A short remediation hint shown alongside the error title (spec.md §7).
    pub fn remediation_hint(&self) -> Option<String> {
        match self {
            Error::MissingCredential(var) => Some(format!("Set the {} environment variable", var)),
            Error::ConfigMissing(path) => Some(format!("Create a config file at {}", path)),
            Error::ConfigMissingField(field) => {
                Some(format!("Add '{}' to the config file", field))
            }
            Error::RepositoryFormatInvalid(_) => {
                Some("Pass --repo in 'owner/repo' shape, or set project_url in config".to_string())
            }
            Error::RateLimited(d) => Some(format!("Retry after {:?}", d)),
            Error::FeatureUnavailable(feature) => Some(format!(
                "The remote service does not support '{}'; a fallback path may apply",
                feature
            )),
            Error::RequiredSectionMissing(names) => {
                Some(format!("Fill in section(s): {}", names.join(", ")))
            }
            _ => None,
        }
    }

    /// List of valid alternatives for errors that name one (spec.md §7's
    /// `valid_options`).
    pub fn valid_options(&self) -> Option<Vec<String>> {
        match self {
            Error::SectionNotFound(_, available) => Some(available.clone()),
            Error::AmbiguousMatch(_, candidates) => Some(candidates.clone()),
            Error::CompletionBlocked { open_children, .. } => {
                Some(open_children.iter().map(|n| format!("#{}", n)).collect())
            }
            _ => None,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Error::MissingCredential(_) => "Missing credential",
            Error::InvalidCredential => "Invalid credential",
            Error::ConfigMissing(_) => "Config missing",
            Error::ConfigInvalid { .. } => "Config invalid",
            Error::ConfigMissingField(_) => "Config missing field",
            Error::RepositoryFormatInvalid(_) => "Invalid repository",
            Error::InvalidArgument(_) => "Invalid argument",
            Error::IssueNotFound(_) => "Issue not found",
            Error::Forbidden(_) => "Forbidden",
            Error::Timeout(_) => "Timeout",
            Error::RateLimited(_) => "Rate limited",
            Error::NetworkError(_) => "Network error",
            Error::FeatureUnavailable(_) => "Feature unavailable",
            Error::IllegalTransition { .. } => "Illegal transition",
            Error::RequiredSectionMissing(_) => "Required section missing",
            Error::CompletionBlocked { .. } => "Completion blocked",
            Error::DuplicateTodo(_) => "Duplicate todo",
            Error::SectionNotFound(_, _) => "Section not found",
            Error::AmbiguousMatch(_, _) => "Ambiguous match",
            Error::BodyTooLarge(_) => "Body too large",
            Error::RelationshipRequired(_) => "Relationship required",
            Error::ParentNotOfExpectedKind { .. } => "Parent not of expected kind",
            Error::InternalError(_) => "Internal error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
