//! Project manifest: load and validate (spec.md §3 Config, §6 Configuration file).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::error::Error;
use crate::types::IssueKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusMethod {
    Labels,
    StatusField,
}

/// The `owner/repo` or project-board shape a `project_url` parses into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectTarget {
    Repository { owner: String, repo: String },
    OrgProject { org: String, number: u64 },
    UserProject { user: String, number: u64 },
}

impl ProjectTarget {
    /// Repository-root URLs default to `labels`; project-board URLs default
    /// to `status_field` (spec.md §3's auto-selection rule).
    pub fn default_status_method(&self) -> StatusMethod {
        match self {
            ProjectTarget::Repository { .. } => StatusMethod::Labels,
            ProjectTarget::OrgProject { .. } | ProjectTarget::UserProject { .. } => {
                StatusMethod::StatusField
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    project_url: Option<String>,
    status_method: Option<StatusMethod>,
    #[serde(default)]
    required_sections: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub project_url: String,
    pub target: ProjectTargetKey,
    pub status_method: StatusMethod,
    pub required_sections: HashMap<IssueKind, Vec<String>>,
}

/// `ProjectTarget` without the non-`Eq` `Url` baggage, for `Config`'s
/// derived `PartialEq` (used only by tests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectTargetKey {
    Repository { owner: String, repo: String },
    OrgProject { org: String, number: u64 },
    UserProject { user: String, number: u64 },
}

impl From<ProjectTarget> for ProjectTargetKey {
    fn from(t: ProjectTarget) -> Self {
        match t {
            ProjectTarget::Repository { owner, repo } => {
                ProjectTargetKey::Repository { owner, repo }
            }
            ProjectTarget::OrgProject { org, number } => {
                ProjectTargetKey::OrgProject { org, number }
            }
            ProjectTarget::UserProject { user, number } => {
                ProjectTargetKey::UserProject { user, number }
            }
        }
    }
}

fn default_required_sections() -> HashMap<IssueKind, Vec<String>> {
    let mut map = HashMap::new();
    map.insert(
        IssueKind::Epic,
        vec![
            "Summary".to_string(),
            "Acceptance Criteria".to_string(),
            "Milestone Plan".to_string(),
        ],
    );
    map.insert(
        IssueKind::Task,
        vec![
            "Summary".to_string(),
            "Acceptance Criteria".to_string(),
            "Implementation Plan".to_string(),
        ],
    );
    map.insert(
        IssueKind::SubTask,
        vec!["Summary".to_string(), "Acceptance Criteria".to_string()],
    );
    map
}

/// Parse `project_url` into one of the three accepted shapes (spec.md §6).
pub fn parse_project_url(raw: &str) -> Result<ProjectTarget, Error> {
    let url = Url::parse(raw).map_err(|e| Error::ConfigInvalid {
        file: "project_url".to_string(),
        line: 0,
        reason: format!("not a valid URL: {}", e),
    })?;

    if url.scheme() != "https" {
        return Err(Error::ConfigInvalid {
            file: "project_url".to_string(),
            line: 0,
            reason: "must be an HTTPS URL".to_string(),
        });
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        [owner, repo] => Ok(ProjectTarget::Repository {
            owner: owner.to_string(),
            repo: repo.to_string(),
        }),
        ["orgs", org, "projects", number] => {
            let number = number.parse::<u64>().map_err(|_| Error::ConfigInvalid {
                file: "project_url".to_string(),
                line: 0,
                reason: format!("'{}' is not a valid project number", number),
            })?;
            Ok(ProjectTarget::OrgProject {
                org: org.to_string(),
                number,
            })
        }
        ["users", user, "projects", number] => {
            let number = number.parse::<u64>().map_err(|_| Error::ConfigInvalid {
                file: "project_url".to_string(),
                line: 0,
                reason: format!("'{}' is not a valid project number", number),
            })?;
            Ok(ProjectTarget::UserProject {
                user: user.to_string(),
                number,
            })
        }
        _ => Err(Error::ConfigInvalid {
            file: "project_url".to_string(),
            line: 0,
            reason: "path must be '/<owner>/<repo>', '/orgs/<org>/projects/<n>', or '/users/<user>/projects/<n>'".to_string(),
        }),
    }
}

fn parse_required_sections(
    raw: HashMap<String, Vec<String>>,
) -> Result<HashMap<IssueKind, Vec<String>>, Error> {
    let mut defaults = default_required_sections();
    for (kind_str, sections) in raw {
        let kind =
            crate::types::parse_issue_kind(&kind_str).map_err(|reason| Error::ConfigInvalid {
                file: "required_sections".to_string(),
                line: 0,
                reason,
            })?;
        defaults.insert(kind, sections);
    }
    Ok(defaults)
}

fn build_config(raw: RawConfig) -> Result<Config, Error> {
    let project_url = raw
        .project_url
        .ok_or_else(|| Error::ConfigMissingField("project_url".to_string()))?;

    let target = parse_project_url(&project_url)?;
    let status_method = raw
        .status_method
        .unwrap_or_else(|| target.default_status_method());
    let required_sections = parse_required_sections(raw.required_sections)?;

    Ok(Config {
        project_url,
        target: target.into(),
        status_method,
        required_sections,
    })
}

/// Load config from an explicit path, or the conventional
/// `./issuectl.yaml` in the current directory.
pub fn load_config_from(config_path: Option<&Path>) -> Result<Config, Error> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => Path::new("issuectl.yaml").to_path_buf(),
    };

    if !path.exists() {
        return Err(Error::ConfigMissing(path.display().to_string()));
    }

    let contents = std::fs::read_to_string(&path).map_err(|e| Error::ConfigInvalid {
        file: path.display().to_string(),
        line: 0,
        reason: e.to_string(),
    })?;

    let raw: RawConfig = serde_yaml_ng::from_str(&contents).map_err(|e| Error::ConfigInvalid {
        file: path.display().to_string(),
        line: e.location().map(|l| l.line()).unwrap_or(0),
        reason: e.to_string(),
    })?;

    build_config(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repository_url() {
        let target = parse_project_url("https://github.com/acme/svc").unwrap();
        assert_eq!(
            target,
            ProjectTarget::Repository {
                owner: "acme".to_string(),
                repo: "svc".to_string(),
            }
        );
        assert_eq!(target.default_status_method(), StatusMethod::Labels);
    }

    #[test]
    fn parses_org_project_url() {
        let target = parse_project_url("https://github.com/orgs/acme/projects/7").unwrap();
        assert_eq!(
            target,
            ProjectTarget::OrgProject {
                org: "acme".to_string(),
                number: 7,
            }
        );
        assert_eq!(target.default_status_method(), StatusMethod::StatusField);
    }

    #[test]
    fn parses_user_project_url() {
        let target = parse_project_url("https://github.com/users/alice/projects/3").unwrap();
        assert_eq!(
            target,
            ProjectTarget::UserProject {
                user: "alice".to_string(),
                number: 3,
            }
        );
    }

    #[test]
    fn rejects_non_https() {
        assert!(parse_project_url("http://github.com/acme/svc").is_err());
    }

    #[test]
    fn rejects_unrecognised_path_shape() {
        assert!(parse_project_url("https://github.com/acme/svc/extra").is_err());
    }

    #[test]
    fn missing_project_url_is_config_missing_field() {
        let raw = RawConfig {
            project_url: None,
            status_method: None,
            required_sections: HashMap::new(),
        };
        let err = build_config(raw).unwrap_err();
        assert!(matches!(err, Error::ConfigMissingField(f) if f == "project_url"));
    }

    #[test]
    fn default_required_sections_cover_all_three_kinds() {
        let raw = RawConfig {
            project_url: Some("https://github.com/acme/svc".to_string()),
            status_method: None,
            required_sections: HashMap::new(),
        };
        let config = build_config(raw).unwrap();
        assert_eq!(
            config.required_sections.get(&IssueKind::Epic).unwrap(),
            &vec!["Summary", "Acceptance Criteria", "Milestone Plan"]
        );
        assert_eq!(
            config.required_sections.get(&IssueKind::Task).unwrap(),
            &vec!["Summary", "Acceptance Criteria", "Implementation Plan"]
        );
        assert_eq!(
            config.required_sections.get(&IssueKind::SubTask).unwrap(),
            &vec!["Summary", "Acceptance Criteria"]
        );
    }

    #[test]
    fn explicit_status_method_overrides_url_default() {
        let raw = RawConfig {
            project_url: Some("https://github.com/acme/svc".to_string()),
            status_method: Some(StatusMethod::StatusField),
            required_sections: HashMap::new(),
        };
        let config = build_config(raw).unwrap();
        assert_eq!(config.status_method, StatusMethod::StatusField);
    }
}
