//! Preflight validation (spec.md §6's authentication/config rules). Checks
//! that can be decided before any network call is made: credential
//! presence, repository-argument shape, and config structural sanity.

use std::collections::HashSet;

use crate::config::Config;
use crate::error::Error;
use crate::types::IssueKind;

/// Name of the single environment variable the bearer credential is read
/// from (spec.md §6: "never read from or written to disk").
pub const CREDENTIAL_ENV_VAR: &str = "ISSUECTL_TOKEN";

/// A single preflight validation error with actionable context.
#[derive(Debug, Clone, PartialEq)]
pub struct PreflightError {
    /// What condition failed.
    pub condition: String,
    /// Where in the config (or environment) the error originates.
    pub config_location: String,
    /// How to fix it.
    pub suggested_fix: String,
}

impl std::fmt::Display for PreflightError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Preflight error: {}\n  Location: {}\n  Fix: {}",
            self.condition, self.config_location, self.suggested_fix
        )
    }
}

/// Read the bearer credential from the environment. Never touches disk.
pub fn read_credential() -> Result<String, Error> {
    std::env::var(CREDENTIAL_ENV_VAR).map_err(|_| Error::MissingCredential(CREDENTIAL_ENV_VAR.to_string()))
}

/// Validate `owner/repo` shape (spec.md §4.7 step 1). Fails fast — a single
/// malformed argument is a user error, not something worth collecting
/// alongside other checks.
pub fn validate_repo_arg(repo: &str) -> Result<(String, String), Error> {
    let mut parts = repo.splitn(2, '/');
    let owner = parts.next().filter(|s| !s.is_empty());
    let name = parts.next().filter(|s| !s.is_empty());
    match (owner, name) {
        (Some(owner), Some(name)) if !name.contains('/') => Ok((owner.to_string(), name.to_string())),
        _ => Err(Error::RepositoryFormatInvalid(repo.to_string())),
    }
}

/// Run every preflight check that can run before a network call, collecting
/// all failures rather than stopping at the first (spec.md §4.7's `init`:
/// "never fails fast").
pub fn run_preflight(config: &Config) -> Vec<PreflightError> {
    let mut errors = Vec::new();
    errors.extend(check_credential());
    errors.extend(validate_structure(config));
    errors
}

fn check_credential() -> Vec<PreflightError> {
    if std::env::var(CREDENTIAL_ENV_VAR).is_ok() {
        Vec::new()
    } else {
        vec![PreflightError {
            condition: format!("Environment variable {} is not set", CREDENTIAL_ENV_VAR),
            config_location: format!("env:{}", CREDENTIAL_ENV_VAR),
            suggested_fix: format!("Export {} with a valid bearer credential", CREDENTIAL_ENV_VAR),
        }]
    }
}

/// Structural validation beyond what `config::load_config_from` already
/// enforces at parse time: every kind must have at least one required
/// section, and section names must be unique within a kind.
fn validate_structure(config: &Config) -> Vec<PreflightError> {
    let mut errors = Vec::new();

    for kind in [IssueKind::Epic, IssueKind::Task, IssueKind::SubTask] {
        let sections = match config.required_sections.get(&kind) {
            Some(sections) => sections,
            None => {
                errors.push(PreflightError {
                    condition: format!("No required_sections entry for '{}'", kind.label_value()),
                    config_location: format!("required_sections.{}", kind.label_value()),
                    suggested_fix: format!(
                        "Add a required_sections.{} list, or remove the key to use the defaults",
                        kind.label_value()
                    ),
                });
                continue;
            }
        };

        if sections.is_empty() {
            errors.push(PreflightError {
                condition: format!("required_sections.{} is empty", kind.label_value()),
                config_location: format!("required_sections.{}", kind.label_value()),
                suggested_fix: "List at least one section name, or remove the key to use the defaults".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for name in sections {
            if !seen.insert(name.trim().to_lowercase()) {
                errors.push(PreflightError {
                    condition: format!(
                        "Duplicate section name '{}' in required_sections.{}",
                        name,
                        kind.label_value()
                    ),
                    config_location: format!("required_sections.{}", kind.label_value()),
                    suggested_fix: "Remove the duplicate section name".to_string(),
                });
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use crate::config::{ProjectTargetKey, StatusMethod};

    fn sample_config() -> Config {
        let mut required_sections = HashMap::new();
        required_sections.insert(IssueKind::Epic, vec!["Summary".to_string()]);
        required_sections.insert(IssueKind::Task, vec!["Summary".to_string()]);
        required_sections.insert(IssueKind::SubTask, vec!["Summary".to_string()]);
        Config {
            project_url: "https://github.com/acme/svc".to_string(),
            target: ProjectTargetKey::Repository {
                owner: "acme".to_string(),
                repo: "svc".to_string(),
            },
            status_method: StatusMethod::Labels,
            required_sections,
        }
    }

    #[test]
    fn validate_repo_arg_accepts_owner_slash_repo() {
        assert_eq!(
            validate_repo_arg("acme/svc").unwrap(),
            ("acme".to_string(), "svc".to_string())
        );
    }

    #[test]
    fn validate_repo_arg_rejects_missing_slash() {
        assert!(validate_repo_arg("acme").is_err());
    }

    #[test]
    fn validate_repo_arg_rejects_extra_segments() {
        assert!(validate_repo_arg("acme/svc/extra").is_err());
    }

    #[test]
    fn validate_repo_arg_rejects_empty_segments() {
        assert!(validate_repo_arg("/svc").is_err());
        assert!(validate_repo_arg("acme/").is_err());
    }

    #[test]
    fn structure_errors_flag_empty_required_sections() {
        let mut config = sample_config();
        config.required_sections.insert(IssueKind::Task, vec![]);
        let errors = validate_structure(&config);
        assert!(errors
            .iter()
            .any(|e| e.config_location == "required_sections.task"));
    }

    #[test]
    fn structure_errors_flag_duplicate_section_names() {
        let mut config = sample_config();
        config
            .required_sections
            .insert(IssueKind::Epic, vec!["Summary".to_string(), "summary".to_string()]);
        let errors = validate_structure(&config);
        assert!(errors.iter().any(|e| e.condition.contains("Duplicate section name")));
    }

    #[test]
    fn valid_config_has_no_structural_errors() {
        assert!(validate_structure(&sample_config()).is_empty());
    }
}
