//! Command Layer (spec.md §4.7): one free function per verb, sharing a
//! small base of repository validation, Hybrid Client construction, and
//! label/milestone/assignee resolution — composition, not a `Command`
//! trait hierarchy (spec.md §9's redesign note).

pub mod body_edit;
pub mod create;
pub mod get;
pub mod init;
pub mod list;
pub mod transitions;

use reqwest::Client;
use url::Url;

use crate::client::HybridClient;
use crate::config::{Config, ProjectTargetKey};
use crate::error::Error;
use crate::preflight;
use crate::transport::graph::GraphTransport;
use crate::transport::rest::RestTransport;

/// Shared context every command function is handed: the resolved
/// `(owner, repo)`, the loaded config, and a freshly built Hybrid Client
/// (spec.md §4.7 step 1-2).
pub struct CommandContext {
    pub owner: String,
    pub repo: String,
    pub config: Config,
    pub client: HybridClient,
}

impl CommandContext {
    /// Resolve the repository from an explicit `--repo` argument, falling
    /// back to the config's `project_url` target, then build the Hybrid
    /// Client against it.
    pub fn build(config: Config, repo_arg: Option<&str>) -> Result<Self, Error> {
        let (owner, repo) = match repo_arg {
            Some(explicit) => preflight::validate_repo_arg(explicit)?,
            None => match &config.target {
                ProjectTargetKey::Repository { owner, repo } => (owner.clone(), repo.clone()),
                ProjectTargetKey::OrgProject { org, .. } => {
                    return Err(Error::RepositoryFormatInvalid(format!(
                        "config target is an org project board ('{}'); pass --repo explicitly",
                        org
                    )))
                }
                ProjectTargetKey::UserProject { user, .. } => {
                    return Err(Error::RepositoryFormatInvalid(format!(
                        "config target is a user project board ('{}'); pass --repo explicitly",
                        user
                    )))
                }
            },
        };

        let token = preflight::read_credential()?;
        let rest_base = Url::parse("https://api.github.com/").map_err(|e| {
            Error::InternalError(format!("built-in REST base URL failed to parse: {}", e))
        })?;
        let graph_endpoint = Url::parse("https://api.github.com/graphql").map_err(|e| {
            Error::InternalError(format!("built-in graph endpoint failed to parse: {}", e))
        })?;

        let http = Client::builder()
            .timeout(crate::transport::DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::InternalError(format!("failed to build HTTP client: {}", e)))?;

        let rest = RestTransport::new(http.clone(), rest_base, token.clone());
        let graph = GraphTransport::new(http, graph_endpoint, token);
        let client = HybridClient::new(rest, graph);

        Ok(CommandContext {
            owner,
            repo,
            config,
            client,
        })
    }
}

/// Text supplied inline, via a file, or via stdin — exactly one of the
/// three, per spec.md §6 ("mutually exclusive, all three supported").
pub enum TextSource {
    Inline(String),
    File(std::path::PathBuf),
    Stdin,
}

impl TextSource {
    pub fn resolve(self) -> Result<String, Error> {
        match self {
            TextSource::Inline(s) => Ok(s),
            TextSource::File(path) => std::fs::read_to_string(&path).map_err(|e| {
                Error::InternalError(format!("failed to read {}: {}", path.display(), e))
            }),
            TextSource::Stdin => {
                use std::io::Read;
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .map_err(|e| Error::InternalError(format!("failed to read stdin: {}", e)))?;
                Ok(buf)
            }
        }
    }
}

/// Always include `status:backlog` at creation time (spec.md §4.7 step 3).
pub fn default_creation_labels(kind: crate::types::IssueKind, extra: &[String]) -> Vec<String> {
    let mut labels = vec![
        crate::types::WorkflowState::Backlog.status_label(),
        format!("type:{}", kind.label_value()),
    ];
    labels.extend(extra.iter().cloned());
    labels
}

/// Resolve a milestone by title, creating it if the repo has none by that
/// name — mirrors how `create_label` is used for idempotent label setup.
pub async fn resolve_milestone(
    ctx: &CommandContext,
    title: Option<&str>,
) -> Result<Option<String>, Error> {
    let Some(title) = title else { return Ok(None) };
    let existing = ctx.client.rest().list_milestones(&ctx.owner, &ctx.repo).await?;
    if let Some(found) = existing.iter().find(|m| m.title == title) {
        return Ok(Some(found.title.clone()));
    }
    let created = ctx
        .client
        .rest()
        .create_milestone(&ctx.owner, &ctx.repo, title)
        .await?;
    Ok(Some(created.title))
}

/// Default body template for a kind with no explicit body override
/// (spec.md §4.7: "generate the default body from the template matching
/// the kind if none provided").
pub fn default_body_template(kind: crate::types::IssueKind, required_sections: &[String]) -> String {
    let mut body = String::new();
    for section in required_sections {
        body.push_str("## ");
        body.push_str(section);
        body.push('\n');
        body.push_str("_TODO: fill in._\n\n");
    }
    if kind == crate::types::IssueKind::Epic {
        body.push_str("## Tasks\n");
    }
    body
}

/// Inject `**Parent:** #N` into the prelude of a custom body if the writer
/// didn't already include one (spec.md §4.7: create-task/create-sub-task).
pub fn ensure_parent_reference(body: &str, parent_number: u64) -> String {
    let parsed = crate::body::parse(body);
    if parsed.references.parent.is_some() {
        return body.to_string();
    }
    format!("**Parent:** #{}\n\n{}", parent_number, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IssueKind;

    #[test]
    fn default_creation_labels_always_includes_status_backlog() {
        let labels = default_creation_labels(IssueKind::Task, &["extra".to_string()]);
        assert!(labels.contains(&"status:backlog".to_string()));
        assert!(labels.contains(&"type:task".to_string()));
        assert!(labels.contains(&"extra".to_string()));
    }

    #[test]
    fn default_body_template_renders_one_heading_per_required_section() {
        let sections = vec!["Summary".to_string(), "Acceptance Criteria".to_string()];
        let body = default_body_template(IssueKind::Task, &sections);
        assert!(body.contains("## Summary\n"));
        assert!(body.contains("## Acceptance Criteria\n"));
    }

    #[test]
    fn ensure_parent_reference_is_idempotent() {
        let already_has_one = "**Parent:** #5\n\n## Summary\ntext\n";
        assert_eq!(ensure_parent_reference(already_has_one, 9), already_has_one);
    }

    #[test]
    fn ensure_parent_reference_injects_when_missing() {
        let body = "## Summary\ntext\n";
        let result = ensure_parent_reference(body, 9);
        assert!(result.starts_with("**Parent:** #9\n"));
        assert!(result.contains("## Summary\ntext\n"));
    }
}
