//! The Hybrid Client (spec.md §4.5) — the one part of the system that knows
//! both transports exist. Feature probing, preferred/fallback routing,
//! node-ID translation, and rollback on partial failure all live here.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::body;
use crate::config::{ProjectTargetKey, StatusMethod};
use crate::error::Error;
use crate::log_warn;
use crate::transport::graph::GraphTransport;
use crate::transport::rest::RestTransport;
use crate::types::{FallbackUsed, Issue, IssueKind, WorkflowState};

/// Capacity of the node-ID cache: one command invocation's worth of lookups,
/// not a long-lived store. A plain map + insertion-order queue, not an
/// external LRU crate (spec.md §4.5d).
const NODE_ID_CACHE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Feature {
    SubIssues,
    IssueTypes,
    ProjectsV2,
}

impl Feature {
    fn tag(&self) -> &'static str {
        match self {
            Feature::SubIssues => "sub_issues",
            Feature::IssueTypes => "issue_types",
            Feature::ProjectsV2 => "projects_v2",
        }
    }

    fn from_tag(tag: &str) -> Option<Feature> {
        match tag {
            "sub_issues" => Some(Feature::SubIssues),
            "issue_types" => Some(Feature::IssueTypes),
            "projects_v2" => Some(Feature::ProjectsV2),
            _ => None,
        }
    }
}

/// Probed-once-per-process cache of `feature -> available` (spec.md §4.5a).
#[derive(Default)]
struct FeatureCache {
    known: HashMap<Feature, bool>,
}

/// Bounded node-ID cache keyed by `(owner, repo, number)`.
#[derive(Default)]
struct NodeIdCache {
    map: HashMap<(String, String, u64), String>,
    order: VecDeque<(String, String, u64)>,
}

impl NodeIdCache {
    fn get(&self, key: &(String, String, u64)) -> Option<String> {
        self.map.get(key).cloned()
    }

    fn insert(&mut self, key: (String, String, u64), node_id: String) {
        if !self.map.contains_key(&key) {
            self.order.push_back(key.clone());
            if self.order.len() > NODE_ID_CACHE_CAPACITY {
                if let Some(oldest) = self.order.pop_front() {
                    self.map.remove(&oldest);
                }
            }
        }
        self.map.insert(key, node_id);
    }
}

/// The outcome of a composite typed-child creation (spec.md §4.5c).
pub struct CreatedChild {
    pub issue: Issue,
    pub fallback: FallbackUsed,
}

pub struct HybridClient {
    rest: RestTransport,
    graph: GraphTransport,
    features: Mutex<FeatureCache>,
    node_ids: Mutex<NodeIdCache>,
}

impl HybridClient {
    pub fn new(rest: RestTransport, graph: GraphTransport) -> Self {
        Self {
            rest,
            graph,
            features: Mutex::new(FeatureCache::default()),
            node_ids: Mutex::new(NodeIdCache::default()),
        }
    }

    pub fn rest(&self) -> &RestTransport {
        &self.rest
    }

    pub fn graph(&self) -> &GraphTransport {
        &self.graph
    }

    /// Probe (or recall) whether a feature is available. A probe never
    /// crashes the caller: any error during probing is treated as
    /// pessimistic `unavailable` (spec.md §4.5a).
    async fn feature_available(&self, feature: Feature, owner: &str) -> bool {
        if let Some(known) = self.features.lock().unwrap().known.get(&feature).copied() {
            return known;
        }
        let available = match feature {
            Feature::IssueTypes => self.graph.list_issue_types(owner).await.is_ok(),
            Feature::SubIssues | Feature::ProjectsV2 => {
                // No cheap standalone probe exists for these; conservatively
                // assume available and let the first real call demote the
                // cache entry on a `FeatureUnavailable` response.
                true
            }
        };
        self.features.lock().unwrap().known.insert(feature, available);
        available
    }

    fn mark_unavailable(&self, feature: Feature) {
        self.features.lock().unwrap().known.insert(feature, false);
    }

    /// `resolve(owner, repo, number) -> node_id` with the per-command cache
    /// (spec.md §4.5d).
    pub async fn resolve_node_id(&self, owner: &str, repo: &str, number: u64) -> Result<String, Error> {
        let key = (owner.to_string(), repo.to_string(), number);
        if let Some(cached) = self.node_ids.lock().unwrap().get(&key) {
            return Ok(cached);
        }
        let node_id = self.graph.resolve_node_id(owner, repo, number).await?;
        self.node_ids.lock().unwrap().insert(key, node_id.clone());
        Ok(node_id)
    }

    /// Create a typed, linked child issue: create -> optionally set type ->
    /// optionally link edge, with rollback if the edge is required and the
    /// link step hard-fails (spec.md §4.5b/c).
    #[allow(clippy::too_many_arguments)]
    pub async fn create_typed_child(
        &self,
        owner: &str,
        repo: &str,
        kind: IssueKind,
        title: &str,
        body_text: &str,
        parent_number: u64,
        relationship_required: bool,
    ) -> Result<CreatedChild, Error> {
        let issue_types_available = self.feature_available(Feature::IssueTypes, owner).await;

        let mut issue = if issue_types_available {
            match self
                .graph
                .create_issue_with_type(owner, repo, title, body_text, kind.type_name())
                .await
            {
                Ok(issue) => issue,
                Err(Error::FeatureUnavailable(tag)) => {
                    if let Some(f) = Feature::from_tag(&tag) {
                        self.mark_unavailable(f);
                    }
                    self.create_via_rest_label(owner, repo, title, body_text, kind)
                        .await?
                }
                Err(e) => return Err(e),
            }
        } else {
            self.create_via_rest_label(owner, repo, title, body_text, kind)
                .await?
        };

        let parent_node_id = self.resolve_node_id(owner, repo, parent_number).await?;
        let child_node_id = issue.node_id.clone();

        let sub_issues_available = self.feature_available(Feature::SubIssues, owner).await;
        let edge_result = if sub_issues_available {
            self.graph
                .add_sub_issue_edge(&parent_node_id, &child_node_id)
                .await
        } else {
            Err(Error::FeatureUnavailable("sub_issues".to_string()))
        };

        match edge_result {
            Ok(()) => Ok(CreatedChild {
                issue,
                fallback: FallbackUsed::None,
            }),
            Err(Error::FeatureUnavailable(tag)) => {
                if let Some(f) = Feature::from_tag(&tag) {
                    self.mark_unavailable(f);
                }
                log_warn!(
                    "sub-issue edge unavailable for {}#{}, falling back to body-reference parent link",
                    repo,
                    issue.number
                );
                self.link_parent_via_body(owner, repo, &mut issue, parent_number)
                    .await?;
                Ok(CreatedChild {
                    issue,
                    fallback: FallbackUsed::BodyReference,
                })
            }
            Err(hard_error) => {
                if relationship_required {
                    self.rollback_orphan(owner, repo, issue.number).await;
                    Err(Error::RelationshipRequired("add_sub_issue_edge".to_string()))
                } else {
                    Err(hard_error)
                }
            }
        }
    }

    async fn create_via_rest_label(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body_text: &str,
        kind: IssueKind,
    ) -> Result<Issue, Error> {
        let labels = vec![
            "status:backlog".to_string(),
            format!("type:{}", kind.label_value()),
        ];
        self.rest.create_issue(owner, repo, title, body_text, &labels).await
    }

    async fn link_parent_via_body(
        &self,
        owner: &str,
        repo: &str,
        issue: &mut Issue,
        parent_number: u64,
    ) -> Result<(), Error> {
        let mut parsed = body::parse(&issue.body);
        if parsed.references.parent.is_none() {
            let parent_line = format!("**Parent:** #{}\n", parent_number);
            parsed.prelude = format!("{}{}", parent_line, parsed.prelude);
            parsed.references.parent = Some(parent_number);
        }
        let new_body = body::write(&parsed).map_err(|e| Error::BodyTooLarge(match e {
            body::WriterError::TooLarge(n) => n,
            _ => 0,
        }))?;
        self.rest
            .update_issue_body(owner, repo, issue.number, &new_body)
            .await?;
        issue.body = new_body;
        Ok(())
    }

    /// Compensating mutation for a failed composite create (spec.md §4.5c):
    /// the orphaned child is closed so it never lingers as an untyped, unlinked
    /// issue. Closing an already-closed issue is a no-op, so this never fails
    /// the overall command even if called twice.
    async fn rollback_orphan(&self, owner: &str, repo: &str, number: u64) {
        if let Err(e) = self
            .rest
            .update_issue_body(owner, repo, number, "_(orphaned by a failed hierarchy link; closed by issuectl)_")
            .await
        {
            log_warn!("rollback body update for {}#{} failed: {}", repo, number, e);
        }
        if let Err(e) = self.rest.add_labels(owner, repo, number, &["rollback:orphaned".to_string()]).await {
            log_warn!("rollback labeling for {}#{} failed: {}", repo, number, e);
        }
        if let Err(e) = self.rest.set_issue_state(owner, repo, number, false).await {
            log_warn!("rollback close for {}#{} failed: {}", repo, number, e);
        }
    }

    /// Resolve an issue's typed kind, preferring the kind the transport
    /// already resolved (native issue type), falling back to label-based
    /// inference (spec.md §4.5b).
    pub fn resolve_kind(&self, issue: &Issue) -> IssueKind {
        issue
            .labels
            .iter()
            .find_map(|l| l.strip_prefix("type:"))
            .and_then(|k| crate::types::parse_issue_kind(k).ok())
            .unwrap_or(issue.kind)
    }

    /// Set the workflow status on the backend chosen by config, degrading
    /// from `status_field` to labels when the project field is unavailable
    /// (spec.md §4.5b).
    pub async fn set_workflow_state(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        current_labels: &[String],
        method: StatusMethod,
        target: &ProjectTargetKey,
        to_state: WorkflowState,
    ) -> Result<StatusMethod, Error> {
        match method {
            StatusMethod::Labels => {
                self.swap_status_label(owner, repo, number, current_labels, to_state)
                    .await?;
                Ok(StatusMethod::Labels)
            }
            StatusMethod::StatusField => {
                let projects_available = self.feature_available(Feature::ProjectsV2, owner).await;
                if projects_available {
                    match self.set_status_field(owner, repo, number, target, to_state).await {
                        Ok(()) => Ok(StatusMethod::StatusField),
                        Err(Error::FeatureUnavailable(_)) => {
                            self.mark_unavailable(Feature::ProjectsV2);
                            log_warn!(
                                "project status field unavailable for {}#{}, degrading to labels",
                                repo,
                                number
                            );
                            self.swap_status_label(owner, repo, number, current_labels, to_state)
                                .await?;
                            Ok(StatusMethod::Labels)
                        }
                        Err(e) => Err(e),
                    }
                } else {
                    Err(Error::FeatureUnavailable("projects_v2".to_string()))
                }
            }
        }
    }

    async fn swap_status_label(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        current_labels: &[String],
        to_state: WorkflowState,
    ) -> Result<(), Error> {
        let stale: Vec<String> = current_labels
            .iter()
            .filter(|l| l.starts_with("status:"))
            .cloned()
            .collect();
        if !stale.is_empty() {
            self.rest.remove_labels(owner, repo, number, &stale).await?;
        }
        self.rest
            .add_labels(owner, repo, number, &[to_state.status_label()])
            .await
    }

    /// Resolve the configured project's node id, its `Status` field id, and
    /// `to_state`'s option id, then apply the single-select update. Surfaces
    /// `FeatureUnavailable("projects_v2")` rather than guessing at ids when
    /// the target isn't a project board or the state has no matching option
    /// (spec.md §4.6).
    async fn set_status_field(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        target: &ProjectTargetKey,
        to_state: WorkflowState,
    ) -> Result<(), Error> {
        let project_id = match target {
            ProjectTargetKey::OrgProject { org, number: project_number } => {
                self.graph.resolve_org_project_id(org, *project_number).await?
            }
            ProjectTargetKey::UserProject { user, number: project_number } => {
                self.graph.resolve_user_project_id(user, *project_number).await?
            }
            ProjectTargetKey::Repository { .. } => {
                return Err(Error::FeatureUnavailable("projects_v2".to_string()))
            }
        };

        let node_id = self.resolve_node_id(owner, repo, number).await?;
        let project_item_id = self.graph.add_issue_to_project(&project_id, &node_id).await?;

        let (field_id, options) = self.graph.resolve_status_field(&project_id).await?;
        let option_id = options
            .iter()
            .find(|(_, name)| status_option_matches(name, to_state))
            .map(|(id, _)| id.clone())
            .ok_or_else(|| Error::FeatureUnavailable("projects_v2".to_string()))?;

        self.graph
            .set_project_field(&project_id, &project_item_id, &field_id, &option_id)
            .await
    }
}

/// Match a project `Status` field option's display name against a workflow
/// state, tolerant of the hyphen-vs-space and casing differences between
/// `WorkflowState::label_value()` and a human-edited option name.
fn status_option_matches(option_name: &str, to_state: WorkflowState) -> bool {
    let normalize = |s: &str| s.to_lowercase().replace(['-', '_'], " ").trim().to_string();
    normalize(option_name) == normalize(to_state.label_value())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_cache_evicts_oldest_beyond_capacity() {
        let mut cache = NodeIdCache::default();
        for i in 0..(NODE_ID_CACHE_CAPACITY + 1) as u64 {
            cache.insert(("acme".to_string(), "svc".to_string(), i), format!("node-{}", i));
        }
        assert!(cache
            .get(&("acme".to_string(), "svc".to_string(), 0))
            .is_none());
        assert_eq!(
            cache.get(&("acme".to_string(), "svc".to_string(), NODE_ID_CACHE_CAPACITY as u64)),
            Some(format!("node-{}", NODE_ID_CACHE_CAPACITY))
        );
    }

    #[test]
    fn node_id_cache_reinsertion_does_not_duplicate_eviction_order() {
        let mut cache = NodeIdCache::default();
        let key = ("acme".to_string(), "svc".to_string(), 1);
        cache.insert(key.clone(), "node-1".to_string());
        cache.insert(key.clone(), "node-1-updated".to_string());
        assert_eq!(cache.order.len(), 1);
        assert_eq!(cache.get(&key), Some("node-1-updated".to_string()));
    }

    #[test]
    fn status_option_matches_tolerates_hyphen_vs_space_and_case() {
        assert!(status_option_matches("In Progress", WorkflowState::InProgress));
        assert!(status_option_matches("in-progress", WorkflowState::InProgress));
        assert!(status_option_matches("BACKLOG", WorkflowState::Backlog));
        assert!(!status_option_matches("Done", WorkflowState::InProgress));
    }
}
