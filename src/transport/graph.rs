//! Typed wrapper over the remote service's graph-query API (spec.md §4.4):
//! sub-issue edges, issue-type assignment, project-board fields.
//!
//! Queries are `&'static str` constants posted as JSON alongside a
//! `serde_json::Value` of variables — no generated GraphQL client.

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use url::Url;

use crate::error::Error;
use crate::types::Issue;

use super::{backoff_delay, MAX_RETRY_ATTEMPTS};

const PREVIEW_FEATURES_HEADER: &str = "sub_issues, issue_types";

pub struct GraphTransport {
    client: Client,
    endpoint: Url,
    token: String,
}

impl GraphTransport {
    pub fn new(client: Client, endpoint: Url, token: String) -> Self {
        Self {
            client,
            endpoint,
            token,
        }
    }

    async fn execute(&self, query: &str, variables: Value) -> Result<Value, Error> {
        let mut attempt = 0;
        loop {
            let body = json!({ "query": query, "variables": variables });
            let response = self
                .client
                .post(self.endpoint.clone())
                .bearer_auth(&self.token)
                .header("X-Preview-Features", PREVIEW_FEATURES_HEADER)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        Error::Timeout(super::DEFAULT_TIMEOUT)
                    } else {
                        Error::NetworkError(e.to_string())
                    }
                })?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt + 1 < MAX_RETRY_ATTEMPTS {
                let delay = retry_after(&response).unwrap_or_else(|| backoff_delay(attempt));
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let text = response.text().await.unwrap_or_default();
            return classify_response(status, &text);
        }
    }

    pub async fn resolve_node_id(&self, owner: &str, repo: &str, number: u64) -> Result<String, Error> {
        const QUERY: &str = "query($owner:String!,$repo:String!,$number:Int!){ repository(owner:$owner,name:$repo){ issue(number:$number){ id } } }";
        let data = self
            .execute(
                QUERY,
                json!({ "owner": owner, "repo": repo, "number": number }),
            )
            .await?;
        data.pointer("/repository/issue/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::InternalError("graph response missing issue id".to_string()))
    }

    pub async fn add_sub_issue_edge(&self, parent_node_id: &str, child_node_id: &str) -> Result<(), Error> {
        const QUERY: &str = "mutation($parent:ID!,$child:ID!){ addSubIssue(input:{issueId:$parent,subIssueId:$child}){ clientMutationId } }";
        self.execute(
            QUERY,
            json!({ "parent": parent_node_id, "child": child_node_id }),
        )
        .await?;
        Ok(())
    }

    pub async fn remove_sub_issue_edge(
        &self,
        parent_node_id: &str,
        child_node_id: &str,
    ) -> Result<(), Error> {
        const QUERY: &str = "mutation($parent:ID!,$child:ID!){ removeSubIssue(input:{issueId:$parent,subIssueId:$child}){ clientMutationId } }";
        self.execute(
            QUERY,
            json!({ "parent": parent_node_id, "child": child_node_id }),
        )
        .await?;
        Ok(())
    }

    pub async fn set_issue_type(&self, node_id: &str, type_name: &str) -> Result<(), Error> {
        const QUERY: &str =
            "mutation($issue:ID!,$type:String!){ setIssueType(input:{issueId:$issue,issueTypeName:$type}){ clientMutationId } }";
        self.execute(QUERY, json!({ "issue": node_id, "type": type_name }))
            .await?;
        Ok(())
    }

    pub async fn list_issue_types(&self, owner: &str) -> Result<Vec<String>, Error> {
        const QUERY: &str = "query($owner:String!){ organization(login:$owner){ issueTypes(first:50){ nodes { name } } } }";
        let data = self.execute(QUERY, json!({ "owner": owner })).await?;
        let nodes = data
            .pointer("/organization/issueTypes/nodes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(nodes
            .into_iter()
            .filter_map(|n| n.get("name").and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    pub async fn create_issue_with_type(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body: &str,
        type_name: &str,
    ) -> Result<Issue, Error> {
        const QUERY: &str = "mutation($owner:String!,$repo:String!,$title:String!,$body:String!,$type:String!){ createIssue(input:{repositoryOwner:$owner,repositoryName:$repo,title:$title,body:$body,issueTypeName:$type}){ issue { number id title body state } } }";
        let data = self
            .execute(
                QUERY,
                json!({
                    "owner": owner,
                    "repo": repo,
                    "title": title,
                    "body": body,
                    "type": type_name,
                }),
            )
            .await?;
        let issue_value = data
            .pointer("/createIssue/issue")
            .ok_or_else(|| Error::InternalError("graph response missing created issue".to_string()))?;
        parse_minimal_issue(issue_value, type_name)
    }

    pub async fn get_issue_with_children(&self, node_id: &str) -> Result<Vec<u64>, Error> {
        const QUERY: &str = "query($id:ID!){ node(id:$id){ ... on Issue { subIssues(first:100){ nodes { number } } } } }";
        let data = self.execute(QUERY, json!({ "id": node_id })).await?;
        let nodes = data
            .pointer("/node/subIssues/nodes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(nodes
            .into_iter()
            .filter_map(|n| n.get("number").and_then(Value::as_u64))
            .collect())
    }

    pub async fn set_project_field(
        &self,
        project_id: &str,
        item_id: &str,
        field_id: &str,
        value: &str,
    ) -> Result<(), Error> {
        const QUERY: &str = "mutation($project:ID!,$item:ID!,$field:ID!,$value:String!){ updateProjectV2ItemFieldValue(input:{projectId:$project,itemId:$item,fieldId:$field,value:{singleSelectOptionId:$value}}){ clientMutationId } }";
        self.execute(
            QUERY,
            json!({ "project": project_id, "item": item_id, "field": field_id, "value": value }),
        )
        .await?;
        Ok(())
    }

    pub async fn add_issue_to_project(&self, project_id: &str, content_id: &str) -> Result<String, Error> {
        const QUERY: &str = "mutation($project:ID!,$content:ID!){ addProjectV2ItemById(input:{projectId:$project,contentId:$content}){ item { id } } }";
        let data = self
            .execute(QUERY, json!({ "project": project_id, "content": content_id }))
            .await?;
        data.pointer("/addProjectV2ItemById/item/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::InternalError("graph response missing project item id".to_string()))
    }

    pub async fn resolve_org_project_id(&self, org: &str, number: u64) -> Result<String, Error> {
        const QUERY: &str =
            "query($org:String!,$number:Int!){ organization(login:$org){ projectV2(number:$number){ id } } }";
        let data = self.execute(QUERY, json!({ "org": org, "number": number })).await?;
        data.pointer("/organization/projectV2/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::FeatureUnavailable("projects_v2".to_string()))
    }

    pub async fn resolve_user_project_id(&self, user: &str, number: u64) -> Result<String, Error> {
        const QUERY: &str =
            "query($user:String!,$number:Int!){ user(login:$user){ projectV2(number:$number){ id } } }";
        let data = self.execute(QUERY, json!({ "user": user, "number": number })).await?;
        data.pointer("/user/projectV2/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::FeatureUnavailable("projects_v2".to_string()))
    }

    /// Resolve the project's single-select `Status` field id and its options
    /// (id, name), so the caller can map a workflow state onto an option id
    /// instead of sending the state's label as a placeholder (spec.md §4.6).
    pub async fn resolve_status_field(&self, project_id: &str) -> Result<(String, Vec<(String, String)>), Error> {
        const QUERY: &str = "query($project:ID!){ node(id:$project){ ... on ProjectV2 { field(name:\"Status\"){ ... on ProjectV2SingleSelectField { id options { id name } } } } } }";
        let data = self.execute(QUERY, json!({ "project": project_id })).await?;
        let field = data
            .pointer("/node/field")
            .ok_or_else(|| Error::FeatureUnavailable("projects_v2".to_string()))?;
        let field_id = field
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::FeatureUnavailable("projects_v2".to_string()))?
            .to_string();
        let options = field
            .get("options")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|o| {
                let id = o.get("id")?.as_str()?.to_string();
                let name = o.get("name")?.as_str()?.to_string();
                Some((id, name))
            })
            .collect();
        Ok((field_id, options))
    }
}

fn parse_minimal_issue(value: &Value, type_name: &str) -> Result<Issue, Error> {
    let number = value
        .get("number")
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::InternalError("created issue missing number".to_string()))?;
    let node_id = value
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InternalError("created issue missing id".to_string()))?
        .to_string();
    let title = value
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let body = value
        .get("body")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let open = value.get("state").and_then(Value::as_str) != Some("CLOSED");
    let kind = crate::types::parse_issue_kind(type_name).unwrap_or(crate::types::IssueKind::Issue);
    Ok(Issue {
        number,
        node_id,
        title,
        body,
        kind,
        labels: Vec::new(),
        assignees: Vec::new(),
        milestone: None,
        open,
    })
}

fn retry_after(response: &reqwest::Response) -> Option<std::time::Duration> {
    response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(std::time::Duration::from_secs)
}

/// Distinguishes programmer-bug query errors from feature unavailability,
/// permission errors, and transient failures (spec.md §4.4).
fn classify_response(status: StatusCode, body: &str) -> Result<Value, Error> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::InvalidCredential);
    }

    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);

    if status == StatusCode::FORBIDDEN {
        if let Some(feature) = detect_unavailable_feature(&parsed, body) {
            return Err(Error::FeatureUnavailable(feature));
        }
        return Err(Error::Forbidden(body.to_string()));
    }

    if status.is_server_error() {
        return Err(Error::NetworkError(format!("server error {}", status)));
    }

    if let Some(errors) = parsed.get("errors").and_then(Value::as_array) {
        if let Some(first) = errors.first() {
            let message = first
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown graph error");
            let error_type = first.get("type").and_then(Value::as_str).unwrap_or("");
            if error_type.eq_ignore_ascii_case("FORBIDDEN") {
                if let Some(feature) = detect_unavailable_feature(&parsed, message) {
                    return Err(Error::FeatureUnavailable(feature));
                }
                return Err(Error::Forbidden(message.to_string()));
            }
            if error_type.eq_ignore_ascii_case("NOT_FOUND") {
                return Err(Error::IssueNotFound(0));
            }
            // A malformed query is a programmer bug: fail hard, never swallow.
            return Err(Error::InternalError(format!(
                "graph query error ({}): {}",
                error_type, message
            )));
        }
    }

    if !status.is_success() {
        return Err(Error::NetworkError(format!("unexpected status {}", status)));
    }

    parsed
        .get("data")
        .cloned()
        .ok_or_else(|| Error::InternalError("graph response missing data field".to_string()))
}

fn detect_unavailable_feature(body: &Value, raw_message: &str) -> Option<String> {
    let message = body
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|e| e.first())
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or(raw_message)
        .to_lowercase();

    for feature in ["sub_issues", "issue_types", "projects_v2"] {
        if message.contains(feature) || message.contains(&feature.replace('_', " ")) {
            return Some(feature.to_string());
        }
    }
    if message.contains("unknown field") || message.contains("disabled feature") {
        return Some("unknown".to_string());
    }
    None
}
