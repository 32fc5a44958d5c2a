//! Typed wrapper over the remote service's REST JSON API (spec.md §4.3).

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;
use crate::types::{Comment, Issue, IssueKind, Label, Milestone};

use super::{backoff_delay, MAX_RETRY_ATTEMPTS};

pub struct RestTransport {
    client: Client,
    base_url: Url,
    token: String,
}

impl RestTransport {
    pub fn new(client: Client, base_url: Url, token: String) -> Self {
        Self {
            client,
            base_url,
            token,
        }
    }

    fn issue_url(&self, owner: &str, repo: &str, number: u64) -> Url {
        self.base_url
            .join(&format!("repos/{}/{}/issues/{}", owner, repo, number))
            .expect("well-formed issue path")
    }

    fn issues_url(&self, owner: &str, repo: &str) -> Url {
        self.base_url
            .join(&format!("repos/{}/{}/issues", owner, repo))
            .expect("well-formed issues path")
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
    }

    /// GETs retry on 429/5xx with exponential backoff, honoring `Retry-After`.
    async fn get_with_retry(&self, url: Url) -> Result<reqwest::Response, Error> {
        let mut attempt = 0;
        loop {
            let request = self.authed(self.client.get(url.clone()));
            let result = request.send().await;
            match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if retryable && attempt + 1 < MAX_RETRY_ATTEMPTS {
                        let delay = retry_after(&response).unwrap_or_else(|| backoff_delay(attempt));
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(classify_status(status, response.text().await.unwrap_or_default()));
                }
                Err(e) => {
                    if e.is_timeout() {
                        return Err(Error::Timeout(super::DEFAULT_TIMEOUT));
                    }
                    if attempt + 1 < MAX_RETRY_ATTEMPTS {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(Error::NetworkError(e.to_string()));
                }
            }
        }
    }

    /// Mutations never auto-retry (spec.md §4.3, testable property 9).
    async fn send_once(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {
        let response = self.authed(request).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(super::DEFAULT_TIMEOUT)
            } else {
                Error::NetworkError(e.to_string())
            }
        })?;
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            Err(classify_status(status, response.text().await.unwrap_or_default()))
        }
    }

    /// Resolve the login of the authenticated principal the credential
    /// belongs to, used as the transition actor (spec.md §4.6).
    pub async fn current_user(&self) -> Result<String, Error> {
        let url = self.base_url.join("user").expect("well-formed user path");
        let response = self.get_with_retry(url).await?;
        let wire: WireUser = response.json().await.map_err(|e| Error::NetworkError(e.to_string()))?;
        Ok(wire.login)
    }

    pub async fn get_issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue, Error> {
        let response = self.get_with_retry(self.issue_url(owner, repo, number)).await?;
        let wire: WireIssue = response.json().await.map_err(|e| Error::NetworkError(e.to_string()))?;
        Ok(wire.into_issue())
    }

    /// List issues, optionally filtered by label (spec.md §4.3 covers
    /// single-issue CRUD; this mirrors the same host API's collection
    /// endpoint, used only by the supplemented `list` command).
    pub async fn list_issues(
        &self,
        owner: &str,
        repo: &str,
        label: Option<&str>,
    ) -> Result<Vec<Issue>, Error> {
        let mut url = self.issues_url(owner, repo);
        if let Some(label) = label {
            url.query_pairs_mut().append_pair("labels", label);
        }
        let response = self.get_with_retry(url).await?;
        let wire: Vec<WireIssue> = response.json().await.map_err(|e| Error::NetworkError(e.to_string()))?;
        Ok(wire.into_iter().map(WireIssue::into_issue).collect())
    }

    pub async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<Issue, Error> {
        let payload = CreateIssuePayload {
            title: title.to_string(),
            body: body.to_string(),
            labels: labels.to_vec(),
        };
        let request = self.client.post(self.issues_url(owner, repo)).json(&payload);
        let response = self.send_once(request).await?;
        let wire: WireIssue = response.json().await.map_err(|e| Error::NetworkError(e.to_string()))?;
        Ok(wire.into_issue())
    }

    pub async fn update_issue_body(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), Error> {
        let payload = serde_json::json!({ "body": body });
        let request = self
            .client
            .patch(self.issue_url(owner, repo, number))
            .json(&payload);
        self.send_once(request).await?;
        Ok(())
    }

    /// Flip the issue's open/closed state (spec.md §4.6: the `closed`
    /// transition additionally flips this flag).
    pub async fn set_issue_state(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        open: bool,
    ) -> Result<(), Error> {
        let state = if open { "open" } else { "closed" };
        let payload = serde_json::json!({ "state": state });
        let request = self
            .client
            .patch(self.issue_url(owner, repo, number))
            .json(&payload);
        self.send_once(request).await?;
        Ok(())
    }

    pub async fn list_labels(&self, owner: &str, repo: &str) -> Result<Vec<Label>, Error> {
        let url = self
            .base_url
            .join(&format!("repos/{}/{}/labels", owner, repo))
            .expect("well-formed labels path");
        let response = self.get_with_retry(url).await?;
        let wire: Vec<WireLabel> = response.json().await.map_err(|e| Error::NetworkError(e.to_string()))?;
        Ok(wire
            .into_iter()
            .map(|l| Label {
                name: l.name,
                color: l.color,
            })
            .collect())
    }

    pub async fn create_label(
        &self,
        owner: &str,
        repo: &str,
        name: &str,
        color: Option<&str>,
    ) -> Result<Label, Error> {
        let url = self
            .base_url
            .join(&format!("repos/{}/{}/labels", owner, repo))
            .expect("well-formed labels path");
        let payload = serde_json::json!({ "name": name, "color": color });
        let response = self.send_once(self.client.post(url).json(&payload)).await?;
        let wire: WireLabel = response.json().await.map_err(|e| Error::NetworkError(e.to_string()))?;
        Ok(Label {
            name: wire.name,
            color: wire.color,
        })
    }

    pub async fn add_labels(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        labels: &[String],
    ) -> Result<(), Error> {
        let url = self
            .base_url
            .join(&format!("repos/{}/{}/issues/{}/labels", owner, repo, number))
            .expect("well-formed labels path");
        let payload = serde_json::json!({ "labels": labels });
        self.send_once(self.client.post(url).json(&payload)).await?;
        Ok(())
    }

    pub async fn remove_labels(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        labels: &[String],
    ) -> Result<(), Error> {
        for label in labels {
            let url = self
                .base_url
                .join(&format!(
                    "repos/{}/{}/issues/{}/labels/{}",
                    owner, repo, number, label
                ))
                .expect("well-formed label path");
            self.send_once(self.client.delete(url)).await?;
        }
        Ok(())
    }

    pub async fn add_assignees(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        logins: &[String],
    ) -> Result<(), Error> {
        let url = self
            .base_url
            .join(&format!("repos/{}/{}/issues/{}/assignees", owner, repo, number))
            .expect("well-formed assignees path");
        let payload = serde_json::json!({ "assignees": logins });
        self.send_once(self.client.post(url).json(&payload)).await?;
        Ok(())
    }

    pub async fn create_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<Comment, Error> {
        let url = self
            .base_url
            .join(&format!("repos/{}/{}/issues/{}/comments", owner, repo, number))
            .expect("well-formed comments path");
        let payload = serde_json::json!({ "body": body });
        let response = self.send_once(self.client.post(url).json(&payload)).await?;
        let wire: WireComment = response.json().await.map_err(|e| Error::NetworkError(e.to_string()))?;
        Ok(Comment {
            id: wire.id,
            author: wire.user.login,
            body: wire.body,
            created_at: wire.created_at,
        })
    }

    pub async fn list_milestones(&self, owner: &str, repo: &str) -> Result<Vec<Milestone>, Error> {
        let url = self
            .base_url
            .join(&format!("repos/{}/{}/milestones", owner, repo))
            .expect("well-formed milestones path");
        let response = self.get_with_retry(url).await?;
        let wire: Vec<WireMilestone> =
            response.json().await.map_err(|e| Error::NetworkError(e.to_string()))?;
        Ok(wire
            .into_iter()
            .map(|m| Milestone {
                number: m.number,
                title: m.title,
                open: m.state == "open",
            })
            .collect())
    }

    pub async fn create_milestone(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
    ) -> Result<Milestone, Error> {
        let url = self
            .base_url
            .join(&format!("repos/{}/{}/milestones", owner, repo))
            .expect("well-formed milestones path");
        let payload = serde_json::json!({ "title": title });
        let response = self.send_once(self.client.post(url).json(&payload)).await?;
        let wire: WireMilestone =
            response.json().await.map_err(|e| Error::NetworkError(e.to_string()))?;
        Ok(Milestone {
            number: wire.number,
            title: wire.title,
            open: wire.state == "open",
        })
    }
}

fn retry_after(response: &reqwest::Response) -> Option<std::time::Duration> {
    response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(std::time::Duration::from_secs)
}

fn classify_status(status: StatusCode, body: String) -> Error {
    match status {
        StatusCode::UNAUTHORIZED => Error::InvalidCredential,
        StatusCode::FORBIDDEN => Error::Forbidden(body),
        StatusCode::NOT_FOUND => Error::IssueNotFound(0),
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited(super::backoff_delay(0)),
        s if s.is_server_error() => Error::NetworkError(format!("server error {}: {}", s, body)),
        s => Error::NetworkError(format!("unexpected status {}: {}", s, body)),
    }
}

#[derive(Debug, Serialize)]
struct CreateIssuePayload {
    title: String,
    body: String,
    labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireIssue {
    number: u64,
    node_id: String,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Vec<WireLabel>,
    #[serde(default)]
    assignees: Vec<WireUser>,
    #[serde(default)]
    milestone: Option<WireMilestone>,
    state: String,
}

impl WireIssue {
    fn into_issue(self) -> Issue {
        let label_names: Vec<String> = self.labels.iter().map(|l| l.name.clone()).collect();
        let kind = label_names
            .iter()
            .find_map(|l| l.strip_prefix("type:"))
            .and_then(|k| crate::types::parse_issue_kind(k).ok())
            .unwrap_or(IssueKind::Issue);
        Issue {
            number: self.number,
            node_id: self.node_id,
            title: self.title,
            body: self.body.unwrap_or_default(),
            kind,
            labels: label_names,
            assignees: self.assignees.into_iter().map(|u| u.login).collect(),
            milestone: self.milestone.map(|m| m.title),
            open: self.state == "open",
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireLabel {
    name: String,
    #[serde(default)]
    color: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct WireComment {
    id: u64,
    body: String,
    user: WireUser,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
struct WireMilestone {
    number: u64,
    title: String,
    state: String,
}
