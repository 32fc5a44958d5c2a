//! End-to-end exercises of the Hybrid Client's composite create path
//! against a fake REST + graph backend, mirroring spec scenarios S2/S3:
//! a soft (`FeatureUnavailable`) edge failure degrades to a body
//! reference; a hard edge failure rolls the orphan back.

use reqwest::Client;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use issuectl::client::HybridClient;
use issuectl::config::{ProjectTargetKey, StatusMethod};
use issuectl::error::Error;
use issuectl::transport::graph::GraphTransport;
use issuectl::transport::rest::RestTransport;
use issuectl::types::{FallbackUsed, IssueKind, WorkflowState};

struct BodyContains(&'static str);

impl wiremock::Match for BodyContains {
    fn matches(&self, request: &Request) -> bool {
        String::from_utf8_lossy(&request.body).contains(self.0)
    }
}

fn client_for(rest_base: &str, graph_base: &str) -> HybridClient {
    let http = Client::new();
    let rest = RestTransport::new(
        http.clone(),
        Url::parse(&format!("{}/", rest_base)).unwrap(),
        "test-token".to_string(),
    );
    let graph = GraphTransport::new(http, Url::parse(graph_base).unwrap(), "test-token".to_string());
    HybridClient::new(rest, graph)
}

#[tokio::test]
async fn soft_edge_failure_falls_back_to_body_reference() {
    let rest_server = MockServer::start().await;
    let graph_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(BodyContains("issueTypes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errors": [{"type": "FORBIDDEN", "message": "issue_types feature is disabled"}]
        })))
        .mount(&graph_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/repos/acme/svc/issues"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "number": 42,
            "node_id": "child-node",
            "title": "Endpoint",
            "body": "",
            "labels": [],
            "assignees": [],
            "milestone": null,
            "state": "open",
        })))
        .mount(&rest_server)
        .await;

    Mock::given(method("POST"))
        .and(BodyContains("repository"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"repository": {"issue": {"id": "parent-node"}}}
        })))
        .mount(&graph_server)
        .await;

    Mock::given(method("POST"))
        .and(BodyContains("addSubIssue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errors": [{"type": "FORBIDDEN", "message": "sub_issues feature is disabled"}]
        })))
        .mount(&graph_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/repos/acme/svc/issues/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&rest_server)
        .await;

    let client = client_for(&rest_server.uri(), &graph_server.uri());
    let result = client
        .create_typed_child("acme", "svc", IssueKind::Task, "Endpoint", "", 10, true)
        .await
        .unwrap();

    assert_eq!(result.issue.number, 42);
    assert!(matches!(result.fallback, FallbackUsed::BodyReference));
    assert_eq!(result.issue.body, "**Parent:** #10\n");
}

#[tokio::test]
async fn hard_edge_failure_rolls_back_the_orphan() {
    let rest_server = MockServer::start().await;
    let graph_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(BodyContains("issueTypes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errors": [{"type": "FORBIDDEN", "message": "issue_types feature is disabled"}]
        })))
        .mount(&graph_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/repos/acme/svc/issues"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "number": 43,
            "node_id": "child-node-2",
            "title": "Endpoint 2",
            "body": "",
            "labels": [],
            "assignees": [],
            "milestone": null,
            "state": "open",
        })))
        .mount(&rest_server)
        .await;

    Mock::given(method("POST"))
        .and(BodyContains("repository"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"repository": {"issue": {"id": "parent-node"}}}
        })))
        .mount(&graph_server)
        .await;

    Mock::given(method("POST"))
        .and(BodyContains("addSubIssue"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&graph_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/repos/acme/svc/issues/43"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&rest_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/repos/acme/svc/issues/43/labels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&rest_server)
        .await;

    let client = client_for(&rest_server.uri(), &graph_server.uri());
    let err = client
        .create_typed_child("acme", "svc", IssueKind::Task, "Endpoint 2", "", 10, true)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RelationshipRequired(step) if step == "add_sub_issue_edge"));

    let closed_the_orphan = rest_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .any(|r| {
            r.url.path() == "/repos/acme/svc/issues/43"
                && String::from_utf8_lossy(&r.body).contains("\"state\":\"closed\"")
        });
    assert!(closed_the_orphan, "rollback must close the orphaned child issue");
}

#[tokio::test]
async fn hard_edge_failure_without_required_relationship_surfaces_the_error() {
    let rest_server = MockServer::start().await;
    let graph_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(BodyContains("issueTypes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errors": [{"type": "FORBIDDEN", "message": "issue_types feature is disabled"}]
        })))
        .mount(&graph_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/repos/acme/svc/issues"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "number": 44,
            "node_id": "child-node-3",
            "title": "Endpoint 3",
            "body": "",
            "labels": [],
            "assignees": [],
            "milestone": null,
            "state": "open",
        })))
        .mount(&rest_server)
        .await;

    Mock::given(method("POST"))
        .and(BodyContains("repository"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"repository": {"issue": {"id": "parent-node"}}}
        })))
        .mount(&graph_server)
        .await;

    Mock::given(method("POST"))
        .and(BodyContains("addSubIssue"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&graph_server)
        .await;

    let client = client_for(&rest_server.uri(), &graph_server.uri());
    let err = client
        .create_typed_child("acme", "svc", IssueKind::Task, "Endpoint 3", "", 10, false)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NetworkError(_)));
}

#[tokio::test]
async fn status_field_resolves_project_and_option_ids_before_updating() {
    let rest_server = MockServer::start().await;
    let graph_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(BodyContains("repository"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"repository": {"issue": {"id": "issue-node"}}}
        })))
        .mount(&graph_server)
        .await;

    Mock::given(method("POST"))
        .and(BodyContains("organization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"organization": {"projectV2": {"id": "project-node"}}}
        })))
        .mount(&graph_server)
        .await;

    Mock::given(method("POST"))
        .and(BodyContains("addProjectV2ItemById"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"addProjectV2ItemById": {"item": {"id": "item-node"}}}
        })))
        .mount(&graph_server)
        .await;

    Mock::given(method("POST"))
        .and(BodyContains("ProjectV2SingleSelectField"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"node": {"field": {"id": "field-status", "options": [
                {"id": "opt-planning", "name": "Planning"},
                {"id": "opt-backlog", "name": "Backlog"},
            ]}}}
        })))
        .mount(&graph_server)
        .await;

    Mock::given(method("POST"))
        .and(BodyContains("updateProjectV2ItemFieldValue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"updateProjectV2ItemFieldValue": {"clientMutationId": null}}
        })))
        .mount(&graph_server)
        .await;

    let client = client_for(&rest_server.uri(), &graph_server.uri());
    let target = ProjectTargetKey::OrgProject {
        org: "acme".to_string(),
        number: 7,
    };
    let applied = client
        .set_workflow_state(
            "acme",
            "svc",
            12,
            &[],
            StatusMethod::StatusField,
            &target,
            WorkflowState::Planning,
        )
        .await
        .unwrap();

    assert_eq!(applied, StatusMethod::StatusField);

    let sent_the_resolved_option = graph_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .any(|r| String::from_utf8_lossy(&r.body).contains("opt-planning"));
    assert!(sent_the_resolved_option, "must send the resolved option id, not a placeholder");
}

#[tokio::test]
async fn status_field_on_a_repository_target_degrades_to_labels_without_placeholder_calls() {
    let rest_server = MockServer::start().await;
    let graph_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/repos/acme/svc/issues/12/labels/status:backlog"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&rest_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/repos/acme/svc/issues/12/labels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&rest_server)
        .await;

    let client = client_for(&rest_server.uri(), &graph_server.uri());
    let target = ProjectTargetKey::Repository {
        owner: "acme".to_string(),
        repo: "svc".to_string(),
    };
    let applied = client
        .set_workflow_state(
            "acme",
            "svc",
            12,
            &["status:backlog".to_string()],
            StatusMethod::StatusField,
            &target,
            WorkflowState::Planning,
        )
        .await
        .unwrap();

    assert_eq!(applied, StatusMethod::Labels);
    assert!(graph_server.received_requests().await.unwrap().is_empty());
}
