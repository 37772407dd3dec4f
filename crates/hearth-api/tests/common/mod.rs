//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use hearth_api::state::AppState;
use hearth_core::agent::AgentResponder;
use hearth_core::campaign::{CampaignDirectory, Participant};
use hearth_session::{OrchestratorConfig, SessionOrchestrator};
use hearth_test_support::{
    FixedClock, InMemoryEventRepository, ScriptedAgentResponder, StaticCampaignDirectory,
};
use http_body_util::BodyExt;
use tower::ServiceExt;

/// Build the full app router over an in-memory event log and a static
/// campaign directory serving `roster` with an empty timeline.
pub fn build_test_app(roster: Vec<Participant>) -> Router {
    build_test_app_with(
        Arc::new(StaticCampaignDirectory::new(roster, Vec::new())),
        Arc::new(ScriptedAgentResponder::default()),
    )
}

/// Build the full app router with custom outbound collaborators.
pub fn build_test_app_with(
    campaigns: Arc<dyn CampaignDirectory>,
    responder: Arc<dyn AgentResponder>,
) -> Router {
    let orchestrator = SessionOrchestrator::new(
        Arc::new(InMemoryEventRepository::new()),
        campaigns,
        responder,
        Arc::new(FixedClock::default()),
        OrchestratorConfig::default().with_agent_deadline(Duration::from_millis(200)),
    );
    hearth_api::app(AppState::new(orchestrator))
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a POST request without a body and return the response.
pub async fn post_empty(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Start a session for a fresh campaign and return its id.
pub async fn start_session(app: &Router) -> String {
    let (status, json) = post_json(
        app.clone(),
        "/api/v1/sessions",
        &serde_json::json!({ "campaign_id": uuid::Uuid::new_v4() }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {json}");
    json["session_id"].as_str().unwrap().to_owned()
}

/// Body for an attack proposal.
pub fn attack(participant_id: uuid::Uuid, token: &str) -> serde_json::Value {
    serde_json::json!({
        "participant_id": participant_id,
        "kind": "attack",
        "payload": { "target_id": uuid::Uuid::new_v4(), "weapon": "spear" },
        "idempotency_token": token,
    })
}
