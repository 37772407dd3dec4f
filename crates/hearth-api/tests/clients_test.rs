//! Tests for the outbound HTTP clients against a local stub service.

use std::net::SocketAddr;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use hearth_api::clients::{HttpAgentResponder, HttpCampaignDirectory};
use hearth_core::action::ProposedAction;
use hearth_core::agent::{AgentContext, AgentResponder, AgentResponderError};
use hearth_core::campaign::{CampaignDirectory, TimelineTrigger};
use hearth_core::error::DomainError;
use serde_json::{Value, json};
use uuid::Uuid;

const KNOWN_CAMPAIGN: Uuid = Uuid::from_u128(0x1);
const ERRORING_CAMPAIGN: Uuid = Uuid::from_u128(0x2);

async fn participants(Path(campaign_id): Path<Uuid>) -> Result<Json<Value>, StatusCode> {
    if campaign_id == KNOWN_CAMPAIGN {
        Ok(Json(json!([
            { "id": Uuid::from_u128(0x10), "kind": "human", "display_name": "Aria" },
            { "id": Uuid::from_u128(0x11), "kind": "ai_agent", "display_name": "Oracle" },
        ])))
    } else if campaign_id == ERRORING_CAMPAIGN {
        Err(StatusCode::BAD_GATEWAY)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn timeline(Path(_campaign_id): Path<Uuid>) -> Json<Value> {
    Json(json!([
        {
            "id": Uuid::from_u128(0x20),
            "position": 2,
            "trigger": { "type": "explicit" },
            "effect": { "scene": "the bridge collapses" },
        },
        {
            "id": Uuid::from_u128(0x21),
            "position": 1,
            "trigger": { "type": "turn_reached", "turn": 3 },
        },
    ]))
}

async fn agent_action(Json(context): Json<AgentContext>) -> Result<Json<Value>, StatusCode> {
    match context.turn_number {
        1 => Ok(Json(json!({ "kind": "narrate", "payload": { "text": "The oracle speaks." } }))),
        2 => Ok(Json(json!({ "unexpected": true }))),
        _ => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

async fn spawn_stub() -> String {
    let app = Router::new()
        .route("/campaigns/{id}/participants", get(participants))
        .route("/campaigns/{id}/timeline", get(timeline))
        .route("/agent-actions", post(agent_action));
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

fn context(turn_number: u32) -> AgentContext {
    AgentContext {
        session_id: Uuid::new_v4(),
        campaign_id: KNOWN_CAMPAIGN,
        participant_id: Uuid::from_u128(0x11),
        turn_number,
        snapshot: json!({ "status": "active" }),
        recent_events: Vec::new(),
    }
}

#[tokio::test]
async fn test_campaign_directory_fetches_roster_and_timeline() {
    // Arrange
    let base_url = spawn_stub().await;
    let directory = HttpCampaignDirectory::new(reqwest::Client::new(), base_url);

    // Act
    let roster = directory.fetch_roster(KNOWN_CAMPAIGN).await.unwrap();
    let timeline = directory.fetch_timeline(KNOWN_CAMPAIGN).await.unwrap();

    // Assert
    assert_eq!(roster.len(), 2);
    assert_eq!(roster[1].display_name, "Oracle");
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[0].trigger, TimelineTrigger::Explicit);
    assert_eq!(timeline[1].trigger, TimelineTrigger::TurnReached { turn: 3 });
    assert_eq!(timeline[1].effect, Value::Null);
}

#[tokio::test]
async fn test_campaign_directory_maps_missing_campaign_to_not_found() {
    // Arrange
    let base_url = spawn_stub().await;
    let directory = HttpCampaignDirectory::new(reqwest::Client::new(), base_url);
    let missing = Uuid::new_v4();

    // Act
    let result = directory.fetch_roster(missing).await;

    // Assert
    assert!(matches!(result, Err(DomainError::AggregateNotFound(id)) if id == missing));
}

#[tokio::test]
async fn test_campaign_directory_maps_server_error_to_infrastructure() {
    // Arrange
    let base_url = spawn_stub().await;
    let directory = HttpCampaignDirectory::new(reqwest::Client::new(), base_url);

    // Act
    let result = directory.fetch_roster(ERRORING_CAMPAIGN).await;

    // Assert
    assert!(matches!(result, Err(DomainError::Infrastructure(_))));
}

#[tokio::test]
async fn test_agent_responder_returns_proposed_action() {
    // Arrange
    let base_url = spawn_stub().await;
    let responder = HttpAgentResponder::new(reqwest::Client::new(), &base_url);

    // Act
    let action = responder.request_action(&context(1)).await.unwrap();

    // Assert
    assert_eq!(
        action,
        ProposedAction::new("narrate", json!({ "text": "The oracle speaks." }))
    );
}

#[tokio::test]
async fn test_agent_responder_rejects_non_action_body() {
    // Arrange
    let base_url = spawn_stub().await;
    let responder = HttpAgentResponder::new(reqwest::Client::new(), &base_url);

    // Act
    let result = responder.request_action(&context(2)).await;

    // Assert
    assert!(matches!(result, Err(AgentResponderError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_agent_responder_maps_error_status_to_unavailable() {
    // Arrange
    let base_url = spawn_stub().await;
    let responder = HttpAgentResponder::new(reqwest::Client::new(), &base_url);

    // Act
    let result = responder.request_action(&context(3)).await;

    // Assert
    assert!(matches!(result, Err(AgentResponderError::Unavailable(_))));
}
