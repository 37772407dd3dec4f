//! Integration tests for the session endpoints.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use hearth_test_support::{FailingCampaignDirectory, ScriptedAgentResponder, human};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_start_session_returns_201_with_active_view() {
    // Arrange
    let aria = human("Aria");
    let bram = human("Bram");
    let app = common::build_test_app(vec![aria.clone(), bram.clone()]);

    // Act
    let (status, json) = common::post_json(
        app,
        "/api/v1/sessions",
        &json!({ "campaign_id": Uuid::new_v4() }),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "active");
    assert_eq!(json["participants"], json!([aria.id, bram.id]));
    assert_eq!(json["active_participant_id"], json!(aria.id));
    assert_eq!(json["turn_number"], 1);
}

#[tokio::test]
async fn test_get_session_returns_current_view() {
    // Arrange
    let aria = human("Aria");
    let app = common::build_test_app(vec![aria.clone()]);
    let session_id = common::start_session(&app).await;

    // Act
    let (status, json) = common::get_json(app, &format!("/api/v1/sessions/{session_id}")).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["session_id"], session_id);
    assert_eq!(json["roster"][0]["display_name"], "Aria");
    assert_eq!(json["roster"][0]["kind"], "human");
}

#[tokio::test]
async fn test_get_unknown_session_returns_404() {
    // Arrange
    let app = common::build_test_app(vec![human("Aria")]);

    // Act
    let (status, json) =
        common::get_json(app, &format!("/api/v1/sessions/{}", Uuid::new_v4())).await;

    // Assert
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "aggregate_not_found");
}

#[tokio::test]
async fn test_start_session_with_empty_roster_returns_400() {
    // Arrange
    let app = common::build_test_app(Vec::new());

    // Act
    let (status, json) = common::post_json(
        app,
        "/api/v1/sessions",
        &json!({ "campaign_id": Uuid::new_v4() }),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_campaign_service_failure_returns_500() {
    // Arrange
    let app = common::build_test_app_with(
        Arc::new(FailingCampaignDirectory),
        Arc::new(ScriptedAgentResponder::default()),
    );

    // Act
    let (status, json) = common::post_json(
        app,
        "/api/v1/sessions",
        &json!({ "campaign_id": Uuid::new_v4() }),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "infrastructure_error");
}

#[tokio::test]
async fn test_turn_holder_action_is_admitted() {
    // Arrange
    let aria = human("Aria");
    let bram = human("Bram");
    let app = common::build_test_app(vec![aria.clone(), bram.clone()]);
    let session_id = common::start_session(&app).await;
    let (_, before) =
        common::get_json(app.clone(), &format!("/api/v1/sessions/{session_id}")).await;

    // Act
    let (status, json) = common::post_json(
        app.clone(),
        &format!("/api/v1/sessions/{session_id}/actions"),
        &common::attack(aria.id, "aria-1"),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "admitted");
    let expected_sequence = before["last_sequence_number"].as_i64().unwrap() + 1;
    assert_eq!(json["sequence_number"], expected_sequence);
    assert!(json["event_id"].is_string());

    let (_, after) = common::get_json(app, &format!("/api/v1/sessions/{session_id}")).await;
    assert_eq!(after["active_participant_id"], json!(bram.id));
    assert_eq!(after["last_sequence_number"], expected_sequence);
}

#[tokio::test]
async fn test_out_of_turn_action_returns_409_not_your_turn() {
    // Arrange
    let aria = human("Aria");
    let bram = human("Bram");
    let app = common::build_test_app(vec![aria, bram.clone()]);
    let session_id = common::start_session(&app).await;

    // Act
    let (status, json) = common::post_json(
        app,
        &format!("/api/v1/sessions/{session_id}/actions"),
        &common::attack(bram.id, "bram-1"),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json, json!({ "outcome": "rejected", "reason": { "code": "not_your_turn" } }));
}

#[tokio::test]
async fn test_action_for_unknown_session_returns_409_session_not_active() {
    // Arrange
    let app = common::build_test_app(vec![human("Aria")]);

    // Act
    let (status, json) = common::post_json(
        app,
        &format!("/api/v1/sessions/{}/actions", Uuid::new_v4()),
        &common::attack(Uuid::new_v4(), "lost-1"),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        json,
        json!({ "outcome": "rejected", "reason": { "code": "session_not_active" } })
    );
}

#[tokio::test]
async fn test_out_of_turn_chat_is_admitted() {
    // Arrange
    let aria = human("Aria");
    let bram = human("Bram");
    let app = common::build_test_app(vec![aria.clone(), bram.clone()]);
    let session_id = common::start_session(&app).await;

    // Act
    let (status, json) = common::post_json(
        app.clone(),
        &format!("/api/v1/sessions/{session_id}/actions"),
        &json!({
            "participant_id": bram.id,
            "kind": "chat",
            "payload": { "message": "watch the left flank" },
            "idempotency_token": "bram-chat-1",
        }),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "admitted");
    let (_, view) = common::get_json(app, &format!("/api/v1/sessions/{session_id}")).await;
    assert_eq!(view["active_participant_id"], json!(aria.id));
}

#[tokio::test]
async fn test_malformed_action_returns_422() {
    // Arrange
    let aria = human("Aria");
    let app = common::build_test_app(vec![aria.clone()]);
    let session_id = common::start_session(&app).await;

    // Act
    let (status, json) = common::post_json(
        app,
        &format!("/api/v1/sessions/{session_id}/actions"),
        &json!({
            "participant_id": aria.id,
            "kind": "resolve_check",
            "payload": { "skill": "stealth", "difficulty_class": 12, "roll": 27 },
            "idempotency_token": "aria-check",
        }),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["outcome"], "rejected");
    assert_eq!(json["reason"]["code"], "malformed_action");
}

#[tokio::test]
async fn test_non_participant_action_is_rejected() {
    // Arrange
    let app = common::build_test_app(vec![human("Aria")]);
    let session_id = common::start_session(&app).await;

    // Act
    let (status, json) = common::post_json(
        app,
        &format!("/api/v1/sessions/{session_id}/actions"),
        &common::attack(Uuid::new_v4(), "stranger"),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["reason"]["code"], "not_a_participant");
}

#[tokio::test]
async fn test_resubmitted_token_returns_original_outcome() {
    // Arrange
    let aria = human("Aria");
    let bram = human("Bram");
    let app = common::build_test_app(vec![aria.clone(), bram]);
    let session_id = common::start_session(&app).await;
    let uri = format!("/api/v1/sessions/{session_id}/actions");
    let (_, first) = common::post_json(app.clone(), &uri, &common::attack(aria.id, "once")).await;

    // Act
    let (status, second) =
        common::post_json(app.clone(), &uri, &common::attack(aria.id, "once")).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, second);
    let (_, view) = common::get_json(app, &format!("/api/v1/sessions/{session_id}")).await;
    assert_eq!(view["last_sequence_number"], first["sequence_number"]);
}

#[tokio::test]
async fn test_open_join_begin_flow() {
    // Arrange
    let aria = human("Aria");
    let bram = human("Bram");
    let app = common::build_test_app(vec![aria.clone(), bram.clone()]);

    // Act
    let (open_status, opened) = common::post_json(
        app.clone(),
        "/api/v1/sessions/open",
        &json!({ "campaign_id": Uuid::new_v4() }),
    )
    .await;
    let session_id = opened["session_id"].as_str().unwrap().to_owned();
    let (join_status, joined) = common::post_empty(
        app.clone(),
        &format!("/api/v1/sessions/{session_id}/participants/{}/join", bram.id),
    )
    .await;
    let (rejoin_status, rejoined) = common::post_empty(
        app.clone(),
        &format!("/api/v1/sessions/{session_id}/participants/{}/join", bram.id),
    )
    .await;
    let (begin_status, begun) =
        common::post_empty(app.clone(), &format!("/api/v1/sessions/{session_id}/begin")).await;
    let (again_status, again) =
        common::post_empty(app, &format!("/api/v1/sessions/{session_id}/begin")).await;

    // Assert
    assert_eq!(open_status, StatusCode::CREATED);
    assert_eq!(opened["status"], "pending");
    assert_eq!(join_status, StatusCode::OK);
    assert_eq!(joined["outcome"], "admitted");
    assert_eq!(joined["session"]["participants"], json!([bram.id]));
    assert_eq!(rejoin_status, StatusCode::CONFLICT);
    assert_eq!(rejoined["reason"]["code"], "already_joined");
    assert_eq!(begin_status, StatusCode::OK);
    assert_eq!(begun["session"]["status"], "active");
    assert_eq!(begun["session"]["active_participant_id"], json!(bram.id));
    assert_eq!(again_status, StatusCode::CONFLICT);
    assert_eq!(again["reason"]["code"], "already_started");
}

#[tokio::test]
async fn test_join_unknown_participant_is_rejected() {
    // Arrange
    let app = common::build_test_app(vec![human("Aria")]);
    let (_, opened) = common::post_json(
        app.clone(),
        "/api/v1/sessions/open",
        &json!({ "campaign_id": Uuid::new_v4() }),
    )
    .await;
    let session_id = opened["session_id"].as_str().unwrap();

    // Act
    let (status, json) = common::post_empty(
        app,
        &format!(
            "/api/v1/sessions/{session_id}/participants/{}/join",
            Uuid::new_v4()
        ),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["reason"]["code"], "unknown_participant");
}

#[tokio::test]
async fn test_pause_and_resume_control_admission() {
    // Arrange
    let aria = human("Aria");
    let app = common::build_test_app(vec![aria.clone()]);
    let session_id = common::start_session(&app).await;
    let base = format!("/api/v1/sessions/{session_id}");

    // Act
    let (pause_status, paused) = common::post_empty(app.clone(), &format!("{base}/pause")).await;
    let (propose_status, proposed) = common::post_json(
        app.clone(),
        &format!("{base}/actions"),
        &common::attack(aria.id, "while-paused"),
    )
    .await;
    let (resume_status, resumed) = common::post_empty(app.clone(), &format!("{base}/resume")).await;
    let (again_status, again) = common::post_empty(app, &format!("{base}/resume")).await;

    // Assert
    assert_eq!(pause_status, StatusCode::OK);
    assert_eq!(paused["session"]["status"], "paused");
    assert_eq!(propose_status, StatusCode::CONFLICT);
    assert_eq!(proposed["reason"]["code"], "session_not_active");
    assert_eq!(resume_status, StatusCode::OK);
    assert_eq!(resumed["session"]["status"], "active");
    assert_eq!(again_status, StatusCode::CONFLICT);
    assert_eq!(again["reason"]["code"], "session_not_paused");
}

#[tokio::test]
async fn test_complete_closes_session() {
    // Arrange
    let aria = human("Aria");
    let app = common::build_test_app(vec![aria.clone()]);
    let session_id = common::start_session(&app).await;
    let base = format!("/api/v1/sessions/{session_id}");

    // Act
    let (complete_status, completed) =
        common::post_empty(app.clone(), &format!("{base}/complete?reason=dragon%20slain")).await;
    let (propose_status, proposed) = common::post_json(
        app.clone(),
        &format!("{base}/actions"),
        &common::attack(aria.id, "too-late"),
    )
    .await;
    let (view_status, view) = common::get_json(app, &base).await;

    // Assert
    assert_eq!(complete_status, StatusCode::OK);
    assert_eq!(completed["outcome"], "admitted");
    assert_eq!(completed["session"]["status"], "completed");
    assert_eq!(propose_status, StatusCode::CONFLICT);
    assert_eq!(proposed["reason"]["code"], "session_closed");
    assert_eq!(view_status, StatusCode::OK);
    assert_eq!(view["status"], "completed");
}

#[tokio::test]
async fn test_leaving_turn_holder_passes_turn() {
    // Arrange
    let aria = human("Aria");
    let bram = human("Bram");
    let app = common::build_test_app(vec![aria.clone(), bram.clone()]);
    let session_id = common::start_session(&app).await;

    // Act
    let (status, json) = common::post_empty(
        app,
        &format!("/api/v1/sessions/{session_id}/participants/{}/leave", aria.id),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "admitted");
    assert_eq!(json["session"]["participants"], json!([bram.id]));
    assert_eq!(json["session"]["active_participant_id"], json!(bram.id));
}

#[tokio::test]
async fn test_subscribe_without_upgrade_is_a_client_error() {
    // Arrange
    let app = common::build_test_app(vec![human("Aria")]);
    let session_id = common::start_session(&app).await;

    // Act
    let request = axum::http::Request::builder()
        .method("GET")
        .uri(format!("/api/v1/sessions/{session_id}/subscribe"))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app, request).await.unwrap();

    // Assert
    assert!(response.status().is_client_error());
    assert_ne!(response.status(), StatusCode::NOT_FOUND);
}
