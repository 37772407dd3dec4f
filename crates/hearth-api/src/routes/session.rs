//! Routes for live sessions: lifecycle, proposals and snapshots.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hearth_core::action::ProposedAction;
use hearth_session::application::arbiter::Decision;
use hearth_session::application::query_handlers::SessionView;
use hearth_session::domain::outcome::Outcome;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use super::subscribe;
use crate::error::{ApiError, OutcomeResponse, outcome_status};
use crate::state::AppState;

/// Request body for POST / and POST /open.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Campaign whose roster and timeline the session snapshots.
    pub campaign_id: Uuid,
}

/// Request body for POST /{id}/actions.
#[derive(Debug, Deserialize)]
pub struct ProposeActionRequest {
    /// Who is proposing.
    pub participant_id: Uuid,
    /// Action kind.
    pub kind: String,
    /// Kind-specific payload.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Client-chosen token; resubmitting it returns the original outcome.
    pub idempotency_token: String,
}

/// Query string for POST /{id}/complete.
#[derive(Debug, Deserialize)]
pub struct CompleteQuery {
    /// Why the session ended.
    pub reason: Option<String>,
}

/// Response body for lifecycle commands: the outcome plus the session
/// as it stands afterwards.
#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    /// Admission or rejection.
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Session view after the command.
    pub session: SessionView,
}

impl From<Decision> for DecisionResponse {
    fn from(decision: Decision) -> Self {
        Self {
            outcome: decision.outcome,
            session: decision.view,
        }
    }
}

/// Renders a lifecycle decision with the status of its outcome.
fn respond(decision: Decision) -> Response {
    let status = outcome_status(&decision.outcome);
    (status, Json(DecisionResponse::from(decision))).into_response()
}

/// Created sessions answer with their view; a refused creation answers
/// like any other command.
fn created(decision: Decision) -> Response {
    if decision.outcome.is_admitted() {
        (StatusCode::CREATED, Json(decision.view)).into_response()
    } else {
        respond(decision)
    }
}

/// POST /
#[instrument(skip(state, request), fields(campaign_id = %request.campaign_id))]
async fn start_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Response, ApiError> {
    info!("handling start_session request");

    let decision = state
        .orchestrator
        .start_session(request.campaign_id)
        .await?;

    Ok(created(decision))
}

/// POST /open
#[instrument(skip(state, request), fields(campaign_id = %request.campaign_id))]
async fn open_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Response, ApiError> {
    info!("handling open_session request");

    let decision = state.orchestrator.open_session(request.campaign_id).await?;

    Ok(created(decision))
}

/// GET /{id}
#[instrument(skip(state))]
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let view = state.orchestrator.session_view(session_id).await?;
    Ok(Json(view))
}

/// POST /{id}/begin
#[instrument(skip(state))]
async fn begin_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    info!("handling begin_session request");
    let decision = state.orchestrator.begin_session(session_id).await?;
    Ok(respond(decision))
}

/// POST /{id}/actions
#[instrument(
    skip(state, request),
    fields(participant_id = %request.participant_id, kind = %request.kind)
)]
async fn propose_action(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<ProposeActionRequest>,
) -> Result<OutcomeResponse, ApiError> {
    info!("handling propose_action request");

    let action = ProposedAction::new(request.kind, request.payload);
    let outcome = state
        .orchestrator
        .propose_action(
            session_id,
            request.participant_id,
            action,
            request.idempotency_token,
        )
        .await?;

    Ok(OutcomeResponse(outcome))
}

/// POST /{id}/pause
#[instrument(skip(state))]
async fn pause_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    info!("handling pause_session request");
    let decision = state.orchestrator.pause_session(session_id).await?;
    Ok(respond(decision))
}

/// POST /{id}/resume
#[instrument(skip(state))]
async fn resume_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    info!("handling resume_session request");
    let decision = state.orchestrator.resume_session(session_id).await?;
    Ok(respond(decision))
}

/// POST /{id}/complete
#[instrument(skip(state, query))]
async fn complete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<CompleteQuery>,
) -> Result<Response, ApiError> {
    info!(reason = ?query.reason, "handling complete_session request");
    let decision = state.orchestrator.complete_session(session_id, query.reason).await?;
    Ok(respond(decision))
}

/// POST /{id}/participants/{pid}/join
#[instrument(skip(state))]
async fn join_session(
    State(state): State<AppState>,
    Path((session_id, participant_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ApiError> {
    info!("handling join_session request");
    let decision = state.orchestrator.join_session(session_id, participant_id).await?;
    Ok(respond(decision))
}

/// POST /{id}/participants/{pid}/leave
#[instrument(skip(state))]
async fn leave_session(
    State(state): State<AppState>,
    Path((session_id, participant_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ApiError> {
    info!("handling leave_session request");
    let decision = state.orchestrator.leave_session(session_id, participant_id).await?;
    Ok(respond(decision))
}

/// Returns the router for live sessions.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(start_session))
        .route("/open", post(open_session))
        .route("/{id}", get(get_session))
        .route("/{id}/begin", post(begin_session))
        .route("/{id}/actions", post(propose_action))
        .route("/{id}/pause", post(pause_session))
        .route("/{id}/resume", post(resume_session))
        .route("/{id}/complete", post(complete_session))
        .route("/{id}/participants/{pid}/join", post(join_session))
        .route("/{id}/participants/{pid}/leave", post(leave_session))
        .route("/{id}/subscribe", get(subscribe::subscribe))
}
