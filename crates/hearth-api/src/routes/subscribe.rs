//! WebSocket stream of session updates.
//!
//! Each frame is one JSON `SessionUpdate`: a snapshot first, then deltas in
//! sequence order. When the server reports `resync_required` the socket
//! stays open and a fresh snapshot follows.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use hearth_session::SessionOrchestrator;
use hearth_session::application::broadcaster::{SessionUpdate, Subscription};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Query string for GET /{id}/subscribe.
#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    /// Participant the connection speaks for; omitted for spectators.
    pub participant_id: Option<Uuid>,
}

enum Step {
    Update(Option<SessionUpdate>),
    Inbound(Option<Result<Message, axum::Error>>),
}

/// GET /{id}/subscribe
///
/// The subscription is opened before the upgrade so unknown sessions and
/// participants are answered with a plain HTTP error.
#[instrument(skip(state, ws, query), fields(participant_id = ?query.participant_id))]
pub async fn subscribe(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<SubscribeQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let subscription = state
        .orchestrator
        .subscribe(session_id, query.participant_id)
        .await?;
    info!(subscription_id = %subscription.id, "session subscription opened");

    let orchestrator = state.orchestrator.clone();
    Ok(ws.on_upgrade(move |socket| stream_updates(socket, orchestrator, subscription)))
}

async fn stream_updates(
    mut socket: WebSocket,
    orchestrator: SessionOrchestrator,
    mut subscription: Subscription,
) {
    loop {
        let step = tokio::select! {
            update = subscription.recv() => Step::Update(update),
            inbound = socket.recv() => Step::Inbound(inbound),
        };

        match step {
            Step::Update(Some(update)) => {
                let resync = matches!(update, SessionUpdate::ResyncRequired { .. });
                if send_update(&mut socket, &update).await.is_err() {
                    break;
                }
                if resync {
                    match orchestrator.resync(subscription).await {
                        Ok(fresh) => subscription = fresh,
                        Err(e) => {
                            warn!(error = %e, "resubscribe failed");
                            let _ = socket.send(Message::Close(None)).await;
                            return;
                        }
                    }
                }
            }
            Step::Update(None) => {
                debug!(subscription_id = %subscription.id, "session stream ended");
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            Step::Inbound(Some(Ok(Message::Close(_)) | Err(_)) | None) => break,
            // Clients only listen; pings are answered by the socket itself.
            Step::Inbound(Some(Ok(_))) => {}
        }
    }

    info!(subscription_id = %subscription.id, "session subscription closed");
    orchestrator.unsubscribe(subscription).await;
}

async fn send_update(socket: &mut WebSocket, update: &SessionUpdate) -> Result<(), axum::Error> {
    match serde_json::to_string(update) {
        Ok(json) => socket.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "failed to serialize session update");
            Ok(())
        }
    }
}
