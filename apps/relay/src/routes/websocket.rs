//! WebSocket endpoints and their HTTP companions
//!
//! - `GET /v1/updates`, `GET /v1/websocket` - socket upgrade
//! - `POST /v1/websocket/ticket` - issue a connection ticket
//! - `GET /v1/websocket/stats` - caller's router stats
//! - `POST /v1/websocket/broadcast` - push an event to the caller's sockets
//!
//! Everything except the upgrade requires a bearer token.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use switchboard_protocol::{
    BroadcastRequest, BroadcastResponse, Envelope, RouterStats, TicketResponse,
};

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::websocket::ws_handler;

/// Create the WebSocket router
pub fn websocket_router() -> Router<AppState> {
    Router::new()
        .route("/v1/updates", get(ws_handler))
        .route("/v1/websocket", get(ws_handler))
        .route("/v1/websocket/ticket", post(issue_ticket))
        .route("/v1/websocket/stats", get(stats))
        .route("/v1/websocket/broadcast", post(broadcast))
}

async fn issue_ticket(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<TicketResponse>> {
    let ticket = state.tickets.issue(&auth.user_id);

    tracing::debug!(user_id = %auth.user_id, "Connection ticket issued");

    Ok(Json(TicketResponse { ticket }))
}

async fn stats(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<RouterStats>> {
    Ok(Json(state.routers.stats(&auth.user_id).await?))
}

/// Deliver `{event: message.type, data: message.payload}` to matching sockets
async fn broadcast(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<BroadcastRequest>, JsonRejection>,
) -> ApiResult<Json<BroadcastResponse>> {
    let Json(BroadcastRequest { message, filter }) =
        body.map_err(|rejection| ApiError::InvalidBody(rejection.body_text()))?;
    if message.kind.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "message.type must not be empty".to_string(),
        ));
    }

    let mut envelope = Envelope::new(message.kind);
    envelope.data = message.payload;

    let delivered = state
        .routers
        .broadcast(&auth.user_id, envelope, filter.unwrap_or_default())
        .await?;

    tracing::info!(user_id = %auth.user_id, delivered, "HTTP broadcast");

    Ok(Json(BroadcastResponse {
        success: true,
        delivered,
    }))
}
