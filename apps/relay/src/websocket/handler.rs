//! WebSocket upgrade handler and per-socket loop
//!
//! Identity is resolved before the upgrade from, in order, `?ticket=`, the
//! `Authorization: Bearer` header and `?token=`. A credential that is present
//! but invalid is rejected with 401. With no credential at all, and message
//! auth enabled, the socket is accepted in a pending state and must send an
//! `auth` frame before the auth timeout.

use std::borrow::Cow;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header::UPGRADE, HeaderMap},
    response::{IntoResponse, Response},
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use serde_json::json;
use switchboard_protocol::{
    close_code, BroadcastFilter, ClientScope, ConnectedPayload, Envelope, SyncMessage,
    AUTH_TIMEOUT_REASON,
};
use tokio::sync::mpsc;

use super::connection::{Connection, SocketHandle};
use super::router::UserRouterHandle;
use crate::error::{ApiError, ApiResult};
use crate::middleware::extract_bearer_token;
use crate::state::AppState;

/// Query parameters accepted on the upgrade request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatesQuery {
    /// Short-lived connection ticket
    pub ticket: Option<String>,
    /// Bearer token, for clients that cannot set headers
    pub token: Option<String>,
    /// `user-scoped` (default), `session-scoped` or `machine-scoped`
    pub client_type: Option<String>,
    pub session_id: Option<String>,
    pub machine_id: Option<String>,
}

/// `GET /v1/updates` and `GET /v1/websocket`
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<UpdatesQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> ApiResult<Response> {
    if !is_websocket_upgrade(&headers) {
        return Err(ApiError::UpgradeRequired);
    }

    let identity = authenticate_upgrade(&state, &params, &headers)?;

    let scope = ClientScope::resolve(
        params.client_type.as_deref(),
        params.session_id.as_deref(),
        params.machine_id.as_deref(),
    )?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!(reason = %rejection.body_text(), "WebSocket upgrade rejected");
            return Ok(rejection.into_response());
        }
    };

    match &identity {
        Some(user_id) => tracing::debug!(
            user_id = %user_id,
            client_type = %scope.client_type(),
            "WebSocket upgrade authenticated"
        ),
        None => tracing::debug!(
            client_type = %scope.client_type(),
            "WebSocket upgrade pending message auth"
        ),
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, identity, scope)))
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

/// Resolve the caller before upgrading
///
/// `Ok(None)` means no credential was presented and the socket may
/// authenticate with its first frame.
fn authenticate_upgrade(
    state: &AppState,
    params: &UpdatesQuery,
    headers: &HeaderMap,
) -> ApiResult<Option<String>> {
    fn non_empty(value: &Option<String>) -> Option<&str> {
        value.as_deref().filter(|s| !s.is_empty())
    }

    if let Some(ticket) = non_empty(&params.ticket) {
        return state
            .tickets
            .verify(ticket)
            .map(|claims| Some(claims.user_id))
            .ok_or_else(|| ApiError::InvalidToken("invalid or expired ticket".to_string()));
    }

    if let Some(token) = extract_bearer_token(headers).or_else(|| non_empty(&params.token)) {
        return state
            .tokens
            .verify_access_token(token)
            .map(|claims| Some(claims.sub));
    }

    if state.config.message_auth_enabled {
        Ok(None)
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// Handle an upgraded socket until either side closes it
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    identity: Option<String>,
    scope: ClientScope,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let user_id = match identity {
        Some(user_id) => user_id,
        None => match authenticate_by_message(&mut ws_sender, &mut ws_receiver, &state).await {
            Some(user_id) => user_id,
            None => return,
        },
    };

    let router = state.routers.router_for(&user_id);
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
    let connection = Connection::new(scope.clone(), tx.clone());
    let connection_id = connection.id.clone();

    // Queued before registration so no broadcast can overtake it
    let connected = SyncMessage::Connected(ConnectedPayload {
        connection_id: connection_id.clone(),
        user_id: user_id.clone(),
        client_type: scope.client_type(),
    });
    let _ = tx.send(connected.into_envelope());

    if let Err(e) = router.register(connection) {
        tracing::error!(error = %e, user_id = %user_id, "Failed to register connection");
        let _ = ws_sender.close().await;
        drop(router);
        state.routers.release(&user_id);
        return;
    }

    let send_connection_id = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            if ws_sender
                .send(Message::Text(envelope.to_json()))
                .await
                .is_err()
            {
                tracing::debug!(connection_id = %send_connection_id, "WebSocket send failed");
                break;
            }
        }
    });

    let inbound = InboundHandler {
        router: router.clone(),
        connection_id: connection_id.clone(),
        sender: tx,
    };
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => inbound.handle_text(&text).await,
                Ok(Message::Binary(_)) => {
                    tracing::debug!(
                        connection_id = %inbound.connection_id,
                        "Received unsupported binary message"
                    );
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => inbound.touch(),
                Ok(Message::Close(_)) => {
                    tracing::debug!(connection_id = %inbound.connection_id, "WebSocket close received");
                    break;
                }
                Err(e) => {
                    tracing::debug!(
                        error = %e,
                        connection_id = %inbound.connection_id,
                        "WebSocket error"
                    );
                    break;
                }
            }
        }
    });

    // The aborted task is awaited so its router handle is gone before release
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
            recv_task.abort();
            let _ = recv_task.await;
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
            send_task.abort();
            let _ = send_task.await;
        }
    }

    let _ = router.remove(&connection_id);
    drop(router);
    state.routers.release(&user_id);

    tracing::info!(
        user_id = %user_id,
        connection_id = %connection_id,
        "WebSocket connection closed"
    );
}

/// Wait for the `auth` frame on a pending socket
///
/// Closes the socket with 4001 and returns `None` on timeout, on a first
/// frame that is not `auth`, or on a token that does not verify.
async fn authenticate_by_message(
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut SplitStream<WebSocket>,
    state: &AppState,
) -> Option<String> {
    let text = match tokio::time::timeout(state.config.auth_timeout, next_text(receiver)).await {
        Ok(Some(text)) => text,
        Ok(None) => {
            tracing::debug!("Socket closed before authenticating");
            return None;
        }
        Err(_) => {
            tracing::warn!(
                timeout_ms = state.config.auth_timeout.as_millis() as u64,
                "WebSocket auth timed out"
            );
            close(sender, close_code::AUTH_FAILED, AUTH_TIMEOUT_REASON).await;
            return None;
        }
    };

    let payload = match Envelope::parse(&text).and_then(SyncMessage::from_envelope) {
        Ok(SyncMessage::Auth(payload)) => payload,
        Ok(other) => {
            tracing::warn!(event = %other.event(), "Expected auth as first frame");
            reject(sender, "Authentication required").await;
            return None;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Malformed auth frame");
            reject(sender, "Authentication required").await;
            return None;
        }
    };

    match state.tokens.verify_access_token(&payload.token) {
        Ok(claims) => {
            tracing::debug!(user_id = %claims.sub, "WebSocket message auth succeeded");
            Some(claims.sub)
        }
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket message auth failed");
            reject(sender, "Authentication failed").await;
            None
        }
    }
}

/// Next text frame, skipping control frames; `None` once the socket is done
async fn next_text(receiver: &mut SplitStream<WebSocket>) -> Option<String> {
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

/// Send `auth-error` and close with 4001
async fn reject(sender: &mut SplitSink<WebSocket, Message>, message: &str) {
    let error = SyncMessage::AuthError {
        message: message.to_string(),
    };
    let _ = sender.send(Message::Text(error.to_json())).await;
    close(sender, close_code::AUTH_FAILED, message).await;
}

async fn close(sender: &mut SplitSink<WebSocket, Message>, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: Cow::Owned(reason.to_string()),
    };
    let _ = sender.send(Message::Close(Some(frame))).await;
}

/// Applies frames from one registered socket
struct InboundHandler {
    router: UserRouterHandle,
    connection_id: String,
    sender: SocketHandle,
}

impl InboundHandler {
    fn touch(&self) {
        let _ = self.router.touch(self.connection_id.as_str());
    }

    async fn handle_text(&self, text: &str) {
        self.touch();

        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(
                    error = %e,
                    connection_id = %self.connection_id,
                    "Ignoring unparseable frame"
                );
                return;
            }
        };

        let event = envelope.event.clone();
        let ack_id = envelope.ack_id.clone();
        let relayed = Envelope {
            ack_id: None,
            ack: None,
            ..envelope.clone()
        };

        let delivered = match SyncMessage::from_envelope(envelope) {
            Ok(SyncMessage::Ping) => {
                let _ = self.sender.send(SyncMessage::Pong.into_envelope());
                0
            }
            Ok(SyncMessage::Subscribe { session_id }) => {
                let _ = self.router.subscribe(self.connection_id.as_str(), session_id);
                0
            }
            Ok(SyncMessage::Unsubscribe { session_id }) => {
                let _ = self.router.unsubscribe(self.connection_id.as_str(), session_id);
                0
            }
            Ok(message) if message.is_domain() => {
                let filter = BroadcastFilter::Exclude {
                    connection_id: self.connection_id.clone(),
                };
                match self.router.broadcast(relayed, filter).await {
                    Ok(delivered) => delivered,
                    Err(e) => {
                        tracing::error!(error = %e, "Relay failed");
                        0
                    }
                }
            }
            Ok(message) => {
                tracing::debug!(
                    event = %message.event(),
                    connection_id = %self.connection_id,
                    "Ignoring non-relayable event"
                );
                0
            }
            Err(e) => {
                tracing::debug!(
                    error = %e,
                    connection_id = %self.connection_id,
                    "Ignoring invalid frame"
                );
                return;
            }
        };

        if let Some(ack_id) = ack_id {
            let reply = Envelope::ack_reply(event, ack_id, json!({ "delivered": delivered }));
            let _ = self.sender.send(reply);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::http::{header::AUTHORIZATION, HeaderValue};

    fn state() -> AppState {
        AppState::new(Config::new("jwt-secret", "ticket-secret"))
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_query_params_deserialization() {
        let params: UpdatesQuery = serde_json::from_str(
            r#"{"ticket":"t","clientType":"session-scoped","sessionId":"s1"}"#,
        )
        .unwrap();
        assert_eq!(params.ticket.as_deref(), Some("t"));
        assert_eq!(params.client_type.as_deref(), Some("session-scoped"));
        assert_eq!(params.session_id.as_deref(), Some("s1"));
        assert_eq!(params.machine_id, None);
    }

    #[test]
    fn test_is_websocket_upgrade() {
        let mut headers = HeaderMap::new();
        assert!(!is_websocket_upgrade(&headers));
        headers.insert(UPGRADE, HeaderValue::from_static("WebSocket"));
        assert!(is_websocket_upgrade(&headers));
        headers.insert(UPGRADE, HeaderValue::from_static("h2c"));
        assert!(!is_websocket_upgrade(&headers));
    }

    #[test]
    fn test_ticket_takes_precedence() {
        let state = state();
        let params = UpdatesQuery {
            ticket: Some(state.tickets.issue("from-ticket")),
            ..Default::default()
        };
        let token = state.tokens.issue_access_token("from-header").unwrap();

        let identity = authenticate_upgrade(&state, &params, &bearer(&token)).unwrap();
        assert_eq!(identity.as_deref(), Some("from-ticket"));
    }

    #[test]
    fn test_invalid_ticket_is_not_retried_with_header() {
        let state = state();
        let params = UpdatesQuery {
            ticket: Some("forged.ticket".to_string()),
            ..Default::default()
        };
        let token = state.tokens.issue_access_token("user-1").unwrap();

        let result = authenticate_upgrade(&state, &params, &bearer(&token));
        assert!(matches!(result, Err(ApiError::InvalidToken(_))));
    }

    #[test]
    fn test_header_then_query_token() {
        let state = state();
        let query_token = state.tokens.issue_access_token("from-query").unwrap();
        let header_token = state.tokens.issue_access_token("from-header").unwrap();
        let params = UpdatesQuery {
            token: Some(query_token),
            ..Default::default()
        };

        let identity = authenticate_upgrade(&state, &params, &bearer(&header_token)).unwrap();
        assert_eq!(identity.as_deref(), Some("from-header"));

        let identity = authenticate_upgrade(&state, &params, &HeaderMap::new()).unwrap();
        assert_eq!(identity.as_deref(), Some("from-query"));
    }

    #[test]
    fn test_no_credentials() {
        let state = state();
        let identity = authenticate_upgrade(&state, &UpdatesQuery::default(), &HeaderMap::new());
        assert!(matches!(identity, Ok(None)));

        let mut config = Config::new("jwt-secret", "ticket-secret");
        config.message_auth_enabled = false;
        let strict = AppState::new(config);
        let result = authenticate_upgrade(&strict, &UpdatesQuery::default(), &HeaderMap::new());
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_inbound_subscribe_and_ping() {
        let state = state();
        let router = state.routers.router_for("user-1");
        let (tx, mut rx) = mpsc::unbounded_channel();
        router
            .register(Connection::with_id("c1", ClientScope::User, tx.clone()))
            .unwrap();
        let inbound = InboundHandler {
            router: router.clone(),
            connection_id: "c1".to_string(),
            sender: tx,
        };

        inbound.handle_text(r#"{"event":"ping"}"#).await;
        assert_eq!(rx.recv().await.unwrap().event, "pong");

        inbound
            .handle_text(r#"{"event":"subscribe","data":{"sessionId":"s1"}}"#)
            .await;
        let delivered = router
            .broadcast(
                Envelope::new("session"),
                BroadcastFilter::Session {
                    session_id: "s1".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(delivered, 1);

        inbound.handle_text("not json").await;
        assert_eq!(router.stats().await.unwrap().total_connections, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_inbound_domain_event_is_relayed_and_acked() {
        let state = state();
        let router = state.routers.router_for("user-1");
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        router
            .register(Connection::with_id("a", ClientScope::User, tx_a.clone()))
            .unwrap();
        router
            .register(Connection::with_id("b", ClientScope::User, tx_b))
            .unwrap();
        let inbound = InboundHandler {
            router,
            connection_id: "a".to_string(),
            sender: tx_a,
        };

        inbound
            .handle_text(r#"{"event":"message","data":{"text":"hi"},"ackId":"ack-1"}"#)
            .await;

        let relayed = rx_b.recv().await.unwrap();
        assert_eq!(relayed.event, "message");
        assert_eq!(relayed.data, Some(json!({"text": "hi"})));
        assert_eq!(relayed.ack_id, None);

        let ack = rx_a.recv().await.unwrap();
        assert_eq!(ack.ack_id.as_deref(), Some("ack-1"));
        assert_eq!(ack.ack, Some(json!({"delivered": 1})));
    }
}
