//! Mock ticket endpoint
//!
//! Provides a [`MockTicketServer`] that answers `POST /v1/websocket/ticket`
//! the way the relay does, for testing ticket retrieval and the message-auth
//! fallback without a running relay.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path of the ticket endpoint on the relay
pub const TICKET_PATH: &str = "/v1/websocket/ticket";

/// Mock relay ticket endpoint
///
/// This struct wraps a [`wiremock::MockServer`] and provides convenience methods
/// for setting up the responses the relay gives.
pub struct MockTicketServer {
    server: MockServer,
}

impl MockTicketServer {
    /// Start a new mock ticket server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Issue `ticket` to requests bearing `token`; other tokens get 401
    pub async fn mock_ticket_success(&self, token: &str, ticket: &str) {
        Mock::given(method("POST"))
            .and(path(TICKET_PATH))
            .and(header("authorization", format!("Bearer {}", token).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ticket": ticket })))
            .with_priority(1)
            .mount(&self.server)
            .await;

        self.mock_ticket_unauthorized().await;
    }

    /// Reject every ticket request with 401
    pub async fn mock_ticket_unauthorized(&self) {
        Mock::given(method("POST"))
            .and(path(TICKET_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": "UNAUTHORIZED",
                "message": "Invalid or expired token"
            })))
            .with_priority(10)
            .mount(&self.server)
            .await;
    }

    /// Mount a failure response with an arbitrary status
    pub async fn mock_ticket_failure(&self, status_code: u16) {
        Mock::given(method("POST"))
            .and(path(TICKET_PATH))
            .respond_with(ResponseTemplate::new(status_code).set_body_json(json!({
                "code": "INTERNAL_ERROR",
                "message": "An internal error occurred"
            })))
            .mount(&self.server)
            .await;
    }

    /// Respond with a body that is not a ticket
    pub async fn mock_ticket_malformed(&self) {
        Mock::given(method("POST"))
            .and(path(TICKET_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
            .mount(&self.server)
            .await;
    }

    /// Answer successfully, but only after `delay`
    pub async fn mock_ticket_delay(&self, ticket: &str, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(TICKET_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(delay)
                    .set_body_json(json!({ "ticket": ticket })),
            )
            .mount(&self.server)
            .await;
    }

    /// Number of ticket requests received so far
    pub async fn ticket_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| {
                requests
                    .iter()
                    .filter(|r| r.url.path() == TICKET_PATH)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Get reference to the underlying mock server for custom mock setups
    pub fn inner(&self) -> &MockServer {
        &self.server
    }
}
