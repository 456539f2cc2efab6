//! Shared test utilities for the Switchboard workspace
//!
//! Mock implementations of the HTTP collaborators the sync client talks to,
//! so client tests run without a relay.
//!
//! # Mock Services
//!
//! - [`MockTicketServer`] - Mock relay ticket endpoint (`POST /v1/websocket/ticket`)
//!
//! # Example
//!
//! ```rust,ignore
//! use switchboard_test_utils::MockTicketServer;
//!
//! #[tokio::test]
//! async fn test_with_ticket_server() {
//!     let server = MockTicketServer::start().await;
//!     server.mock_ticket_success("valid-token", "ticket-123").await;
//!
//!     // Point ClientConfig::new(server.url(), "valid-token") at it
//! }
//! ```

mod ticket;

pub use ticket::{MockTicketServer, TICKET_PATH};
