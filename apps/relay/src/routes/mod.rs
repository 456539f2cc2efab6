//! HTTP route handlers
//!
//! - `health` - liveness checks
//! - `websocket` - upgrade endpoints plus ticket, stats and broadcast

pub mod health;
pub mod websocket;

pub use health::health_router;
pub use websocket::websocket_router;
