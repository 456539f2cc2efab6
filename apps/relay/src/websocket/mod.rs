//! Real-time relay over WebSocket
//!
//! This module handles:
//! - Upgrade validation and authentication (ticket, bearer token or `auth` frame)
//! - One router task per user owning that user's live sockets
//! - Scoped fan-out of domain events between a user's devices

pub mod connection;
pub mod handler;
pub mod registry;
pub mod router;

pub use connection::{Connection, ConnectionClosed, SocketHandle};
pub use handler::{ws_handler, UpdatesQuery};
pub use registry::RouterRegistry;
pub use router::{UserRouter, UserRouterHandle};
