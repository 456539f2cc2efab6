//! Reconnecting WebSocket client for the Switchboard relay
//!
//! The client fetches a short-lived ticket over HTTP, opens the relay socket,
//! authenticates (by ticket, or with an `auth` message when no ticket could be
//! obtained), and then keeps the connection alive:
//!
//! - reconnects with jittered exponential backoff after involuntary closes
//! - replays every subscription after each successful authentication
//! - answers application pings and sends keepalives
//! - optionally seals and opens domain payloads end-to-end
//!
//! Errors that the caller should know about are published on
//! [`SyncClient::errors`]; transport failures are recovered silently.

mod backoff;
mod client;
mod config;
mod error;
mod ticket;
mod transport;

pub use backoff::{capped_delay, delay, ReconnectPolicy, MIN_DELAY};
pub use client::{ConnectionStatus, Reconnected, SyncClient};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, ConnectionError};
pub use ticket::{HttpTicketSource, TicketSource};
pub use transport::{CloseFrame, Connector, Frame, Socket, TungsteniteConnector};

pub use switchboard_protocol::SyncMessage;
