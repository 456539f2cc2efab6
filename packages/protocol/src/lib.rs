//! Wire protocol shared by the Switchboard relay and its clients
//!
//! Frames are JSON objects of the form `{event, data?, ackId?, ack?}` sent as
//! WebSocket text messages. The HTTP bodies used around the socket (tickets,
//! stats, broadcast) live here too so both ends agree on their shape.

mod api;
mod envelope;
mod error;
mod message;
mod scope;

pub use api::{
    BroadcastFilter, BroadcastMessage, BroadcastRequest, BroadcastResponse, RouterStats,
    ScopeCounts, TicketResponse,
};
pub use envelope::Envelope;
pub use error::{ProtocolError, ProtocolResult};
pub use message::{
    close_code, events, AuthPayload, ConnectedPayload, SyncMessage, AUTH_TIMEOUT_REASON,
};
pub use scope::{ClientScope, ClientType};
