//! Business logic services for the relay
//!
//! - `auth` - bearer token verification
//! - `ticket` - short-lived connection tickets

pub mod auth;
pub mod ticket;

pub use auth::{AuthConfig, Claims, TokenService};
pub use ticket::{create_ticket, verify_ticket, TicketClaims, TicketService, TICKET_TTL};
