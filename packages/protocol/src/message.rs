//! Recognized events and their payloads
//!
//! Every frame on the wire is an [`Envelope`]. [`SyncMessage`] is the typed
//! view over it: one variant per recognized event, with anything else kept as
//! [`SyncMessage::Unknown`] so callers can ignore it in a single match arm.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::Envelope;
use crate::error::{ProtocolError, ProtocolResult};
use crate::scope::ClientType;

/// Event names as they appear on the wire
pub mod events {
    pub const AUTH: &str = "auth";
    pub const CONNECTED: &str = "connected";
    pub const AUTH_ERROR: &str = "auth-error";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    pub const SESSION: &str = "session";
    pub const MESSAGE: &str = "message";
    pub const SESSION_REVIVAL_PAUSED: &str = "session-revival-paused";
    pub const SESSION_REVIVED: &str = "session-revived";
}

/// Close codes used by both ends
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const AUTH_FAILED: u16 = 4001;
}

/// Close reason sent when no `connected` arrives in time
pub const AUTH_TIMEOUT_REASON: &str = "Authentication timeout";

/// Payload of the `auth` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub token: String,
    #[serde(default)]
    pub client_type: ClientType,
}

/// Payload of the `connected` event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectedPayload {
    pub connection_id: String,
    pub user_id: String,
    pub client_type: ClientType,
}

impl ConnectedPayload {
    /// Read a `connected` payload without rejecting it
    ///
    /// Missing fields become defaults, non-string ids are stringified and an
    /// unrecognised `clientType` reads as `user-scoped`.
    pub fn from_value(data: &Value) -> Self {
        let text = |key: &str| match data.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        Self {
            connection_id: text("connectionId"),
            user_id: text("userId"),
            client_type: data
                .get("clientType")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        }
    }
}

/// Typed view over an [`Envelope`]
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    Auth(AuthPayload),
    Connected(ConnectedPayload),
    AuthError { message: String },
    Ping,
    Pong,
    Subscribe { session_id: String },
    Unsubscribe { session_id: String },
    Session(Value),
    Message(Value),
    SessionRevivalPaused(Value),
    SessionRevived(Value),
    Unknown { event: String, data: Option<Value> },
}

impl SyncMessage {
    pub fn event(&self) -> &str {
        match self {
            Self::Auth(_) => events::AUTH,
            Self::Connected(_) => events::CONNECTED,
            Self::AuthError { .. } => events::AUTH_ERROR,
            Self::Ping => events::PING,
            Self::Pong => events::PONG,
            Self::Subscribe { .. } => events::SUBSCRIBE,
            Self::Unsubscribe { .. } => events::UNSUBSCRIBE,
            Self::Session(_) => events::SESSION,
            Self::Message(_) => events::MESSAGE,
            Self::SessionRevivalPaused(_) => events::SESSION_REVIVAL_PAUSED,
            Self::SessionRevived(_) => events::SESSION_REVIVED,
            Self::Unknown { event, .. } => event,
        }
    }

    /// Domain events carry application payloads and are relayed verbatim
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::Session(_)
                | Self::Message(_)
                | Self::SessionRevivalPaused(_)
                | Self::SessionRevived(_)
        )
    }

    /// Domain payload, if this is a domain event
    pub fn domain_data(&self) -> Option<&Value> {
        match self {
            Self::Session(data)
            | Self::Message(data)
            | Self::SessionRevivalPaused(data)
            | Self::SessionRevived(data) => Some(data),
            _ => None,
        }
    }

    /// Build a domain event from its wire name, `None` for non-domain names
    pub fn domain(event: &str, data: Value) -> Option<Self> {
        match event {
            events::SESSION => Some(Self::Session(data)),
            events::MESSAGE => Some(Self::Message(data)),
            events::SESSION_REVIVAL_PAUSED => Some(Self::SessionRevivalPaused(data)),
            events::SESSION_REVIVED => Some(Self::SessionRevived(data)),
            _ => None,
        }
    }

    /// Decode the typed view of a frame
    ///
    /// Fails only when a control event is missing something it needs.
    pub fn from_envelope(envelope: Envelope) -> ProtocolResult<Self> {
        let Envelope { event, data, .. } = envelope;

        let message = match event.as_str() {
            events::AUTH => {
                let data = data.ok_or(ProtocolError::MissingField {
                    event: events::AUTH,
                    field: "data",
                })?;
                Self::Auth(serde_json::from_value(data)?)
            }
            events::CONNECTED => Self::Connected(
                data.as_ref()
                    .map(ConnectedPayload::from_value)
                    .unwrap_or_default(),
            ),
            events::AUTH_ERROR => Self::AuthError {
                message: data
                    .as_ref()
                    .and_then(|d| d.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("Authentication failed")
                    .to_string(),
            },
            events::PING => Self::Ping,
            events::PONG => Self::Pong,
            events::SUBSCRIBE => Self::Subscribe {
                session_id: session_id_of(events::SUBSCRIBE, data.as_ref())?,
            },
            events::UNSUBSCRIBE => Self::Unsubscribe {
                session_id: session_id_of(events::UNSUBSCRIBE, data.as_ref())?,
            },
            other => match Self::domain(other, data.clone().unwrap_or(Value::Null)) {
                Some(domain) => domain,
                None => Self::Unknown { event, data },
            },
        };

        Ok(message)
    }

    pub fn into_envelope(self) -> Envelope {
        let event = self.event().to_string();
        let data = match self {
            Self::Auth(payload) => serde_json::to_value(payload).ok(),
            Self::Connected(payload) => serde_json::to_value(payload).ok(),
            Self::AuthError { message } => Some(serde_json::json!({ "message": message })),
            Self::Ping | Self::Pong => None,
            Self::Subscribe { session_id } | Self::Unsubscribe { session_id } => {
                Some(serde_json::json!({ "sessionId": session_id }))
            }
            Self::Session(data)
            | Self::Message(data)
            | Self::SessionRevivalPaused(data)
            | Self::SessionRevived(data) => Some(data),
            Self::Unknown { data, .. } => data,
        };

        Envelope {
            event,
            data,
            ack_id: None,
            ack: None,
        }
    }

    pub fn to_json(self) -> String {
        self.into_envelope().to_json()
    }
}

fn session_id_of(event: &'static str, data: Option<&Value>) -> ProtocolResult<String> {
    data.and_then(|d| d.get("sessionId"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ProtocolError::MissingField {
            event,
            field: "sessionId",
        })
}
