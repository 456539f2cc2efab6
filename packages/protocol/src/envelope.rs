//! JSON frame carried in both directions

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolResult;

/// Raw frame: `{event, data?, ackId?, ack?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub event: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Set by a sender that wants an `ack` reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<String>,

    /// Present on replies to a frame that carried `ackId`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<Value>,
}

impl Envelope {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: None,
            ack_id: None,
            ack: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_ack_id(mut self, ack_id: impl Into<String>) -> Self {
        self.ack_id = Some(ack_id.into());
        self
    }

    /// Build the reply to a frame that requested an acknowledgement
    pub fn ack_reply(event: impl Into<String>, ack_id: impl Into<String>, ack: Value) -> Self {
        Self {
            event: event.into(),
            data: None,
            ack_id: Some(ack_id.into()),
            ack: Some(ack),
        }
    }

    /// True when this frame answers an earlier `ackId`
    pub fn is_ack_reply(&self) -> bool {
        self.ack_id.is_some() && self.ack.is_some()
    }

    pub fn parse(text: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> String {
        // Serializing a struct of strings and Values cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}
