//! HTTP request and response bodies of the relay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response of `POST /v1/websocket/ticket`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketResponse {
    pub ticket: String,
}

/// Which of a user's connections a broadcast reaches
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BroadcastFilter {
    #[default]
    All,
    UserScopedOnly,
    /// Session-scoped connections bound to the id, plus any subscriber of it
    Session {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// Machine-scoped connections bound to the id
    Machine {
        #[serde(rename = "machineId")]
        machine_id: String,
    },
    /// Everything except one connection
    Exclude {
        #[serde(rename = "connectionId")]
        connection_id: String,
    },
}

/// Message submitted to `POST /v1/websocket/broadcast`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    /// Delivered to sockets as the frame's `event`
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub message: BroadcastMessage,
    #[serde(default)]
    pub filter: Option<BroadcastFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub success: bool,
    pub delivered: usize,
}

/// Connection counts per scope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeCounts {
    #[serde(rename = "user-scoped")]
    pub user_scoped: usize,
    #[serde(rename = "session-scoped")]
    pub session_scoped: usize,
    #[serde(rename = "machine-scoped")]
    pub machine_scoped: usize,
}

/// Snapshot of one user's router
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterStats {
    pub total_connections: usize,
    pub by_type: ScopeCounts,
    /// Distinct session ids bound by session-scoped connections
    pub active_sessions: usize,
    /// Distinct machine ids bound by machine-scoped connections
    pub active_machines: usize,
    /// Connect time of the longest-lived connection, `null` when empty
    pub oldest_connection: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!({"type": "all"}), BroadcastFilter::All)]
    #[case(json!({"type": "user-scoped-only"}), BroadcastFilter::UserScopedOnly)]
    #[case(
        json!({"type": "session", "sessionId": "s1"}),
        BroadcastFilter::Session { session_id: "s1".into() }
    )]
    #[case(
        json!({"type": "machine", "machineId": "m1"}),
        BroadcastFilter::Machine { machine_id: "m1".into() }
    )]
    #[case(
        json!({"type": "exclude", "connectionId": "c1"}),
        BroadcastFilter::Exclude { connection_id: "c1".into() }
    )]
    fn test_filter_wire_format(#[case] wire: Value, #[case] expected: BroadcastFilter) {
        let parsed: BroadcastFilter = serde_json::from_value(wire.clone()).unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(serde_json::to_value(&expected).unwrap(), wire);
    }

    #[test]
    fn test_broadcast_request_filter_optional() {
        let request: BroadcastRequest = serde_json::from_value(json!({
            "message": {"type": "session", "timestamp": 1}
        }))
        .unwrap();

        assert!(request.filter.is_none());
        assert_eq!(request.message.kind, "session");
        assert!(request.message.payload.is_none());
    }

    #[test]
    fn test_empty_stats_shape() {
        let value = serde_json::to_value(RouterStats::default()).unwrap();

        assert_eq!(
            value,
            json!({
                "totalConnections": 0,
                "byType": {"user-scoped": 0, "session-scoped": 0, "machine-scoped": 0},
                "activeSessions": 0,
                "activeMachines": 0,
                "oldestConnection": null
            })
        );
    }
}
