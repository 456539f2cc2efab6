//! A single registered socket, as seen by its user's router

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use switchboard_protocol::{BroadcastFilter, ClientScope, Envelope};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Sender feeding a socket's writer task
pub type SocketHandle = mpsc::UnboundedSender<Envelope>;

/// Error returned when the socket's writer task has gone away
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection closed")]
pub struct ConnectionClosed;

/// One live, authenticated connection
#[derive(Debug)]
pub struct Connection {
    /// Unique connection id (UUID v4)
    pub id: String,

    /// Scope declared at upgrade time
    pub scope: ClientScope,

    /// Channel to the socket's writer task
    pub sender: SocketHandle,

    /// Session ids this connection subscribed to
    pub subscriptions: HashSet<String>,

    /// When the connection was registered
    pub connected_at: DateTime<Utc>,

    /// Last inbound frame
    pub last_activity_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(scope: ClientScope, sender: SocketHandle) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), scope, sender)
    }

    pub fn with_id(id: impl Into<String>, scope: ClientScope, sender: SocketHandle) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            scope,
            sender,
            subscriptions: HashSet::new(),
            connected_at: now,
            last_activity_at: now,
        }
    }

    /// Whether the writer task is still draining this connection's channel
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    pub fn send(&self, envelope: Envelope) -> Result<(), ConnectionClosed> {
        self.sender.send(envelope).map_err(|_| ConnectionClosed)
    }

    /// Whether a broadcast with `filter` targets this connection
    pub fn matches(&self, filter: &BroadcastFilter) -> bool {
        match filter {
            BroadcastFilter::All => true,
            BroadcastFilter::UserScopedOnly => matches!(self.scope, ClientScope::User),
            BroadcastFilter::Session { session_id } => {
                self.scope.session_id() == Some(session_id.as_str())
                    || self.subscriptions.contains(session_id)
            }
            BroadcastFilter::Machine { machine_id } => {
                self.scope.machine_id() == Some(machine_id.as_str())
            }
            BroadcastFilter::Exclude { connection_id } => &self.id != connection_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn connection(id: &str, scope: ClientScope) -> (Connection, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::with_id(id, scope, tx), rx)
    }

    fn session(id: &str) -> BroadcastFilter {
        BroadcastFilter::Session {
            session_id: id.to_string(),
        }
    }

    fn machine(id: &str) -> BroadcastFilter {
        BroadcastFilter::Machine {
            machine_id: id.to_string(),
        }
    }

    #[rstest]
    #[case(ClientScope::User, BroadcastFilter::All, true)]
    #[case(ClientScope::Session("s1".into()), BroadcastFilter::All, true)]
    #[case(ClientScope::User, BroadcastFilter::UserScopedOnly, true)]
    #[case(ClientScope::Session("s1".into()), BroadcastFilter::UserScopedOnly, false)]
    #[case(ClientScope::Machine("m1".into()), BroadcastFilter::UserScopedOnly, false)]
    #[case(ClientScope::Session("s1".into()), session("s1"), true)]
    #[case(ClientScope::Session("s1".into()), session("s2"), false)]
    #[case(ClientScope::User, session("s1"), false)]
    #[case(ClientScope::Machine("m1".into()), machine("m1"), true)]
    #[case(ClientScope::Machine("m1".into()), machine("m2"), false)]
    #[case(ClientScope::Session("m1".into()), machine("m1"), false)]
    fn test_filter_matching(
        #[case] scope: ClientScope,
        #[case] filter: BroadcastFilter,
        #[case] expected: bool,
    ) {
        let (conn, _rx) = connection("c1", scope);
        assert_eq!(conn.matches(&filter), expected);
    }

    #[test]
    fn test_session_filter_includes_subscribers() {
        let (mut conn, _rx) = connection("c1", ClientScope::User);
        assert!(!conn.matches(&session("s9")));

        conn.subscriptions.insert("s9".to_string());
        assert!(conn.matches(&session("s9")));
    }

    #[test]
    fn test_exclude_filter() {
        let (conn, _rx) = connection("c1", ClientScope::User);
        let exclude = |id: &str| BroadcastFilter::Exclude {
            connection_id: id.to_string(),
        };
        assert!(!conn.matches(&exclude("c1")));
        assert!(conn.matches(&exclude("c2")));
    }

    #[test]
    fn test_open_tracks_receiver() {
        let (conn, rx) = connection("c1", ClientScope::User);
        assert!(conn.is_open());
        assert!(conn.send(Envelope::new("ping")).is_ok());

        drop(rx);
        assert!(!conn.is_open());
        assert_eq!(conn.send(Envelope::new("ping")), Err(ConnectionClosed));
    }

    #[test]
    fn test_new_connection_ids_are_unique() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = Connection::new(ClientScope::User, tx.clone());
        let b = Connection::new(ClientScope::User, tx);
        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());
    }
}
