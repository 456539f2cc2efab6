//! Per-user connection router
//!
//! Every user gets one [`UserRouter`] task that owns that user's connection
//! set. Registration, removal, subscription changes, broadcasts and stats are
//! all commands on one channel, so they apply in the order they were sent and
//! no two requests ever touch the set concurrently. In particular, a socket
//! task that sends `Remove` before a later broadcast is guaranteed that the
//! broadcast no longer sees the connection.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use switchboard_protocol::{BroadcastFilter, ClientType, Envelope, RouterStats, ScopeCounts};
use tokio::sync::{mpsc, oneshot};

use super::connection::Connection;
use crate::error::{ApiError, ApiResult};

enum RouterCommand {
    Register {
        connection: Connection,
    },
    Remove {
        connection_id: String,
    },
    Subscribe {
        connection_id: String,
        session_id: String,
    },
    Unsubscribe {
        connection_id: String,
        session_id: String,
    },
    Touch {
        connection_id: String,
    },
    Broadcast {
        envelope: Envelope,
        filter: BroadcastFilter,
        reply: oneshot::Sender<usize>,
    },
    Stats {
        reply: oneshot::Sender<RouterStats>,
    },
}

/// Actor owning one user's connections
pub struct UserRouter {
    user_id: Arc<str>,
    connections: HashMap<String, Connection>,
    commands: mpsc::UnboundedReceiver<RouterCommand>,
}

impl UserRouter {
    /// Spawn the router task for `user_id` and return its handle
    ///
    /// The task runs until every handle has been dropped.
    pub fn spawn(user_id: impl Into<Arc<str>>) -> UserRouterHandle {
        let user_id = user_id.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let router = Self {
            user_id: user_id.clone(),
            connections: HashMap::new(),
            commands: rx,
        };
        tokio::spawn(router.run());

        tracing::debug!(user_id = %user_id, "Connection router started");

        UserRouterHandle {
            user_id,
            commands: tx,
            holders: Arc::new(()),
        }
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }

        tracing::debug!(user_id = %self.user_id, "Connection router stopped");
    }

    fn handle(&mut self, command: RouterCommand) {
        match command {
            RouterCommand::Register { connection } => {
                tracing::info!(
                    user_id = %self.user_id,
                    connection_id = %connection.id,
                    client_type = %connection.scope.client_type(),
                    "Connection registered"
                );
                self.connections.insert(connection.id.clone(), connection);
            }
            RouterCommand::Remove { connection_id } => {
                if self.connections.remove(&connection_id).is_some() {
                    tracing::info!(
                        user_id = %self.user_id,
                        connection_id = %connection_id,
                        remaining = self.connections.len(),
                        "Connection removed"
                    );
                }
            }
            RouterCommand::Subscribe {
                connection_id,
                session_id,
            } => {
                if let Some(connection) = self.connections.get_mut(&connection_id) {
                    tracing::debug!(
                        connection_id = %connection_id,
                        session_id = %session_id,
                        "Subscribed to session"
                    );
                    connection.subscriptions.insert(session_id);
                }
            }
            RouterCommand::Unsubscribe {
                connection_id,
                session_id,
            } => {
                if let Some(connection) = self.connections.get_mut(&connection_id) {
                    tracing::debug!(
                        connection_id = %connection_id,
                        session_id = %session_id,
                        "Unsubscribed from session"
                    );
                    connection.subscriptions.remove(&session_id);
                }
            }
            RouterCommand::Touch { connection_id } => {
                if let Some(connection) = self.connections.get_mut(&connection_id) {
                    connection.touch();
                }
            }
            RouterCommand::Broadcast {
                envelope,
                filter,
                reply,
            } => {
                let delivered = self.broadcast(envelope, &filter);
                let _ = reply.send(delivered);
            }
            RouterCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn broadcast(&self, envelope: Envelope, filter: &BroadcastFilter) -> usize {
        let mut delivered = 0;

        for connection in self.connections.values() {
            if !connection.is_open() || !connection.matches(filter) {
                continue;
            }
            if connection.send(envelope.clone()).is_ok() {
                delivered += 1;
            }
        }

        tracing::debug!(
            user_id = %self.user_id,
            event = %envelope.event,
            ?filter,
            delivered,
            "Broadcast delivered"
        );

        delivered
    }

    fn stats(&self) -> RouterStats {
        let mut by_type = ScopeCounts::default();
        let mut sessions = HashSet::new();
        let mut machines = HashSet::new();

        for connection in self.connections.values() {
            match connection.scope.client_type() {
                ClientType::UserScoped => by_type.user_scoped += 1,
                ClientType::SessionScoped => by_type.session_scoped += 1,
                ClientType::MachineScoped => by_type.machine_scoped += 1,
            }
            if let Some(id) = connection.scope.session_id() {
                sessions.insert(id);
            }
            if let Some(id) = connection.scope.machine_id() {
                machines.insert(id);
            }
        }

        RouterStats {
            total_connections: self.connections.len(),
            by_type,
            active_sessions: sessions.len(),
            active_machines: machines.len(),
            oldest_connection: self.connections.values().map(|c| c.connected_at).min(),
        }
    }
}

/// Cloneable handle to a [`UserRouter`] task
#[derive(Clone)]
pub struct UserRouterHandle {
    user_id: Arc<str>,
    commands: mpsc::UnboundedSender<RouterCommand>,
    holders: Arc<()>,
}

impl UserRouterHandle {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Number of live clones of this handle, this one included
    pub fn holder_count(&self) -> usize {
        Arc::strong_count(&self.holders)
    }

    fn send(&self, command: RouterCommand) -> ApiResult<()> {
        self.commands
            .send(command)
            .map_err(|_| ApiError::RouterUnavailable(self.user_id.to_string()))
    }

    pub fn register(&self, connection: Connection) -> ApiResult<()> {
        self.send(RouterCommand::Register { connection })
    }

    pub fn remove(&self, connection_id: impl Into<String>) -> ApiResult<()> {
        self.send(RouterCommand::Remove {
            connection_id: connection_id.into(),
        })
    }

    pub fn subscribe(
        &self,
        connection_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> ApiResult<()> {
        self.send(RouterCommand::Subscribe {
            connection_id: connection_id.into(),
            session_id: session_id.into(),
        })
    }

    pub fn unsubscribe(
        &self,
        connection_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> ApiResult<()> {
        self.send(RouterCommand::Unsubscribe {
            connection_id: connection_id.into(),
            session_id: session_id.into(),
        })
    }

    /// Record inbound activity on a connection
    pub fn touch(&self, connection_id: impl Into<String>) -> ApiResult<()> {
        self.send(RouterCommand::Touch {
            connection_id: connection_id.into(),
        })
    }

    /// Deliver `envelope` to every open connection matching `filter`
    ///
    /// Returns how many connections accepted it.
    pub async fn broadcast(&self, envelope: Envelope, filter: BroadcastFilter) -> ApiResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(RouterCommand::Broadcast {
            envelope,
            filter,
            reply,
        })?;
        rx.await
            .map_err(|_| ApiError::RouterUnavailable(self.user_id.to_string()))
    }

    pub async fn stats(&self) -> ApiResult<RouterStats> {
        let (reply, rx) = oneshot::channel();
        self.send(RouterCommand::Stats { reply })?;
        rx.await
            .map_err(|_| ApiError::RouterUnavailable(self.user_id.to_string()))
    }
}

impl std::fmt::Debug for UserRouterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRouterHandle")
            .field("user_id", &self.user_id)
            .field("holders", &self.holder_count())
            .finish()
    }
}
