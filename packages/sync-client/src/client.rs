//! Connection state machine
//!
//! [`SyncClient`] is a cheap handle. All connection state lives in a single
//! driver task that processes commands, socket frames, and timer deadlines one
//! at a time, so no state is shared between tasks.
//!
//! ```text
//! disconnected -> connecting -> authenticating -> connected
//!                     |               |               |
//!                     +---------------+---------------+--> error
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::Value;
use switchboard_envelope::EnvelopeCodec;
use switchboard_protocol::{
    close_code, AuthPayload, ConnectedPayload, Envelope, SyncMessage, AUTH_TIMEOUT_REASON,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_stream::wrappers::WatchStream;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, ConnectionError};
use crate::ticket::{HttpTicketSource, TicketSource};
use crate::transport::{CloseFrame, Connector, Frame, Socket, TungsteniteConnector};

/// Broadcast channel capacity for events
const EVENT_CAPACITY: usize = 256;

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Error,
}

impl ConnectionStatus {
    /// Connecting, authenticating, or connected
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Authenticating | Self::Connected
        )
    }
}

/// Published each time the client re-establishes a session after the first
///
/// Updates sent while the client was away may have been missed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconnected {
    pub connection_id: String,
}

enum Command {
    Connect,
    Disconnect {
        done: oneshot::Sender<()>,
    },
    Subscribe(String),
    Unsubscribe(String),
    Emit {
        event: String,
        data: Value,
        reply: EmitReply,
    },
}

enum EmitReply {
    Sent(oneshot::Sender<ClientResult<()>>),
    Ack(oneshot::Sender<ClientResult<Value>>),
}

/// Handle to a reconnecting relay connection
///
/// ```ignore
/// let client = SyncClient::new(ClientConfig::new("https://relay.example.com", token))?;
/// let mut messages = client.messages();
/// client.connect()?;
/// client.subscribe("session-1")?;
/// while let Ok(message) = messages.recv().await {
///     println!("{:?}", message);
/// }
/// ```
#[derive(Clone)]
pub struct SyncClient {
    commands: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<ConnectionStatus>,
    errors_tx: broadcast::Sender<ConnectionError>,
    reconnected_tx: broadcast::Sender<Reconnected>,
    messages_tx: broadcast::Sender<SyncMessage>,
}

impl SyncClient {
    /// Create a client using tokio-tungstenite and the relay's ticket endpoint
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let tickets = HttpTicketSource::new(&config)?;
        // Surface a malformed URL now rather than on every attempt
        config.socket_url(None)?;
        Ok(Self::with_transport(
            config,
            Arc::new(TungsteniteConnector),
            Arc::new(tickets),
        ))
    }

    /// Create a client with custom transport pieces
    pub fn with_transport(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        tickets: Arc<dyn TicketSource>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let (errors_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (reconnected_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (messages_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (attempts_tx, attempts_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            codec: config.encryption_key.as_ref().map(EnvelopeCodec::new),
            config,
            connector,
            tickets,
            status_tx,
            errors_tx: errors_tx.clone(),
            reconnected_tx: reconnected_tx.clone(),
            messages_tx: messages_tx.clone(),
            attempts_tx,
            attempts_rx,
            generation: 0,
            attempt: 0,
            manual_close: false,
            has_connected: false,
            subscriptions: BTreeSet::new(),
            socket: None,
            in_flight: None,
            auth_deadline: None,
            keepalive_deadline: None,
            reconnect_deadline: None,
            pending_acks: HashMap::new(),
        };
        tokio::spawn(driver.run(commands_rx));

        Self {
            commands: commands_tx,
            status_rx,
            errors_tx,
            reconnected_tx,
            messages_tx,
        }
    }

    fn command(&self, command: Command) -> ClientResult<()> {
        self.commands.send(command).map_err(|_| ClientError::Closed)
    }

    /// Start connecting; no-op while already connecting or connected
    pub fn connect(&self) -> ClientResult<()> {
        self.command(Command::Connect)
    }

    /// Close the connection and stop reconnecting
    ///
    /// Returns once every timer and in-flight attempt has been cancelled.
    pub async fn disconnect(&self) -> ClientResult<()> {
        let (done, rx) = oneshot::channel();
        self.command(Command::Disconnect { done })?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Add a session to the subscription set
    pub fn subscribe(&self, session_id: impl Into<String>) -> ClientResult<()> {
        self.command(Command::Subscribe(session_id.into()))
    }

    pub fn unsubscribe(&self, session_id: impl Into<String>) -> ClientResult<()> {
        self.command(Command::Unsubscribe(session_id.into()))
    }

    /// Send a domain event to the user's other connections
    pub async fn emit(&self, event: impl Into<String>, data: Value) -> ClientResult<()> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Emit {
            event: event.into(),
            data,
            reply: EmitReply::Sent(tx),
        })?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Send a domain event and wait for the relay's acknowledgement
    pub async fn emit_with_ack(&self, event: impl Into<String>, data: Value) -> ClientResult<Value> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Emit {
            event: event.into(),
            data,
            reply: EmitReply::Ack(tx),
        })?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Watch receiver holding the current status
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Stream of status values, starting with the current one
    pub fn status_stream(&self) -> WatchStream<ConnectionStatus> {
        WatchStream::new(self.status_rx.clone())
    }

    /// Wait until the status equals `target`
    pub async fn wait_for_status(&self, target: ConnectionStatus) -> ClientResult<()> {
        let mut rx = self.status_rx.clone();
        rx.wait_for(|status| *status == target)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::Closed)
    }

    pub fn errors(&self) -> broadcast::Receiver<ConnectionError> {
        self.errors_tx.subscribe()
    }

    pub fn reconnected(&self) -> broadcast::Receiver<Reconnected> {
        self.reconnected_tx.subscribe()
    }

    /// Domain events received from the relay
    pub fn messages(&self) -> broadcast::Receiver<SyncMessage> {
        self.messages_tx.subscribe()
    }
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("status", &self.status())
            .finish()
    }
}

/// Result of a spawned connection attempt
struct AttemptOutcome {
    generation: u64,
    result: ClientResult<(Socket, bool)>,
}

struct PendingAck {
    reply: oneshot::Sender<ClientResult<Value>>,
    deadline: Instant,
}

struct Driver {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    tickets: Arc<dyn TicketSource>,
    codec: Option<EnvelopeCodec>,

    status_tx: watch::Sender<ConnectionStatus>,
    errors_tx: broadcast::Sender<ConnectionError>,
    reconnected_tx: broadcast::Sender<Reconnected>,
    messages_tx: broadcast::Sender<SyncMessage>,

    attempts_tx: mpsc::UnboundedSender<AttemptOutcome>,
    attempts_rx: mpsc::UnboundedReceiver<AttemptOutcome>,

    /// Bumped for every attempt; outcomes from older generations are stale
    generation: u64,
    /// Involuntary closes since the last successful authentication
    attempt: u32,
    manual_close: bool,
    has_connected: bool,
    subscriptions: BTreeSet<String>,

    socket: Option<Socket>,
    in_flight: Option<JoinHandle<()>>,

    auth_deadline: Option<Instant>,
    keepalive_deadline: Option<Instant>,
    reconnect_deadline: Option<Instant>,
    pending_acks: HashMap<String, PendingAck>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let auth_deadline = self.auth_deadline;
            let keepalive_deadline = self.keepalive_deadline;
            let reconnect_deadline = self.reconnect_deadline;
            let ack_deadline = self.pending_acks.values().map(|p| p.deadline).min();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                Some(outcome) = self.attempts_rx.recv() => self.on_attempt_finished(outcome),
                frame = next_frame(&mut self.socket) => self.on_frame(frame),
                _ = sleep_until_opt(auth_deadline) => self.on_auth_timeout(),
                _ = sleep_until_opt(keepalive_deadline) => self.on_keepalive(),
                _ = sleep_until_opt(reconnect_deadline) => self.on_reconnect_due(),
                _ = sleep_until_opt(ack_deadline) => self.expire_acks(),
            }
        }

        tracing::debug!("Sync client driver stopped");
    }

    fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            tracing::debug!(from = ?*current, to = ?status, "Connection status changed");
            *current = status;
            true
        });
    }

    fn emit_error(&self, error: ConnectionError) {
        tracing::warn!(error = %error, "Connection error");
        let _ = self.errors_tx.send(error);
    }

    fn send(&self, frame: Frame) {
        if let Some(socket) = &self.socket {
            let _ = socket.outgoing.send(frame);
        }
    }

    fn send_message(&self, message: SyncMessage) {
        self.send(Frame::Text(message.to_json()));
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect { done } => {
                self.disconnect();
                let _ = done.send(());
            }
            Command::Subscribe(session_id) => {
                if self.subscriptions.insert(session_id.clone())
                    && self.status() == ConnectionStatus::Connected
                {
                    self.send_message(SyncMessage::Subscribe { session_id });
                }
            }
            Command::Unsubscribe(session_id) => {
                if self.subscriptions.remove(&session_id)
                    && self.status() == ConnectionStatus::Connected
                {
                    self.send_message(SyncMessage::Unsubscribe { session_id });
                }
            }
            Command::Emit { event, data, reply } => self.emit(event, data, reply),
        }
    }

    fn connect(&mut self) {
        if self.status().is_active() {
            tracing::debug!(status = ?self.status(), "connect() ignored, already active");
            return;
        }
        self.manual_close = false;
        self.reconnect_deadline = None;
        self.start_attempt();
    }

    fn start_attempt(&mut self) {
        self.generation += 1;
        self.set_status(ConnectionStatus::Connecting);

        let generation = self.generation;
        let config = self.config.clone();
        let connector = Arc::clone(&self.connector);
        let tickets = Arc::clone(&self.tickets);
        let outcomes = self.attempts_tx.clone();

        tracing::debug!(generation, attempt = self.attempt, "Starting connection attempt");

        self.in_flight = Some(tokio::spawn(async move {
            let ticket = match tickets.fetch_ticket().await {
                Ok(ticket) => Some(ticket),
                Err(e) => {
                    tracing::debug!(error = %e, "Ticket unavailable, using message auth");
                    None
                }
            };

            let result = match config.socket_url(ticket.as_deref()) {
                Ok(url) => {
                    match tokio::time::timeout(config.connect_timeout, connector.connect(&url)).await
                    {
                        Ok(connected) => connected.map(|socket| (socket, ticket.is_some())),
                        Err(_) => Err(ClientError::Transport(format!(
                            "socket did not open within {:?}",
                            config.connect_timeout
                        ))),
                    }
                }
                Err(e) => Err(e),
            };

            let _ = outcomes.send(AttemptOutcome { generation, result });
        }));
    }

    fn on_attempt_finished(&mut self, outcome: AttemptOutcome) {
        let current = outcome.generation == self.generation
            && !self.manual_close
            && self.status() == ConnectionStatus::Connecting;

        if !current {
            if let Ok((socket, _)) = outcome.result {
                tracing::debug!(generation = outcome.generation, "Discarding stale socket");
                let _ = socket.outgoing.send(Frame::Close(Some(CloseFrame::new(
                    close_code::NORMAL,
                    "Superseded",
                ))));
            }
            return;
        }
        self.in_flight = None;

        match outcome.result {
            Ok((socket, ticket_used)) => {
                self.socket = Some(socket);
                self.set_status(ConnectionStatus::Authenticating);

                if !ticket_used {
                    self.send_message(SyncMessage::Auth(AuthPayload {
                        token: self.config.token.clone(),
                        client_type: self.config.client_type,
                    }));
                }
                self.auth_deadline = Some(Instant::now() + self.config.auth_timeout);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Connection attempt failed");
                self.on_connection_lost();
            }
        }
    }

    fn on_frame(&mut self, frame: Option<Frame>) {
        match frame {
            Some(Frame::Text(text)) => self.on_text(&text),
            Some(Frame::Close(close)) => {
                tracing::debug!(?close, "Socket closed by peer");
                self.on_connection_lost();
            }
            Some(Frame::Ping(_)) => {}
            None => {
                tracing::debug!("Socket ended");
                self.on_connection_lost();
            }
        }
    }

    fn on_text(&mut self, text: &str) {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed frame");
                return;
            }
        };

        if envelope.is_ack_reply() {
            self.resolve_ack(envelope);
            return;
        }

        let message = match SyncMessage::from_envelope(envelope) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring invalid frame");
                return;
            }
        };

        match message {
            SyncMessage::Connected(payload) => self.on_connected(payload),
            SyncMessage::AuthError { message } => {
                if self.status() == ConnectionStatus::Authenticating {
                    self.fail_auth(ConnectionError::Auth(message.clone()), &message);
                }
            }
            SyncMessage::Ping => self.send_message(SyncMessage::Pong),
            SyncMessage::Pong => tracing::trace!("Pong received"),
            // Client-to-server only
            SyncMessage::Auth(_) | SyncMessage::Subscribe { .. } | SyncMessage::Unsubscribe { .. } => {}
            SyncMessage::Unknown { event, .. } => {
                tracing::debug!(event = %event, "Ignoring unknown event");
            }
            domain => self.deliver(domain),
        }
    }

    fn on_connected(&mut self, payload: ConnectedPayload) {
        if self.status() != ConnectionStatus::Authenticating {
            tracing::debug!("Ignoring connected outside of authentication");
            return;
        }

        self.auth_deadline = None;
        self.set_status(ConnectionStatus::Connected);
        self.attempt = 0;

        tracing::info!(
            connection_id = %payload.connection_id,
            user_id = %payload.user_id,
            "Connected to relay"
        );

        if self.has_connected {
            let _ = self.reconnected_tx.send(Reconnected {
                connection_id: payload.connection_id,
            });
        }
        self.has_connected = true;

        for session_id in &self.subscriptions {
            self.send_message(SyncMessage::Subscribe {
                session_id: session_id.clone(),
            });
        }

        self.keepalive_deadline = Some(Instant::now() + self.config.keepalive_interval);
    }

    /// Close with 4001, enter `error`, and go through the involuntary close path
    fn fail_auth(&mut self, error: ConnectionError, reason: &str) {
        self.auth_deadline = None;
        self.send(Frame::Close(Some(CloseFrame::new(
            close_code::AUTH_FAILED,
            reason,
        ))));
        self.set_status(ConnectionStatus::Error);
        self.emit_error(error);
        self.on_connection_lost();
    }

    fn deliver(&self, message: SyncMessage) {
        let opened = match (&self.codec, message.domain_data()) {
            (Some(codec), Some(Value::String(sealed))) => Some(codec.try_open_json(sealed)),
            _ => None,
        };

        let message = match opened {
            None => message,
            Some(Ok(data)) => match SyncMessage::domain(message.event(), data) {
                Some(opened) => opened,
                None => return,
            },
            Some(Err(e)) => {
                tracing::warn!(event = %message.event(), error = %e, "Dropping undecryptable payload");
                return;
            }
        };

        let _ = self.messages_tx.send(message);
    }

    fn emit(&mut self, event: String, data: Value, reply: EmitReply) {
        if self.status() != ConnectionStatus::Connected {
            reply_err(reply, ClientError::NotConnected);
            return;
        }

        let data = match &self.codec {
            Some(codec) => match codec.seal_json(&data) {
                Ok(sealed) => Value::String(sealed),
                Err(e) => {
                    reply_err(reply, e.into());
                    return;
                }
            },
            None => data,
        };

        let mut envelope = Envelope::new(event).with_data(data);
        match reply {
            EmitReply::Sent(tx) => {
                self.send(Frame::Text(envelope.to_json()));
                let _ = tx.send(Ok(()));
            }
            EmitReply::Ack(tx) => {
                let ack_id = uuid::Uuid::new_v4().to_string();
                envelope = envelope.with_ack_id(ack_id.clone());
                self.send(Frame::Text(envelope.to_json()));
                self.pending_acks.insert(
                    ack_id,
                    PendingAck {
                        reply: tx,
                        deadline: Instant::now() + self.config.ack_timeout,
                    },
                );
            }
        }
    }

    fn resolve_ack(&mut self, envelope: Envelope) {
        let (Some(ack_id), Some(ack)) = (envelope.ack_id, envelope.ack) else {
            return;
        };
        match self.pending_acks.remove(&ack_id) {
            Some(pending) => {
                let _ = pending.reply.send(Ok(ack));
            }
            None => tracing::debug!(ack_id = %ack_id, "Ack for unknown or expired request"),
        }
    }

    fn expire_acks(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .pending_acks
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            if let Some(pending) = self.pending_acks.remove(&id) {
                let _ = pending.reply.send(Err(ClientError::AckTimeout));
            }
        }
    }

    fn fail_pending_acks(&mut self) {
        for (_, pending) in self.pending_acks.drain() {
            let _ = pending.reply.send(Err(ClientError::ConnectionLost));
        }
    }

    fn on_auth_timeout(&mut self) {
        self.auth_deadline = None;
        if self.status() == ConnectionStatus::Authenticating {
            self.fail_auth(ConnectionError::Timeout, AUTH_TIMEOUT_REASON);
        }
    }

    fn on_keepalive(&mut self) {
        if self.status() != ConnectionStatus::Connected {
            self.keepalive_deadline = None;
            return;
        }
        self.send(Frame::Ping(Vec::new()));
        self.send_message(SyncMessage::Ping);
        self.keepalive_deadline = Some(Instant::now() + self.config.keepalive_interval);
    }

    fn on_reconnect_due(&mut self) {
        self.reconnect_deadline = None;
        if self.manual_close {
            return;
        }
        self.start_attempt();
    }

    fn clear_connection(&mut self) {
        self.socket = None;
        self.auth_deadline = None;
        self.keepalive_deadline = None;
        self.fail_pending_acks();
    }

    /// Involuntary close: tear down, then schedule a reconnect
    fn on_connection_lost(&mut self) {
        self.clear_connection();

        if self.manual_close {
            self.set_status(ConnectionStatus::Disconnected);
            return;
        }
        if self.status().is_active() {
            self.set_status(ConnectionStatus::Disconnected);
        }

        let policy = &self.config.reconnect;
        if policy.is_exhausted(self.attempt) {
            self.set_status(ConnectionStatus::Error);
            self.emit_error(ConnectionError::ReconnectAttemptsExhausted {
                attempts: self.attempt,
            });
            return;
        }

        let delay = policy.delay(self.attempt);
        tracing::info!(
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        self.reconnect_deadline = Some(Instant::now() + delay);
        self.attempt = self.attempt.saturating_add(1);
    }

    fn disconnect(&mut self) {
        self.manual_close = true;
        // Anything still in flight belongs to a superseded generation
        self.generation += 1;
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        self.reconnect_deadline = None;

        self.send(Frame::Close(Some(CloseFrame::new(
            close_code::NORMAL,
            "Client disconnect",
        ))));
        self.clear_connection();
        self.set_status(ConnectionStatus::Disconnected);
        tracing::info!("Disconnected from relay");
    }

    fn shutdown(&mut self) {
        if self.socket.is_some() || self.in_flight.is_some() {
            self.disconnect();
        }
    }
}

fn reply_err(reply: EmitReply, error: ClientError) {
    match reply {
        EmitReply::Sent(tx) => {
            let _ = tx.send(Err(error));
        }
        EmitReply::Ack(tx) => {
            let _ = tx.send(Err(error));
        }
    }
}

async fn next_frame(socket: &mut Option<Socket>) -> Option<Frame> {
    match socket {
        Some(socket) => socket.incoming.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
