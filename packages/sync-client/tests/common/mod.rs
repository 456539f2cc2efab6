//! In-memory transport for driving the client state machine in tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use switchboard_sync_client::{
    ClientConfig, ClientError, ClientResult, CloseFrame, Connector, Frame, ReconnectPolicy, Socket,
    SyncClient, TicketSource,
};
use tokio::sync::mpsc;
use url::Url;

/// Server end of one in-memory socket
pub struct MockSocket {
    pub url: Url,
    sent: mpsc::UnboundedReceiver<Frame>,
    inbound: mpsc::UnboundedSender<Frame>,
}

impl MockSocket {
    /// Next frame the client wrote, transport pings skipped
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.sent.recv().await? {
                Frame::Ping(_) => continue,
                frame => return Some(frame),
            }
        }
    }

    /// Next text frame decoded as JSON; panics on anything else
    pub async fn next_json(&mut self) -> Value {
        match self.next_frame().await {
            Some(Frame::Text(text)) => serde_json::from_str(&text).expect("client sent invalid JSON"),
            other => panic!("expected a text frame, got {:?}", other),
        }
    }

    /// Next close frame the client sent
    pub async fn next_close(&mut self) -> Option<CloseFrame> {
        loop {
            match self.next_frame().await {
                Some(Frame::Close(close)) => return close,
                Some(_) => continue,
                None => return None,
            }
        }
    }

    /// Frames already written, without waiting
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.sent.try_recv() {
            frames.push(frame);
        }
        frames
    }

    pub fn send_json(&self, value: Value) {
        let _ = self.inbound.send(Frame::Text(value.to_string()));
    }

    pub fn send_connected(&self, connection_id: &str) {
        self.send_json(serde_json::json!({
            "event": "connected",
            "data": {"connectionId": connection_id, "userId": "user-1", "clientType": "user-scoped"}
        }));
    }

    /// Simulate the relay dropping the socket
    pub fn drop_connection(self) {}

    pub fn query(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

/// Hands each accepted socket to the test through a channel
pub struct MockConnector {
    accepted: mpsc::UnboundedSender<MockSocket>,
    refuse: AtomicBool,
    hang: AtomicBool,
    attempts: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockSocket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            accepted: tx,
            refuse: AtomicBool::new(false),
            hang: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        });
        (connector, rx)
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Make new attempts never finish opening, like a blackholed host
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &Url) -> ClientResult<Socket> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("connection refused".into()));
        }
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let (client_out_tx, client_out_rx) = mpsc::unbounded_channel();
        let (server_out_tx, server_out_rx) = mpsc::unbounded_channel();

        let _ = self.accepted.send(MockSocket {
            url: url.clone(),
            sent: client_out_rx,
            inbound: server_out_tx,
        });

        Ok(Socket {
            outgoing: client_out_tx,
            incoming: server_out_rx,
        })
    }
}

/// Always yields the same ticket
pub struct StaticTicket(pub &'static str);

#[async_trait]
impl TicketSource for StaticTicket {
    async fn fetch_ticket(&self) -> ClientResult<String> {
        Ok(self.0.to_string())
    }
}

/// Ticket endpoint that is always unavailable
pub struct NoTicket;

#[async_trait]
impl TicketSource for NoTicket {
    async fn fetch_ticket(&self) -> ClientResult<String> {
        Err(ClientError::TicketFetch("ticket endpoint returned 503".into()))
    }
}

/// Ticket endpoint that takes a long time to answer
pub struct SlowTicket(pub Duration);

#[async_trait]
impl TicketSource for SlowTicket {
    async fn fetch_ticket(&self) -> ClientResult<String> {
        tokio::time::sleep(self.0).await;
        Ok("slow-ticket".to_string())
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig::new("http://relay.test", "bearer-token")
}

/// Client over the mock transport with message auth
pub fn message_auth_client(
    config: ClientConfig,
) -> (SyncClient, Arc<MockConnector>, mpsc::UnboundedReceiver<MockSocket>) {
    let (connector, sockets) = MockConnector::new();
    let client = SyncClient::with_transport(config, connector.clone(), Arc::new(NoTicket));
    (client, connector, sockets)
}

/// Client over the mock transport with ticket auth
pub fn ticket_auth_client(
    config: ClientConfig,
) -> (SyncClient, Arc<MockConnector>, mpsc::UnboundedReceiver<MockSocket>) {
    let (connector, sockets) = MockConnector::new();
    let client = SyncClient::with_transport(
        config,
        connector.clone(),
        Arc::new(StaticTicket("ticket-abc")),
    );
    (client, connector, sockets)
}

/// Policy with a fixed, jitter-free delay
pub fn fixed_policy(delay: Duration) -> ReconnectPolicy {
    ReconnectPolicy {
        base_delay: delay,
        max_delay: delay,
        jitter_factor: 0.0,
        max_attempts: None,
    }
}
