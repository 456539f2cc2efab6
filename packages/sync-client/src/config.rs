//! Client configuration

use std::time::Duration;

use switchboard_envelope::SymmetricKey;
use switchboard_protocol::ClientType;
use url::Url;

use crate::backoff::ReconnectPolicy;
use crate::error::{ClientError, ClientResult};

const DEFAULT_SOCKET_PATH: &str = "/v1/updates";
const TICKET_PATH: &str = "/v1/websocket/ticket";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a [`crate::SyncClient`]
#[derive(Clone)]
pub struct ClientConfig {
    /// Relay base URL (`http(s)://` or `ws(s)://`)
    pub server_url: String,
    /// Long-lived bearer token
    pub token: String,
    /// Scope declared on connect
    pub client_type: ClientType,
    /// Required for session-scoped clients
    pub session_id: Option<String>,
    /// Required for machine-scoped clients
    pub machine_id: Option<String>,
    /// WebSocket path on the relay
    pub socket_path: String,
    /// Time allowed for the socket to open
    pub connect_timeout: Duration,
    /// Time allowed between socket open and `connected`
    pub auth_timeout: Duration,
    /// Interval between keepalive pings while connected
    pub keepalive_interval: Duration,
    /// Time allowed for an `emit_with_ack` reply
    pub ack_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// Seals outbound and opens inbound domain payloads when set
    pub encryption_key: Option<SymmetricKey>,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            token: token.into(),
            client_type: ClientType::UserScoped,
            session_id: None,
            machine_id: None,
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
            encryption_key: None,
        }
    }

    pub fn with_session_scope(mut self, session_id: impl Into<String>) -> Self {
        self.client_type = ClientType::SessionScoped;
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_machine_scope(mut self, machine_id: impl Into<String>) -> Self {
        self.client_type = ClientType::MachineScoped;
        self.machine_id = Some(machine_id.into());
        self
    }

    pub fn with_socket_path(mut self, path: impl Into<String>) -> Self {
        self.socket_path = path.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_encryption_key(mut self, key: SymmetricKey) -> Self {
        self.encryption_key = Some(key);
        self
    }

    fn base_url(&self) -> ClientResult<Url> {
        Url::parse(&self.server_url).map_err(|_| ClientError::InvalidUrl(self.server_url.clone()))
    }

    /// HTTP endpoint that issues connection tickets
    pub fn ticket_url(&self) -> ClientResult<Url> {
        let mut url = self.base_url()?;
        let scheme = match url.scheme() {
            "ws" | "http" => "http",
            "wss" | "https" => "https",
            _ => return Err(ClientError::InvalidUrl(self.server_url.clone())),
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::InvalidUrl(self.server_url.clone()))?;
        url.set_path(TICKET_PATH);
        url.set_query(None);
        Ok(url)
    }

    /// WebSocket URL, carrying the ticket when one was obtained
    ///
    /// The bearer token is never placed in the URL; without a ticket the
    /// client authenticates with an `auth` message instead.
    pub fn socket_url(&self, ticket: Option<&str>) -> ClientResult<Url> {
        let mut url = self.base_url()?;
        let scheme = match url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            _ => return Err(ClientError::InvalidUrl(self.server_url.clone())),
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::InvalidUrl(self.server_url.clone()))?;
        url.set_path(&self.socket_path);
        url.set_query(None);

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("clientType", self.client_type.as_str());
            if let Some(session_id) = &self.session_id {
                query.append_pair("sessionId", session_id);
            }
            if let Some(machine_id) = &self.machine_id {
                query.append_pair("machineId", machine_id);
            }
            if let Some(ticket) = ticket {
                query.append_pair("ticket", ticket);
            }
        }

        Ok(url)
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field("token", &"[REDACTED]")
            .field("client_type", &self.client_type)
            .field("session_id", &self.session_id)
            .field("machine_id", &self.machine_id)
            .field("socket_path", &self.socket_path)
            .field("connect_timeout", &self.connect_timeout)
            .field("auth_timeout", &self.auth_timeout)
            .field("keepalive_interval", &self.keepalive_interval)
            .field("reconnect", &self.reconnect)
            .field("encrypted", &self.encryption_key.is_some())
            .finish()
    }
}
