//! Error types for the sync client

use switchboard_envelope::CryptoError;
use thiserror::Error;

/// Errors returned by [`crate::SyncClient`] operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// Server rejected our credentials
    #[error("authentication failed: {0}")]
    Auth(String),

    /// No `connected` arrived within the auth timeout
    #[error("authentication timed out")]
    Timeout,

    /// Socket could not be opened or failed mid-flight
    #[error("transport error: {0}")]
    Transport(String),

    /// Ticket endpoint answered with a failure
    #[error("ticket fetch failed: {0}")]
    TicketFetch(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("payload encryption failed: {0}")]
    Crypto(#[from] CryptoError),

    /// Operation needs an authenticated connection
    #[error("not connected")]
    NotConnected,

    #[error("timed out waiting for acknowledgement")]
    AckTimeout,

    /// Socket went away while an acknowledgement was pending
    #[error("connection lost before acknowledgement")]
    ConnectionLost,

    #[error("gave up reconnecting after {attempts} attempts")]
    ReconnectAttemptsExhausted { attempts: u32 },

    /// Client driver has shut down
    #[error("client is closed")]
    Closed,
}

/// Failures published on [`crate::SyncClient::errors`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("authentication timed out")]
    Timeout,

    #[error("gave up reconnecting after {attempts} attempts")]
    ReconnectAttemptsExhausted { attempts: u32 },
}

impl From<ConnectionError> for ClientError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Auth(message) => Self::Auth(message),
            ConnectionError::Timeout => Self::Timeout,
            ConnectionError::ReconnectAttemptsExhausted { attempts } => {
                Self::ReconnectAttemptsExhausted { attempts }
            }
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
