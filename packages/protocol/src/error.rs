//! Error types for wire decoding

use thiserror::Error;

/// Errors raised while decoding frames or connection parameters
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame was not valid JSON or did not match the expected shape
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    /// A control event arrived without a field it requires
    #[error("'{event}' event is missing '{field}'")]
    MissingField {
        event: &'static str,
        field: &'static str,
    },

    /// `clientType` query value is not one of the known scopes
    #[error("unknown client type: {0}")]
    UnknownClientType(String),

    /// A scoped client type was declared without the id that binds it
    #[error("{client_type} connections require '{field}'")]
    MissingScopeId {
        client_type: &'static str,
        field: &'static str,
    },
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
