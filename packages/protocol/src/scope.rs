//! Connection scopes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

/// Declared breadth of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientType {
    /// Receives everything for the user
    #[default]
    UserScoped,
    /// Bound to a single session
    SessionScoped,
    /// Bound to a single machine
    MachineScoped,
}

impl ClientType {
    pub const ALL: [ClientType; 3] = [
        ClientType::UserScoped,
        ClientType::SessionScoped,
        ClientType::MachineScoped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserScoped => "user-scoped",
            Self::SessionScoped => "session-scoped",
            Self::MachineScoped => "machine-scoped",
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user-scoped" => Ok(Self::UserScoped),
            "session-scoped" => Ok(Self::SessionScoped),
            "machine-scoped" => Ok(Self::MachineScoped),
            other => Err(ProtocolError::UnknownClientType(other.to_string())),
        }
    }
}

/// Scope of a registered connection, carrying the id it is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientScope {
    User,
    Session(String),
    Machine(String),
}

impl ClientScope {
    /// Resolve a scope from the upgrade query parameters
    ///
    /// Ids that do not apply to the declared type are ignored. Empty ids count
    /// as missing.
    pub fn resolve(
        client_type: Option<&str>,
        session_id: Option<&str>,
        machine_id: Option<&str>,
    ) -> ProtocolResult<Self> {
        let client_type = match client_type {
            Some(raw) => raw.parse()?,
            None => ClientType::default(),
        };
        let non_empty = |id: Option<&str>| id.filter(|s| !s.is_empty()).map(str::to_string);

        match client_type {
            ClientType::UserScoped => Ok(Self::User),
            ClientType::SessionScoped => non_empty(session_id).map(Self::Session).ok_or(
                ProtocolError::MissingScopeId {
                    client_type: "session-scoped",
                    field: "sessionId",
                },
            ),
            ClientType::MachineScoped => non_empty(machine_id).map(Self::Machine).ok_or(
                ProtocolError::MissingScopeId {
                    client_type: "machine-scoped",
                    field: "machineId",
                },
            ),
        }
    }

    pub fn client_type(&self) -> ClientType {
        match self {
            Self::User => ClientType::UserScoped,
            Self::Session(_) => ClientType::SessionScoped,
            Self::Machine(_) => ClientType::MachineScoped,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Session(id) => Some(id),
            _ => None,
        }
    }

    pub fn machine_id(&self) -> Option<&str> {
        match self {
            Self::Machine(id) => Some(id),
            _ => None,
        }
    }
}
