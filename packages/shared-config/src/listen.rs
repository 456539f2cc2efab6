//! Listener configuration for network-facing services

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::{parse_env, ConfigResult};

/// Address a service binds its HTTP/WebSocket listener to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenConfig {
    /// Interface to bind (default: 0.0.0.0)
    pub host: IpAddr,

    /// TCP port (default: 8080)
    pub port: u16,
}

impl ListenConfig {
    /// Load listener configuration from `HOST` and `PORT`
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            host: parse_env("HOST", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?,
            port: parse_env("PORT", 8080)?,
        })
    }

    /// Socket address to bind
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
        }
    }
}
