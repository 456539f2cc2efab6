//! Shared application state

use std::sync::Arc;

use crate::config::Config;
use crate::services::{AuthConfig, TicketService, TokenService};
use crate::websocket::RouterRegistry;

/// State shared by every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: TokenService,
    pub tickets: TicketService,
    pub routers: RouterRegistry,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let tokens = TokenService::new(AuthConfig::new(config.jwt_secret.clone()));
        let tickets = TicketService::new(config.ticket_secret.as_bytes()).with_ttl(config.ticket_ttl);

        Self {
            config: Arc::new(config),
            tokens,
            tickets,
            routers: RouterRegistry::new(),
        }
    }
}
