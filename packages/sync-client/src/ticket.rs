//! Connection ticket retrieval

use std::time::Duration;

use async_trait::async_trait;
use switchboard_protocol::TicketResponse;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

const TICKET_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of short-lived connection tickets
///
/// Any error makes the client fall back to message auth.
#[async_trait]
pub trait TicketSource: Send + Sync + 'static {
    async fn fetch_ticket(&self) -> ClientResult<String>;
}

/// Fetches tickets from `POST /v1/websocket/ticket`
#[derive(Clone)]
pub struct HttpTicketSource {
    client: reqwest::Client,
    url: Url,
    token: String,
}

impl HttpTicketSource {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(TICKET_REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            url: config.ticket_url()?,
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl TicketSource for HttpTicketSource {
    async fn fetch_ticket(&self) -> ClientResult<String> {
        let response = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::TicketFetch(format!(
                "ticket endpoint returned {}",
                status
            )));
        }

        let body: TicketResponse = response.json().await?;
        Ok(body.ticket)
    }
}

impl std::fmt::Debug for HttpTicketSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTicketSource")
            .field("url", &self.url.as_str())
            .field("token", &"[REDACTED]")
            .finish()
    }
}
