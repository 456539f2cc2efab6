//! Short-lived connection tickets
//!
//! A ticket lets a client open the socket without putting its long-lived
//! bearer token in the URL. Format:
//!
//! ```text
//! base64url(payload-json) "." base64url(hmac-sha256(secret, payload-segment))
//! ```
//!
//! where the payload is `{"uid": ..., "iat": ms, "exp": ms}`. Both segments are
//! unpadded so the ticket is safe in a query string. Tickets are stateless:
//! only expiry invalidates one.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Default ticket lifetime
pub const TICKET_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize, Deserialize)]
struct TicketPayload {
    uid: String,
    iat: i64,
    exp: i64,
}

/// Identity carried by a valid ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketClaims {
    pub user_id: String,
    /// Issue time, ms since the Unix epoch
    pub issued_at: i64,
    /// Expiry, ms since the Unix epoch
    pub expires_at: i64,
}

/// Issues and verifies connection tickets
#[derive(Clone)]
pub struct TicketService {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TicketService {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl: TICKET_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a ticket for `user_id` valid from now
    pub fn issue(&self, user_id: &str) -> String {
        self.issue_at(user_id, Utc::now().timestamp_millis())
    }

    /// Issue a ticket as if the current time were `now_ms`
    pub fn issue_at(&self, user_id: &str, now_ms: i64) -> String {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let payload = TicketPayload {
            uid: user_id.to_string(),
            iat: now_ms,
            exp: now_ms.saturating_add(ttl_ms),
        };

        // Serializing a struct of strings and integers cannot fail
        let json = serde_json::to_vec(&payload).unwrap_or_default();
        let payload_segment = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(payload_segment.as_bytes()));

        format!("{}.{}", payload_segment, signature)
    }

    /// Verify a ticket against the current time
    pub fn verify(&self, ticket: &str) -> Option<TicketClaims> {
        self.verify_at(ticket, Utc::now().timestamp_millis())
    }

    /// Verify a ticket as if the current time were `now_ms`
    ///
    /// Malformed, forged and expired tickets are indistinguishable to the
    /// caller.
    pub fn verify_at(&self, ticket: &str, now_ms: i64) -> Option<TicketClaims> {
        let (payload_segment, signature_segment) = ticket.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature_segment).ok()?;

        let mut mac = self.mac();
        mac.update(payload_segment.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            tracing::debug!("Ticket signature mismatch");
            return None;
        }

        let json = URL_SAFE_NO_PAD.decode(payload_segment).ok()?;
        let payload: TicketPayload = serde_json::from_slice(&json).ok()?;

        if now_ms > payload.exp {
            tracing::debug!(user_id = %payload.uid, "Ticket expired");
            return None;
        }
        if payload.uid.is_empty() {
            return None;
        }

        Some(TicketClaims {
            user_id: payload.uid,
            issued_at: payload.iat,
            expires_at: payload.exp,
        })
    }

    fn mac(&self) -> HmacSha256 {
        <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"))
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

impl std::fmt::Debug for TicketService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketService")
            .field("secret", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Issue a ticket with the default lifetime
pub fn create_ticket(user_id: &str, secret: &[u8]) -> String {
    TicketService::new(secret).issue(user_id)
}

/// Verify a ticket issued with `secret`
pub fn verify_ticket(ticket: &str, secret: &[u8]) -> Option<TicketClaims> {
    TicketService::new(secret).verify(ticket)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_issue_then_verify() {
        let tickets = TicketService::new("ticket-secret");
        let ticket = tickets.issue_at("user-42", NOW);

        let claims = tickets.verify_at(&ticket, NOW).unwrap();
        assert_eq!(claims.user_id, "user-42");
        assert_eq!(claims.issued_at, NOW);
        assert_eq!(claims.expires_at, NOW + 30_000);
    }

    #[test]
    fn test_ticket_is_url_safe() {
        let ticket = TicketService::new("s").issue_at("user/with+odd=chars", NOW);
        assert!(ticket
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'));
        assert_eq!(ticket.matches('.').count(), 1);
    }

    #[test]
    fn test_expiry_boundary() {
        let tickets = TicketService::new("s");
        let ticket = tickets.issue_at("u", NOW);

        assert!(tickets.verify_at(&ticket, NOW + 30_000).is_some());
        assert!(tickets.verify_at(&ticket, NOW + 30_001).is_none());
    }

    #[test]
    fn test_custom_ttl() {
        let tickets = TicketService::new("s").with_ttl(Duration::from_secs(5));
        let ticket = tickets.issue_at("u", NOW);

        assert!(tickets.verify_at(&ticket, NOW + 5_000).is_some());
        assert!(tickets.verify_at(&ticket, NOW + 5_001).is_none());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let ticket = TicketService::new("a").issue_at("u", NOW);
        assert!(TicketService::new("b").verify_at(&ticket, NOW).is_none());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let tickets = TicketService::new("s");
        let ticket = tickets.issue_at("victim", NOW);
        let (_, signature) = ticket.split_once('.').unwrap();

        let forged_payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&TicketPayload {
                uid: "attacker".to_string(),
                iat: NOW,
                exp: NOW + 30_000,
            })
            .unwrap(),
        );
        let forged = format!("{}.{}", forged_payload, signature);

        assert!(tickets.verify_at(&forged, NOW).is_none());
    }

    #[test]
    fn test_extended_expiry_rejected() {
        let tickets = TicketService::new("s");
        let ticket = tickets.issue_at("u", NOW);
        let (_, signature) = ticket.split_once('.').unwrap();

        let extended = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&TicketPayload {
                uid: "u".to_string(),
                iat: NOW,
                exp: NOW + 86_400_000,
            })
            .unwrap(),
        );

        assert!(tickets
            .verify_at(&format!("{}.{}", extended, signature), NOW + 60_000)
            .is_none());
    }

    #[test]
    fn test_malformed_tickets_rejected() {
        let tickets = TicketService::new("s");
        for ticket in ["", ".", "no-dot", "a.b.c", "!!!.???", "eyJ1aWQiOiJ1In0."] {
            assert!(tickets.verify_at(ticket, NOW).is_none(), "{ticket}");
        }
    }

    #[test]
    fn test_free_functions_agree_with_service() {
        let ticket = create_ticket("user-7", b"shared");
        let claims = verify_ticket(&ticket, b"shared").unwrap();
        assert_eq!(claims.user_id, "user-7");
        assert!(verify_ticket(&ticket, b"other").is_none());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", TicketService::new("super-secret-key"));
        assert!(!debug.contains("super-secret-key"));
    }
}
