//! Upgrade rejection tests
//!
//! Every rejection happens before the protocol switch, so these run against
//! the router directly.

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use rstest::rstest;
use tower::ServiceExt;

use common::{body_json, test_app, test_state, token_for, upgrade_request};
use switchboard_relay::{AppState, Config};

// ========== Upgrade Required ==========

#[rstest]
#[case("/v1/updates")]
#[case("/v1/websocket")]
#[tokio::test]
async fn test_plain_get_requires_upgrade(#[case] path: &str) {
    let state = test_state();
    let token = token_for(&state, "user-1");

    let response = test_app(&state)
        .oneshot(
            Request::builder()
                .uri(format!("{}?token={}", path, token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
    assert_eq!(
        response.headers().get(header::UPGRADE).unwrap(),
        "websocket"
    );
    let body = body_json(response).await;
    assert_eq!(body["code"], "UPGRADE_REQUIRED");
}

// ========== Authentication ==========

#[tokio::test]
async fn test_invalid_ticket_is_unauthorized() {
    let state = test_state();

    let response = test_app(&state)
        .oneshot(
            upgrade_request("/v1/updates?ticket=not-a-ticket")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ticket_signed_with_other_secret_is_unauthorized() {
    let state = test_state();
    let foreign = switchboard_relay::TicketService::new("some-other-secret").issue("user-1");

    let response = test_app(&state)
        .oneshot(
            upgrade_request(&format!("/v1/updates?ticket={}", foreign))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_bearer_header_is_unauthorized() {
    let state = test_state();

    let response = test_app(&state)
        .oneshot(
            upgrade_request("/v1/updates")
                .header(header::AUTHORIZATION, "Bearer garbage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_invalid_query_token_is_unauthorized() {
    let state = test_state();

    let response = test_app(&state)
        .oneshot(
            upgrade_request("/v1/updates?token=garbage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_credentials_without_message_auth() {
    let mut config = Config::new(common::JWT_SECRET, common::TICKET_SECRET);
    config.message_auth_enabled = false;
    let state = AppState::new(config);

    let response = test_app(&state)
        .oneshot(upgrade_request("/v1/updates").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "UNAUTHORIZED");
}

// ========== Scope Validation ==========

#[rstest]
#[case("clientType=session-scoped")]
#[case("clientType=machine-scoped")]
#[case("clientType=bogus")]
#[tokio::test]
async fn test_invalid_scope_is_bad_request(#[case] query: &str) {
    let state = test_state();
    let token = token_for(&state, "user-1");

    let response = test_app(&state)
        .oneshot(
            upgrade_request(&format!("/v1/updates?token={}&{}", token, query))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_rejected_upgrades_register_nothing() {
    let state = test_state();
    let token = token_for(&state, "user-1");

    for uri in [
        format!("/v1/updates?token={}&clientType=session-scoped", token),
        "/v1/updates?ticket=bad".to_string(),
    ] {
        let response = test_app(&state)
            .oneshot(upgrade_request(&uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    let stats = state.routers.stats("user-1").await.unwrap();
    assert_eq!(stats.total_connections, 0);
}
