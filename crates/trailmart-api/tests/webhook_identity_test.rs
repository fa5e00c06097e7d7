//! Webhook ingestion over HTTP and the identity projection behind it.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;

use common::{event_types, TestApp};
use trailmart_api::services::webhook::sign;
use trailmart_api::services::IdentityOutcome;
use trailmart_core::{IdentityRepository, LoginOutcome, RegistrationOutcome};

const SECRET: &str = "webhook-secret";

fn register_body(uid: &str, user_id: &str) -> String {
    json!({
        "time": 1735725600000i64,
        "realmId": "shop",
        "uid": uid,
        "type": "REGISTER",
        "authDetails": {
            "realmId": "shop",
            "clientId": "storefront",
            "userId": user_id,
            "ipAddress": "10.0.0.1",
            "username": "alice"
        }
    })
    .to_string()
}

fn login_body(uid: &str, user_id: &str) -> String {
    json!({
        "time": 1735729200000i64,
        "realmId": "shop",
        "uid": uid,
        "type": "access.LOGIN",
        "authDetails": {
            "userId": user_id,
            "ipAddress": "10.0.0.2",
            "sessionId": "sess-9"
        }
    })
    .to_string()
}

fn webhook_request(body: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook/keycloak")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("X-Keycloak-Signature", signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: axum::response::Response) -> JsonValue {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_unsigned_webhook_accepted_without_secret() {
    let mut app = TestApp::new().await;
    let body = register_body("evt-1", "user-1");

    let response = app
        .router()
        .oneshot(webhook_request(&body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "accepted");

    let events = app.deliver_pending().await;
    assert_eq!(event_types(&events), vec!["KeycloakWebhook"]);
    let user = app.identity_repo.get_user("user-1").await.unwrap().unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(user.realm_id.as_deref(), Some("shop"));
    assert_eq!(user.created_client_id.as_deref(), Some("storefront"));
}

#[tokio::test]
async fn test_signature_required_when_secret_configured() {
    let mut app = TestApp::with_webhook_secret(SECRET).await;
    let body = register_body("evt-1", "user-1");

    let missing = app
        .router()
        .oneshot(webhook_request(&body, None))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = sign("other-secret", body.as_bytes()).unwrap();
    let forged = app
        .router()
        .oneshot(webhook_request(&body, Some(&wrong)))
        .await
        .unwrap();
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
    assert!(json_body(forged).await["error"].is_string());

    assert!(app.drain_events().is_empty());
}

#[tokio::test]
async fn test_signature_prefix_is_case_insensitive() {
    let mut app = TestApp::with_webhook_secret(SECRET).await;
    let body = register_body("evt-1", "user-1");
    let header = format!("SHA256={}", sign(SECRET, body.as_bytes()).unwrap());

    let response = app
        .router()
        .oneshot(webhook_request(&body, Some(&header)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.drain_events().len(), 1);
}

#[tokio::test]
async fn test_empty_and_malformed_bodies_rejected() {
    let mut app = TestApp::new().await;

    let empty = app
        .router()
        .oneshot(webhook_request("", None))
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let malformed = app
        .router()
        .oneshot(webhook_request("{\"type\": ", None))
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

    assert!(app.drain_events().is_empty());
}

#[tokio::test]
async fn test_register_replay_is_idempotent() {
    let app = TestApp::new().await;
    let body = register_body("evt-1", "user-1");

    let first = app
        .identity
        .handle_webhook("REGISTER", Some("shop"), &body)
        .await
        .unwrap();
    assert_eq!(first, IdentityOutcome::Registered(RegistrationOutcome::Created));

    let replay = app
        .identity
        .handle_webhook("REGISTER", Some("shop"), &body)
        .await
        .unwrap();
    assert_eq!(replay, IdentityOutcome::Registered(RegistrationOutcome::Duplicate));

    assert_eq!(app.identity_repo.user_count(), 1);
    assert_eq!(app.identity_repo.processed_count(), 1);
    assert!(app.identity_repo.is_processed("evt-1").await.unwrap());

    // A new event for the same user updates in place.
    let again = app
        .identity
        .handle_webhook("REGISTER", Some("shop"), &register_body("evt-2", "user-1"))
        .await
        .unwrap();
    assert_eq!(again, IdentityOutcome::Registered(RegistrationOutcome::Updated));
    assert_eq!(app.identity_repo.user_count(), 1);
}

#[tokio::test]
async fn test_login_before_register_changes_nothing() {
    let app = TestApp::new().await;

    let early = app
        .identity
        .handle_webhook("access.LOGIN", None, &login_body("evt-l1", "user-1"))
        .await
        .unwrap();
    assert_eq!(early, IdentityOutcome::LoggedIn(LoginOutcome::UnknownUser));
    assert_eq!(app.identity_repo.user_count(), 0);

    app.identity
        .handle_webhook("REGISTER", Some("shop"), &register_body("evt-1", "user-1"))
        .await
        .unwrap();
    let login = app
        .identity
        .handle_webhook("access.LOGIN", None, &login_body("evt-l2", "user-1"))
        .await
        .unwrap();
    assert_eq!(login, IdentityOutcome::LoggedIn(LoginOutcome::Updated));

    let user = app.identity_repo.get_user("user-1").await.unwrap().unwrap();
    assert_eq!(user.last_login_ip.as_deref(), Some("10.0.0.2"));
    assert_eq!(user.last_session_id.as_deref(), Some("sess-9"));
    assert!(user.last_login_at.is_some());
}

#[tokio::test]
async fn test_register_without_username_uses_placeholder() {
    let app = TestApp::new().await;
    let body = json!({
        "uid": "evt-3",
        "type": "REGISTER",
        "authDetails": {"userId": "user-3"}
    })
    .to_string();

    app.identity
        .handle_webhook("REGISTER", None, &body)
        .await
        .unwrap();
    let user = app.identity_repo.get_user("user-3").await.unwrap().unwrap();
    assert_eq!(user.username, "(unknown)");
}

#[tokio::test]
async fn test_malformed_and_unknown_events_are_acknowledged() {
    let app = TestApp::new().await;

    let no_uid = json!({"type": "REGISTER", "authDetails": {"userId": "user-1"}}).to_string();
    let outcome = app
        .identity
        .handle_webhook("REGISTER", None, &no_uid)
        .await
        .unwrap();
    assert!(matches!(outcome, IdentityOutcome::Malformed(_)));

    let wrong_shape = json!({"uid": 42, "authDetails": "nope"}).to_string();
    let outcome = app
        .identity
        .handle_webhook("REGISTER", None, &wrong_shape)
        .await
        .unwrap();
    assert!(matches!(outcome, IdentityOutcome::Malformed(_)));

    let outcome = app
        .identity
        .handle_webhook("LOGOUT", None, r#"{"uid":"evt-9"}"#)
        .await
        .unwrap();
    assert_eq!(outcome, IdentityOutcome::Ignored("logout".to_string()));

    assert_eq!(app.identity_repo.user_count(), 0);
    assert_eq!(app.identity_repo.processed_count(), 0);
}
