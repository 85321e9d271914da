//! End-to-end tests driving the router with real HTTP requests.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::json;
use tower::ServiceExt;

use github_webhook::bus::Subscription;
use github_webhook::config::parse_registrations;
use github_webhook::web::{router, sign};
use github_webhook::{AppState, Config, EventBus, LocalBus, TopicPattern};

fn app(webhooks_json: &str) -> (Router, Subscription) {
    let config = Config {
        port: 0,
        path: "/github/webhook".to_string(),
        webhooks: parse_registrations(webhooks_json).unwrap(),
        cloudamqp_url: None,
        amqp_exchange: "github".to_string(),
    };

    let bus = Arc::new(LocalBus::new());
    let family = TopicPattern::parse("github/*").unwrap();
    bus.register(family.clone());
    let subscription = bus.subscribe(family);

    (router(AppState::new(config, bus)), subscription)
}

fn form_body(payload: &str) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("payload", payload)
        .finish()
}

fn delivery(event: &str, hook_id: &str, signature: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/github/webhook")
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-github-event", event)
        .header("x-github-hook-id", hook_id)
        .header("x-github-delivery", "72d3162e-cc78-11e3-81ab-4c9367dc0958")
        .header("x-hub-signature-256", signature)
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_signed_delivery_is_dispatched() {
    let (app, mut events) = app(r#"[{"id": 42, "secret": "s3cr3t"}]"#);
    let body = form_body(r#"{"action":"opened"}"#);
    let signature = sign("s3cr3t", body.as_bytes()).unwrap();

    let response = app.oneshot(delivery("issues", "42", &signature, body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let general = events.try_recv().unwrap();
    let specific = events.try_recv().unwrap();
    assert!(events.try_recv().is_none());

    assert_eq!(general.topic, "github/issues");
    assert_eq!(specific.topic, "github/issues/opened");
    assert_eq!(*general.payload, json!({"action": "opened"}));
    assert_eq!(*specific.payload, json!({"action": "opened"}));
    assert_eq!(
        general.delivery_id.as_deref(),
        Some("72d3162e-cc78-11e3-81ab-4c9367dc0958")
    );
}

#[tokio::test]
async fn test_unknown_hook_id_returns_not_found() {
    let (app, mut events) = app(r#"[{"id": 42, "secret": "s3cr3t"}]"#);
    let body = form_body(r#"{"action":"opened"}"#);
    let signature = sign("s3cr3t", body.as_bytes()).unwrap();

    let response = app.oneshot(delivery("issues", "99", &signature, body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_malformed_payload_returns_bad_request() {
    let (app, mut events) = app(r#"[{"id": 42, "secret": "s3cr3t"}]"#);
    let body = form_body("{\"action\":");
    let signature = sign("s3cr3t", body.as_bytes()).unwrap();

    let response = app.oneshot(delivery("issues", "42", &signature, body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_wrong_signature_returns_forbidden() {
    let (app, mut events) = app(r#"[{"id": 42, "secret": "s3cr3t"}]"#);
    let body = form_body(r#"{"action":"opened"}"#);
    let signature = sign("not-the-secret", body.as_bytes()).unwrap();

    let response = app.oneshot(delivery("issues", "42", &signature, body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_missing_header_returns_bad_request() {
    let (app, _events) = app(r#"[{"id": 42, "secret": "s3cr3t"}]"#);
    let body = form_body(r#"{"action":"opened"}"#);

    let request = Request::builder()
        .method("POST")
        .uri("/github/webhook")
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-github-event", "issues")
        .header("x-github-hook-id", "42")
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_repo_registration_with_json_body() {
    let (app, mut events) = app(r#"[{"repo": "acme/widgets", "secret": "s"}]"#);
    let body = r#"{"repository":{"full_name":"acme/widgets"}}"#.to_string();
    let signature = sign("s", body.as_bytes()).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/github/webhook")
        .header("content-type", "application/json")
        .header("x-github-event", "push")
        .header("x-github-hook-id", "123456")
        .header("x-hub-signature-256", signature)
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(events.try_recv().unwrap().topic, "github/push");
    assert!(events.try_recv().is_none());
}

fn json_delivery(event: &str, hook_id: &str, signature: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/github/webhook")
        .header("content-type", "application/json")
        .header("x-github-event", event)
        .header("x-github-hook-id", hook_id)
        .header("x-hub-signature-256", signature)
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_json_body_with_payload_field_is_unwrapped() {
    let (app, mut events) = app(r#"[{"id": 42, "secret": "s3cr3t"}]"#);
    let body = json!({"payload": r#"{"action":"opened"}"#}).to_string();
    let signature = sign("s3cr3t", body.as_bytes()).unwrap();

    let response = app
        .oneshot(json_delivery("issues", "42", &signature, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let general = events.try_recv().unwrap();
    let specific = events.try_recv().unwrap();
    assert!(events.try_recv().is_none());
    assert_eq!(general.topic, "github/issues");
    assert_eq!(specific.topic, "github/issues/opened");
    assert_eq!(*general.payload, json!({"action": "opened"}));
}

#[tokio::test]
async fn test_json_body_with_malformed_payload_field_returns_bad_request() {
    let (app, mut events) = app(r#"[{"id": 42, "secret": "s3cr3t"}]"#);
    let body = json!({"payload": "{\"action\":"}).to_string();
    let signature = sign("s3cr3t", body.as_bytes()).unwrap();

    let response = app
        .oneshot(json_delivery("issues", "42", &signature, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_truthy_non_object_payload_is_dispatched() {
    let (app, mut events) = app(r#"[{"id": 42, "secret": "s3cr3t"}]"#);
    let body = form_body("[1,2]");
    let signature = sign("s3cr3t", body.as_bytes()).unwrap();

    let response = app.oneshot(delivery("ping", "42", &signature, body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let event = events.try_recv().unwrap();
    assert_eq!(event.topic, "github/ping");
    assert_eq!(*event.payload, json!([1, 2]));
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_falsy_payload_returns_bad_request() {
    for falsy in ["null", "false", "0", "\"\""] {
        let (app, mut events) = app(r#"[{"id": 42, "secret": "s3cr3t"}]"#);
        let body = form_body(falsy);
        let signature = sign("s3cr3t", body.as_bytes()).unwrap();

        let response = app.oneshot(delivery("ping", "42", &signature, body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{falsy}");
        assert!(events.try_recv().is_none());
    }
}

#[tokio::test]
async fn test_invalid_hook_id_returns_bad_request() {
    let (app, mut events) = app(r#"[{"id": 42, "secret": "s3cr3t"}]"#);
    let body = form_body(r#"{"action":"opened"}"#);
    let signature = sign("s3cr3t", body.as_bytes()).unwrap();

    let response = app
        .oneshot(delivery("issues", "forty-two", &signature, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_health() {
    let (app, _events) = app("[]");

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
