//! Router-level tests: issue, inspect, redeem and revoke webhooks against
//! an in-memory platform.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode};
use ed25519_dalek::SigningKey;
use hookgrid_api::{ApiState, build_router};
use hookgrid_drivers::{DriverRegistry, UpgradePolicy};
use hookgrid_platform::{InMemoryFactory, InMemoryPlatform, ResourceKind};
use hookgrid_token::TokenCodec;
use serde_json::{Value, json};
use tower::ServiceExt;

const PROJECT: &str = "1a5";

fn test_router(factory: &InMemoryFactory) -> Router {
    let codec = TokenCodec::from_signing_key(SigningKey::from_bytes(&[7u8; 32]));
    build_router(ApiState {
        registry: Arc::new(DriverRegistry::standard(UpgradePolicy::default())),
        codec: Arc::new(codec),
        platforms: Arc::new(factory.clone()),
    })
}

fn seed_host(platform: &InMemoryPlatform) {
    platform.insert(
        ResourceKind::Host,
        json!({
            "hostname": "web.example.com",
            "driver": "amazonec2",
            "state": "active",
            "labels": {"foo": "bar"},
            "amazonec2Config": {"instanceType": "t3.small"},
        }),
    );
}

fn scale_host_request(name: &str) -> Value {
    json!({
        "name": name,
        "driver": "scaleHost",
        "scaleHostConfig": {
            "hostSelector": {"foo": "bar"},
            "action": "up",
            "amount": 1,
            "min": 1,
            "max": 4,
        },
    })
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("host", "hooks.example.com")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(resp: Response<Body>) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Issue a webhook and return the created receiver resource.
async fn issue(router: &Router, body: &Value) -> Value {
    let uri = format!("/v1-webhooks/receivers?projectId={PROJECT}");
    let resp = router.clone().oneshot(post_json(&uri, body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    body_json(resp).await
}

fn redemption_path(receiver: &Value) -> String {
    let url = receiver["url"].as_str().unwrap();
    let path = url.strip_prefix("http://hooks.example.com").unwrap();
    path.to_string()
}

#[tokio::test]
async fn issue_then_redeem_scales_hosts() {
    let factory = InMemoryFactory::new();
    let platform = factory.project(PROJECT);
    seed_host(&platform);
    let router = test_router(&factory);

    let receiver = issue(&router, &scale_host_request("grow-web")).await;
    assert_eq!(receiver["type"], "receiver");
    assert_eq!(receiver["name"], "grow-web");
    assert_eq!(receiver["driver"], "scaleHost");
    assert_eq!(receiver["scaleHostConfig"]["amount"], 1);
    assert!(
        receiver["url"]
            .as_str()
            .unwrap()
            .starts_with("http://hooks.example.com/v1-webhooks/endpoint?token=")
    );

    let resp = router
        .clone()
        .oneshot(post_empty(&redemption_path(&receiver)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let hosts = platform.all(ResourceKind::Host);
    assert_eq!(hosts.len(), 2);
    assert_eq!(hosts[1]["hostname"], "web2.example.com");
    assert_eq!(hosts[1]["labels"]["foo"], "bar");
}

#[tokio::test]
async fn list_and_get_receivers() {
    let factory = InMemoryFactory::new();
    seed_host(&factory.project(PROJECT));
    let router = test_router(&factory);

    let receiver = issue(&router, &scale_host_request("grow-web")).await;
    let id = receiver["id"].as_str().unwrap();

    let req = Request::builder()
        .uri("/v1-webhooks/receivers")
        .header("x-api-project-id", PROJECT)
        .body(Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let list = body_json(resp).await;
    assert_eq!(list["type"], "collection");
    assert_eq!(list["data"].as_array().unwrap().len(), 1);
    assert_eq!(list["data"][0]["id"], id);

    let req = Request::builder()
        .uri(format!("/v1-webhooks/receivers/{id}?projectId={PROJECT}"))
        .body(Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["name"], "grow-web");

    // Other projects see nothing.
    let req = Request::builder()
        .uri(format!("/v1-webhooks/receivers/{id}?projectId=1a9"))
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleted_webhook_is_revoked() {
    let factory = InMemoryFactory::new();
    let platform = factory.project(PROJECT);
    seed_host(&platform);
    let router = test_router(&factory);

    let receiver = issue(&router, &scale_host_request("grow-web")).await;
    let id = receiver["id"].as_str().unwrap();

    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/v1-webhooks/receivers/{id}?projectId={PROJECT}"))
        .body(Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = router
        .clone()
        .oneshot(post_empty(&redemption_path(&receiver)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let err = body_json(resp).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["statusCode"], 403);
    assert_eq!(platform.all(ResourceKind::Host).len(), 1);

    // Deleting twice is a 404.
    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/v1-webhooks/receivers/{id}?projectId={PROJECT}"))
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn redeem_by_key() {
    let factory = InMemoryFactory::new();
    let platform = factory.project(PROJECT);
    platform.insert(
        ResourceKind::Service,
        json!({"id": "1s1", "name": "web", "state": "active", "scale": 2}),
    );
    let router = test_router(&factory);

    let body = json!({
        "name": "more-web",
        "driver": "scaleService",
        "scaleServiceConfig": {
            "serviceId": "1s1", "action": "up", "amount": 1, "min": 1, "max": 5,
        },
    });
    issue(&router, &body).await;
    let key = platform.all(ResourceKind::GenericObject)[0]["key"]
        .as_str()
        .unwrap()
        .to_string();

    let uri = format!("/v1-webhooks/endpoint?key={key}&projectId={PROJECT}");
    let resp = router.clone().oneshot(post_empty(&uri)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(platform.get(ResourceKind::Service, "1s1").unwrap()["scale"], 3);

    let uri = format!("/v1-webhooks/endpoint?key={key}");
    let resp = router.clone().oneshot(post_empty(&uri)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let uri = format!("/v1-webhooks/endpoint?key=unknown&projectId={PROJECT}");
    let resp = router.oneshot(post_empty(&uri)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_redemptions_are_rejected() {
    let factory = InMemoryFactory::new();
    let router = test_router(&factory);

    let resp = router
        .clone()
        .oneshot(post_empty("/v1-webhooks/endpoint?token=not-a-token"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = router
        .oneshot(post_empty("/v1-webhooks/endpoint"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn token_from_another_key_is_rejected() {
    let factory = InMemoryFactory::new();
    seed_host(&factory.project(PROJECT));
    let router = test_router(&factory);
    let receiver = issue(&router, &scale_host_request("grow-web")).await;

    let other = build_router(ApiState {
        registry: Arc::new(DriverRegistry::standard(UpgradePolicy::default())),
        codec: Arc::new(TokenCodec::from_signing_key(SigningKey::from_bytes(
            &[9u8; 32],
        ))),
        platforms: Arc::new(factory.clone()),
    });
    let resp = other
        .oneshot(post_empty(&redemption_path(&receiver)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(factory.project(PROJECT).all(ResourceKind::Host).len(), 1);
}

#[tokio::test]
async fn issue_validation_errors() {
    let factory = InMemoryFactory::new();
    seed_host(&factory.project(PROJECT));
    let router = test_router(&factory);
    let uri = format!("/v1-webhooks/receivers?projectId={PROJECT}");

    // Unknown driver.
    let body = json!({"name": "x", "driver": "forwardPost"});
    let resp = router.clone().oneshot(post_json(&uri, &body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Missing name.
    let body = json!({"driver": "scaleHost"});
    let resp = router.clone().oneshot(post_json(&uri, &body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Missing project.
    let resp = router
        .clone()
        .oneshot(post_json(
            "/v1-webhooks/receivers",
            &scale_host_request("grow-web"),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Wrong content type.
    let req = Request::builder()
        .method("POST")
        .uri(&uri)
        .header("content-type", "text/plain")
        .body(Body::from("{}"))
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Invalid driver configuration.
    let mut body = scale_host_request("bad-bounds");
    body["scaleHostConfig"]["min"] = json!(5);
    let resp = router.clone().oneshot(post_json(&uri, &body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Duplicate name.
    issue(&router, &scale_host_request("grow-web")).await;
    let resp = router
        .oneshot(post_json(&uri, &scale_host_request("grow-web")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(factory.project(PROJECT).all(ResourceKind::GenericObject).len(), 1);
}

#[tokio::test]
async fn schemas_and_version() {
    let router = test_router(&InMemoryFactory::new());

    let req = Request::builder()
        .uri("/v1-webhooks/schemas")
        .body(Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let schemas = body_json(resp).await;
    let ids: Vec<&str> = schemas["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(
        ids,
        ["scaleHostConfig", "scaleServiceConfig", "serviceUpgradeConfig"]
    );

    let req = Request::builder().uri("/version").body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["type"], "apiVersion");
}
