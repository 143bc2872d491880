//! End-to-end tool calls through the router against a mock Maximo server

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use maximo_gateway::{
    AppState,
    cache::{CacheManager, CacheTtls},
    client::{MaximoClient, MaximoClientConfig},
    config::Config,
    rate_limit::{RateLimit, RateLimitConfig, RateLimiter, category},
    routes,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{header as header_eq, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "gateway-key";

fn config(maximo_url: &str) -> Config {
    let vars: HashMap<&str, String> = HashMap::from([
        ("GATEWAY_API_KEY", API_KEY.to_string()),
        ("MAXIMO_API_URL", maximo_url.to_string()),
        ("MAXIMO_API_KEY", "maximo-key".to_string()),
        ("MAXIMO_MAXAUTH", "bWF4YWRtaW46cGFzcw==".to_string()),
        ("REDIS_ENABLED", "false".to_string()),
        ("CORS_ENABLED", "false".to_string()),
    ]);
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

fn state_with_limits(server: &MockServer, limits: RateLimitConfig) -> AppState {
    let config = config(&server.uri());
    let client = MaximoClient::new(MaximoClientConfig::from_config(&config)).unwrap();
    AppState {
        config: Arc::new(config),
        client: Arc::new(client),
        cache: Arc::new(CacheManager::in_memory(CacheTtls::default())),
        rate_limiter: Arc::new(RateLimiter::new(limits)),
    }
}

fn app(server: &MockServer) -> Router {
    routes::router(state_with_limits(server, RateLimitConfig::default()))
}

fn tool_request(tool: &str, args: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(format!("/api/tools/{tool}"))
        .header(header::AUTHORIZATION, format!("Bearer {API_KEY}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(args.to_string()))
        .unwrap()
}

async fn call(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn mount_asset(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/oslc/os/mxapiasset"))
        .and(query_param("oslc.where", r#"assetnum="A1" and siteid="BEDFORD""#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "member": [{
                "_id": "12",
                "assetnum": "A1",
                "siteid": "BEDFORD",
                "status": "NOT READY"
            }]
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn repeated_reads_are_served_from_cache() {
    let server = MockServer::start().await;
    mount_asset(&server, 1).await;
    let app = app(&server);

    for _ in 0..3 {
        let response = call(
            &app,
            tool_request("get_asset", json!({"assetnum": "A1", "siteid": "BEDFORD"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["code"], 0);
        assert_eq!(body["resp_data"]["assetnum"], "A1");
    }
}

#[tokio::test]
async fn status_update_invalidates_cached_record() {
    let server = MockServer::start().await;
    mount_asset(&server, 2).await;
    Mock::given(method("PATCH"))
        .and(path("/oslc/os/mxapiasset/12"))
        .and(header_eq("patchtype", "MERGE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let app = app(&server);
    let get = || tool_request("get_asset", json!({"assetnum": "A1", "siteid": "BEDFORD"}));

    assert_eq!(call(&app, get()).await.status(), StatusCode::OK);

    let response = call(
        &app,
        tool_request(
            "update_asset_status",
            json!({"assetnum": "A1", "siteid": "BEDFORD", "new_status": "OPERATING"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // 失效后重新读取下游
    assert_eq!(call(&app, get()).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn empty_member_list_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oslc/os/mxwo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"member": []})))
        .mount(&server)
        .await;
    let app = app(&server);

    let response = call(&app, tool_request("get_work_order", json!({"wonum": "404"}))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["code"], 1004);
    assert!(body["msg"].as_str().unwrap().contains("Work order not found: 404"));
}

#[tokio::test]
async fn downstream_failure_maps_to_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oslc/os/mxapiinventory"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;
    let app = app(&server);

    let response = call(&app, tool_request("search_inventory", json!({"low_stock": true}))).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["code"], 5002);
}

#[tokio::test]
async fn rejects_missing_or_wrong_api_key() {
    let server = MockServer::start().await;
    let app = app(&server);

    let missing = Request::builder()
        .method(Method::POST)
        .uri("/api/tools/get_asset")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"assetnum":"A1"}"#))
        .unwrap();
    let response = call(&app, missing).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

    let wrong = Request::builder()
        .method(Method::POST)
        .uri("/api/tools/get_asset")
        .header("x-api-key", "not-the-key")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"assetnum":"A1"}"#))
        .unwrap();
    assert_eq!(call(&app, wrong).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn throttled_calls_get_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oslc/os/mxapiasset"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"assetnum": "A2"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut limits = RateLimitConfig::default();
    limits
        .limits
        .insert(category::CREATE.to_string(), RateLimit::per_minute(1));
    let app = routes::router(state_with_limits(&server, limits));

    let args = json!({"assetnum": "A2", "siteid": "BEDFORD", "description": "Spare pump"});
    assert_eq!(call(&app, tool_request("create_asset", args.clone())).await.status(), StatusCode::OK);

    let response = call(&app, tool_request("create_asset", args)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(json_body(response).await["code"], 1005);
}

fn unauthenticated_request(api_key: &str, ip: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/tools/get_asset")
        .header("x-api-key", api_key)
        .header("x-real-ip", ip)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"assetnum":"A1"}"#))
        .unwrap()
}

#[tokio::test]
async fn key_guessing_is_throttled_per_client_address() {
    let server = MockServer::start().await;
    mount_asset(&server, 1).await;

    let mut limits = RateLimitConfig::default();
    limits
        .limits
        .insert(category::DEFAULT.to_string(), RateLimit::per_minute(2));
    let app = routes::router(state_with_limits(&server, limits));

    for _ in 0..2 {
        let response = call(&app, unauthenticated_request("guess", "6.6.6.6")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    for _ in 0..3 {
        let response = call(&app, unauthenticated_request("guess", "6.6.6.6")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }

    // 其他地址不受影响
    let response = call(&app, unauthenticated_request("guess", "7.7.7.7")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // 持有有效 key 的调用按 key 计数，不占用地址的额度
    let mut request = tool_request("get_asset", json!({"assetnum": "A1", "siteid": "BEDFORD"}));
    request
        .headers_mut()
        .insert("x-real-ip", "6.6.6.6".parse().unwrap());
    assert_eq!(call(&app, request).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn invalid_arguments_are_bad_request() {
    let server = MockServer::start().await;
    let app = app(&server);

    let response = call(&app, tool_request("issue_inventory", json!({"itemnum": "I1"}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], 1000);
}

#[tokio::test]
async fn forwards_maxauth_and_enriches_user() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oslc/os/mxuser"))
        .and(header_eq("maxauth", "dXNlcjpwdw=="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "member": [{"userid": "JDOE", "status": "BLOCKED", "lockedout": true, "failedlogincount": 4}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let app = app(&server);

    let mut request = tool_request("get_user_status", json!({"userid": "JDOE"}));
    request
        .headers_mut()
        .insert("maxauth", "dXNlcjpwdw==".parse().unwrap());
    let response = call(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let user = &body["resp_data"];
    assert_eq!(user["is_locked"], true);
    assert_eq!(user["is_active"], false);
    assert_eq!(user["failed_login_count"], 4);
}

#[tokio::test]
async fn health_reports_components_and_echoes_correlation_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oslc/whoami"))
        .and(header_eq("maxauth", "bWF4YWRtaW46cGFzcw=="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"userid": "MAXADMIN"})))
        .mount(&server)
        .await;
    let app = app(&server);

    let request = Request::builder()
        .uri("/api/health")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = call(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-correlation-id"], "req-42");

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["cache"], "healthy");
    assert_eq!(body["maximo"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn health_is_degraded_when_maximo_rejects_probe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oslc/whoami"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let app = app(&server);

    let response = call(&app, Request::builder().uri("/api/health").body(Body::empty()).unwrap()).await;
    let body = json_body(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["maximo"], "unhealthy");
    assert!(!body["timestamp"].as_str().unwrap().is_empty());
}
