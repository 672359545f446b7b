//! End-to-end tests through the router, with a local stand-in for the
//! remote agent endpoint.

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use copilot_gateway::{build_router, ServerConfig};
use jsonwebtoken::{encode, get_current_timestamp, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Starts a remote endpoint that answers with whatever it received.
async fn spawn_remote() -> String {
    async fn echo(Json(body): Json<Value>) -> Json<Value> {
        Json(json!({ "data": { "received": body } }))
    }
    async fn failing(Json(_): Json<Value>) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "errors": [ { "message": "agent crashed" } ] })),
        )
            .into_response()
    }
    async fn not_json() -> &'static str {
        "plain text"
    }
    async fn slow(Json(_): Json<Value>) -> Json<Value> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Json(json!({}))
    }

    let app = Router::new()
        .route("/echo", post(echo))
        .route("/failing", post(failing))
        .route("/text", post(not_json))
        .route("/slow", post(slow));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn config(vars: &[(&str, &str)]) -> ServerConfig {
    let vars: Vec<(String, String)> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ServerConfig::from_lookup(move |key| {
        vars.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .unwrap()
}

fn graphql_post(body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/copilotkit")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_is_open_even_when_auth_required() {
    let app = build_router(&config(&[
        ("AUTH_PROVIDER", "header"),
        ("REQUIRE_AUTH", "true"),
    ]))
    .unwrap();

    let response = app
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn preflight_mirrors_origin_with_credentials() {
    let app = build_router(&config(&[])).unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/copilotkit")
                .header(header::ORIGIN, "https://app.example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(
                    header::ACCESS_CONTROL_REQUEST_HEADERS,
                    "content-type,x-copilotkit-runtime-client-gql-version",
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://app.example.com"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
}

#[tokio::test]
async fn required_gate_rejects_anonymous_requests() {
    let app = build_router(&config(&[
        ("AUTH_PROVIDER", "header"),
        ("REQUIRE_AUTH", "true"),
    ]))
    .unwrap();

    let response = app
        .oneshot(graphql_post(json!({ "query": "{ hello }" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        json_body(response).await,
        json!({ "errors": [ { "message": "Unauthenticated" } ] })
    );
}

#[tokio::test]
async fn header_identity_is_forwarded_as_properties() {
    let remote = spawn_remote().await;
    let app = build_router(&config(&[
        ("AUTH_PROVIDER", "header"),
        ("REMOTE_URL", format!("{}/echo", remote).as_str()),
        ("BASELINE_PROPERTIES", r#"{"tenant":"acme"}"#),
    ]))
    .unwrap();

    let mut request = graphql_post(json!({
        "query": "mutation { generateCopilotResponse }",
        "variables": { "data": { "threadId": "thread-1" } }
    }));
    request
        .headers_mut()
        .insert("x-auth-user-id", "u1".parse().unwrap());
    request
        .headers_mut()
        .insert("x-auth-session-id", "s1".parse().unwrap());
    request
        .headers_mut()
        .insert("x-request-id", "req-abc".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-abc");
    let body = json_body(response).await;
    assert_eq!(
        body["data"]["received"]["extensions"]["properties"],
        json!({
            "tenant": "acme",
            "userId": "u1",
            "sessionId": "s1",
            "organization": ""
        })
    );
    assert_eq!(
        body["data"]["received"]["variables"]["data"]["threadId"],
        "thread-1"
    );
}

#[tokio::test]
async fn anonymous_request_forwards_baseline() {
    let remote = spawn_remote().await;
    let app = build_router(&config(&[
        ("REMOTE_URL", format!("{}/echo", remote).as_str()),
        ("BASELINE_PROPERTIES", r#"{"tenant":"acme"}"#),
    ]))
    .unwrap();

    let response = app
        .oneshot(graphql_post(json!({ "query": "{ hello }" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(
        body["data"]["received"]["extensions"]["properties"],
        json!({ "tenant": "acme" })
    );
}

#[tokio::test]
async fn jwt_session_cookie_is_forwarded_as_properties() {
    let remote = spawn_remote().await;
    let app = build_router(&config(&[
        ("AUTH_PROVIDER", "jwt"),
        ("AUTH_JWT_SECRET", "test-secret"),
        ("REMOTE_URL", format!("{}/echo", remote).as_str()),
        ("REQUIRE_AUTH", "true"),
    ]))
    .unwrap();
    let token = encode(
        &Header::default(),
        &json!({
            "sub": "user_1",
            "sid": "sess_1",
            "org_id": "org_1",
            "exp": get_current_timestamp() + 300
        }),
        &EncodingKey::from_secret(b"test-secret"),
    )
    .unwrap();

    let mut request = graphql_post(json!({ "query": "{ hello }" }));
    request.headers_mut().insert(
        header::COOKIE,
        format!("theme=dark; __session={}", token).parse().unwrap(),
    );

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(
        body["data"]["received"]["extensions"]["properties"],
        json!({ "userId": "user_1", "sessionId": "sess_1", "organization": "org_1" })
    );
}

#[tokio::test]
async fn get_requests_use_query_string() {
    let remote = spawn_remote().await;
    let app = build_router(&config(&[("REMOTE_URL", format!("{}/echo", remote).as_str())])).unwrap();

    let response = app
        .oneshot(
            Request::get("/copilotkit?query=%7B%20hello%20%7D&operationName=Hello")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["received"]["query"], "{ hello }");
    assert_eq!(body["data"]["received"]["operationName"], "Hello");
}

#[tokio::test]
async fn malformed_requests_are_bad_request() {
    let app = build_router(&config(&[])).unwrap();

    let missing_query = app
        .clone()
        .oneshot(Request::get("/copilotkit").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing_query.status(), StatusCode::BAD_REQUEST);

    let bad_json = app
        .oneshot(
            Request::post("/copilotkit")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(bad_json.status(), StatusCode::BAD_REQUEST);
    let body = json_body(bad_json).await;
    assert!(body["errors"][0]["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid GraphQL request body"));
}

#[tokio::test]
async fn remote_status_is_relayed() {
    let remote = spawn_remote().await;
    let app = build_router(&config(&[("REMOTE_URL", format!("{}/failing", remote).as_str())])).unwrap();

    let response = app
        .oneshot(graphql_post(json!({ "query": "{ hello }" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await,
        json!({ "errors": [ { "message": "agent crashed" } ] })
    );
}

#[tokio::test]
async fn non_json_remote_reply_is_bad_gateway() {
    let remote = spawn_remote().await;
    let app = build_router(&config(&[("REMOTE_URL", format!("{}/text", remote).as_str())])).unwrap();

    let response = app
        .oneshot(graphql_post(json!({ "query": "{ hello }" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn slow_remote_is_gateway_timeout() {
    let remote = spawn_remote().await;
    let app = build_router(&config(&[
        ("REMOTE_URL", format!("{}/slow", remote).as_str()),
        ("REMOTE_TIMEOUT_SECS", "1"),
    ]))
    .unwrap();

    let response = app
        .oneshot(graphql_post(json!({ "query": "{ hello }" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(
        json_body(response).await,
        json!({ "errors": [ { "message": "Remote endpoint timed out" } ] })
    );
}

#[tokio::test]
async fn unreachable_remote_is_bad_gateway() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let app = build_router(&config(&[(
        "REMOTE_URL",
        format!("http://127.0.0.1:{}/", port).as_str(),
    )]))
    .unwrap();

    let response = app
        .oneshot(graphql_post(json!({ "query": "{ hello }" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        json_body(response).await,
        json!({ "errors": [ { "message": "Remote endpoint unavailable" } ] })
    );
}
