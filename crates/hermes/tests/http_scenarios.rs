//! End-to-end scenarios over the HTTP transports: the per-method routes
//! and the batched RPC endpoint, wired exactly as a deployment would
//! mount them.

use async_trait::async_trait;
use bytes::Bytes;
use hermes::prelude::*;
use hermes_test::AuthClientMock;
use http::{Method, StatusCode};
use http_body_util::BodyExt;
use hermes::http::{HttpResponse, RouteRequest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

const AEAD_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

struct TestSystem;

#[derive(Debug, Serialize)]
struct CurrentTimeV1Result {
    ts: i64,
}

#[derive(Debug, Serialize)]
struct MeV1Result {
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct GetProfileV1Params {
    uuid: String,
}

#[async_trait]
impl Validate for GetProfileV1Params {
    async fn validate(&self, v: &mut Validator<'_>) {
        if self.uuid.len() != 36 {
            v.fault(["uuid"]).message("uuid invalid");
        }
    }
}

impl Params for GetProfileV1Params {
    const VALIDATED: bool = true;
}

#[derive(Debug, Serialize)]
struct GetProfileV1Result {
    name: String,
}

#[derive(Debug, Deserialize)]
struct EchoV1Params {
    x: i64,
}

#[async_trait]
impl Validate for EchoV1Params {}
impl Params for EchoV1Params {
    const VALIDATED: bool = true;
}

#[derive(Debug, Serialize)]
struct EchoV1Result {
    x: i64,
}

impl TestSystem {
    async fn current_time_v1(
        self: Arc<Self>,
        ctx: &Context,
        _public: Arc<Public>,
        _get: HttpGet,
    ) -> Result<CurrentTimeV1Result, Error> {
        let clock = ctx.require::<Clock>().await?;
        Ok(CurrentTimeV1Result {
            ts: clock.now_unix(),
        })
    }

    async fn me_v1(
        self: Arc<Self>,
        _ctx: &Context,
        private: Arc<Private>,
        _get: HttpGet,
    ) -> Result<MeV1Result, Error> {
        Ok(MeV1Result {
            uuid: private.account_uuid().to_string(),
        })
    }

    async fn get_profile_v1(
        self: Arc<Self>,
        _ctx: &Context,
        _post: HttpPost,
        params: GetProfileV1Params,
    ) -> Result<GetProfileV1Result, Error> {
        let _ = params.uuid;
        Ok(GetProfileV1Result {
            name: "Silvio".to_string(),
        })
    }

    async fn echo_v1(
        self: Arc<Self>,
        _ctx: &Context,
        params: EchoV1Params,
    ) -> Result<EchoV1Result, Error> {
        Ok(EchoV1Result { x: params.x })
    }

    async fn notify_v1(self: Arc<Self>, _ctx: &Context) -> Result<(), Error> {
        Ok(())
    }

    async fn boom_v1(self: Arc<Self>, _ctx: &Context) -> Result<(), Error> {
        panic!("boom");
    }
}

fn build_server() -> Server {
    let mock = Arc::new(AuthClientMock::new());

    let mut factory = Factory::new();
    factory.install(TimeProvider::fixed(1000));
    factory.install(AuthProvider::new(mock));

    let mut methods = MethodHandler::new(
        Arc::new(factory),
        Arc::new(Secret::aead(AEAD_KEY).expect("valid key")),
        MethodHandlerOptions::default(),
    );
    methods.register_system(Arc::new(TestSystem), |sys| {
        sys.method("CurrentTimeV1", TestSystem::current_time_v1);
        sys.method("MeV1", TestSystem::me_v1);
        sys.method("NotifyV1", TestSystem::notify_v1);
        sys.method("BoomV1", TestSystem::boom_v1);
        sys.method_with_params("GetProfileV1", TestSystem::get_profile_v1);
        sys.method_with_params("EchoV1", TestSystem::echo_v1);
    });
    let methods = Arc::new(methods);

    Server::new()
        .with(HttpRpcHandler::new(Arc::clone(&methods), "/rpc"))
        .with(HttpMethodHandler::new(methods))
}

fn request(method: Method, path: &str, body: &str) -> RouteRequest {
    let (parts, ()) = http::Request::builder()
        .method(method)
        .uri(path)
        .body(())
        .expect("valid request")
        .into_parts();
    RouteRequest::new(parts, Bytes::from(body.to_string()), None)
}

async fn body_json(response: HttpResponse) -> Value {
    let collected = response.into_body().collect().await.expect("body");
    serde_json::from_slice(&collected.to_bytes()).expect("json body")
}

#[tokio::test]
async fn test_current_time_over_method_route() {
    let server = build_server();
    let mut req = request(Method::GET, "/test-system/current-time.v1", "");

    let response = server.route(&mut req).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"ts": 1000}));
}

#[tokio::test]
async fn test_unauthorized_me_is_403_with_error_body() {
    let server = build_server();
    let mut req = request(Method::GET, "/test-system/me.v1", "");

    let response = server.route(&mut req).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response).await,
        json!({"code": -32001, "message": "Not authorized"})
    );
}

#[tokio::test]
async fn test_invalid_params_is_400_with_uuid_path() {
    let server = build_server();
    let mut req = request(
        Method::POST,
        "/test-system/get-profile.v1",
        r#"{"uuid":"not-36-chars"}"#,
    );

    let response = server.route(&mut req).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["code"], codes::INVALID_PARAMS);
    assert_eq!(body["data"]["details"][0]["data"]["path"], json!(["uuid"]));
}

#[tokio::test]
async fn test_valid_profile_round_trip() {
    let server = build_server();
    let mut req = request(
        Method::POST,
        "/test-system/get-profile.v1",
        r#"{"uuid":"d69b8e2c-3e72-47fe-9c06-5113d03e7d59"}"#,
    );

    let response = server.route(&mut req).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"name": "Silvio"}));
}

#[tokio::test]
async fn test_batch_notification_plus_call() {
    let server = build_server();
    let mut req = request(
        Method::POST,
        "/rpc",
        r#"[
            {"jsonrpc":"2.0","id":null,"method":"test-system/notify.v1"},
            {"jsonrpc":"2.0","id":"7","method":"test-system/echo.v1","params":{"x":1}}
        ]"#,
    );

    let response = server.route(&mut req).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let replies = body.as_array().expect("batch response");
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["id"], "7");
    assert_eq!(replies[0]["result"]["x"], 1);
}

#[tokio::test]
async fn test_panic_is_wrapped_with_encrypted_debug() {
    let server = build_server();

    // Per-method route: HTTP 500.
    let mut req = request(Method::GET, "/test-system/boom.v1", "");
    let response = server.route(&mut req).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(response).await;
    assert_eq!(body["code"], codes::INTERNAL);
    let debug = body["data"]["debug"].as_str().expect("debug present");
    assert_ne!(debug, "boom", "debug travels encrypted");

    let reader = Secret::aead(AEAD_KEY).expect("valid key");
    assert_eq!(reader.decode(debug).expect("operator can expand"), "boom");

    // Batched endpoint: error reply with the internal code.
    let mut req = request(
        Method::POST,
        "/rpc",
        r#"{"jsonrpc":"2.0","id":3,"method":"test-system/boom.v1"}"#,
    );
    let response = server.route(&mut req).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32603);
    assert_eq!(body["id"], 3);
}

#[tokio::test]
async fn test_unknown_method_route_is_404() {
    let server = build_server();
    let mut req = request(Method::GET, "/test-system/missing.v1", "");

    let response = server.route(&mut req).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
