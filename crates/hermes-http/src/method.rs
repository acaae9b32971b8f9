//! Per-method HTTP routes: every registered endpoint is reachable at its
//! own path, without the JSON-RPC envelope.
//!
//! The URL path is the endpoint key with the leading slash stripped:
//! `POST /account/update.v1`, `GET /status/uptime.v1`. Responses carry the
//! raw result (200), nothing (204), or the raw error object with the
//! mapped status.

use crate::request::{empty_response, json_response, HttpResponse, HttpResponseWriter, RouteRequest};
use crate::server::RouteHandler;
use crate::status::http_status;
use async_trait::async_trait;
use hermes_core::{Cancellation, Context, Error, MethodHandler, RpcRequest, RpcSource};
use http::StatusCode;
use serde_json::value::RawValue;
use std::sync::Arc;
use tracing::warn;

/// Serves each registered method as its own HTTP endpoint.
pub struct HttpMethodHandler {
    methods: Arc<MethodHandler>,
}

impl HttpMethodHandler {
    /// Creates the handler over the registered methods.
    #[must_use]
    pub fn new(methods: Arc<MethodHandler>) -> Self {
        Self { methods }
    }
}

#[async_trait]
impl RouteHandler for HttpMethodHandler {
    async fn handle(&self, request: &mut RouteRequest) -> Option<HttpResponse> {
        let key = request.path().strip_prefix('/').unwrap_or(request.path());
        let accepts_params = self.methods.endpoint_accepts_params(key)?;

        // The body is only consulted when the endpoint takes params;
        // otherwise it may legitimately be empty.
        let params: Option<Box<RawValue>> = if accepts_params {
            match serde_json::from_slice::<Box<RawValue>>(request.body()) {
                Ok(raw) => Some(raw),
                Err(err) => {
                    warn!(%err, endpoint = %key, "http method handler: read error");
                    let body = serde_json::to_vec(&Error::parse()).unwrap_or_default();
                    return Some(json_response(StatusCode::BAD_REQUEST, body));
                }
            }
        } else {
            None
        };

        let snapshot = Arc::new(request.snapshot());
        let writer = Arc::new(HttpResponseWriter::new());
        let seed = {
            let snapshot = Arc::clone(&snapshot);
            let writer = Arc::clone(&writer);
            move |ctx: &Context| {
                ctx.store(Arc::clone(&snapshot));
                ctx.store(Arc::clone(&writer));
            }
        };

        let rpc_request = RpcRequest::new(raw_id(), key, params);
        let result = Arc::clone(&self.methods)
            .serve_call(
                &Cancellation::new(),
                RpcSource::Http,
                request.verb(),
                &seed,
                &rpc_request,
            )
            .await;

        if let Some(response) = writer.take_response() {
            return Some(response);
        }

        let mut response = match result {
            Ok(Some(value)) => {
                json_response(StatusCode::OK, serde_json::to_vec(&value).unwrap_or_default())
            }
            Ok(None) => empty_response(StatusCode::NO_CONTENT),
            Err(err) => json_response(
                http_status(&err),
                serde_json::to_vec(&err).unwrap_or_default(),
            ),
        };
        writer.apply_headers(&mut response);
        Some(response)
    }
}

// Per-method calls carry no JSON-RPC id; -1 marks them in logs.
fn raw_id() -> Option<Box<RawValue>> {
    RawValue::from_string("-1".to_string()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use hermes_core::{
        Clock, Factory, HttpGet, HttpPost, MethodHandlerOptions, Params, Secret, TimeProvider,
        Validate,
    };
    use http::Method;
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    struct TestSystem;

    #[derive(Debug, Serialize)]
    struct CurrentTimeV1Result {
        ts: i64,
    }

    #[derive(Debug, Deserialize)]
    struct GetProfileV1Params {
        uuid: String,
    }

    #[async_trait]
    impl Validate for GetProfileV1Params {
        async fn validate(&self, v: &mut hermes_core::Validator<'_>) {
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

    impl TestSystem {
        async fn current_time_v1(
            self: Arc<Self>,
            ctx: &Context,
            _get: HttpGet,
        ) -> Result<CurrentTimeV1Result, Error> {
            let clock = ctx.require::<Clock>().await?;
            Ok(CurrentTimeV1Result {
                ts: clock.now_unix(),
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

        async fn ping_v1(self: Arc<Self>, _ctx: &Context) -> Result<(), Error> {
            Ok(())
        }
    }

    fn method_routes() -> HttpMethodHandler {
        let mut factory = Factory::new();
        factory.install(TimeProvider::fixed(1000));

        let mut methods = MethodHandler::new(
            Arc::new(factory),
            Arc::new(Secret::debug()),
            MethodHandlerOptions::default(),
        );
        methods.register_system(Arc::new(TestSystem), |sys| {
            sys.method("CurrentTimeV1", TestSystem::current_time_v1);
            sys.method("PingV1", TestSystem::ping_v1);
            sys.method_with_params("GetProfileV1", TestSystem::get_profile_v1);
        });
        HttpMethodHandler::new(Arc::new(methods))
    }

    fn route_request(method: Method, path: &str, body: &str) -> RouteRequest {
        let (parts, ()) = http::Request::builder()
            .method(method)
            .uri(path)
            .body(())
            .expect("valid request")
            .into_parts();
        RouteRequest::new(parts, Bytes::from(body.to_string()), None)
    }

    async fn body_json(response: HttpResponse) -> Value {
        use http_body_util::BodyExt;
        let collected = response.into_body().collect().await.expect("body");
        serde_json::from_slice(&collected.to_bytes()).expect("json body")
    }

    #[tokio::test]
    async fn test_unknown_paths_pass_through() {
        let handler = method_routes();
        let mut request = route_request(Method::GET, "/nope/nothing.v1", "");
        assert!(handler.handle(&mut request).await.is_none());
    }

    #[tokio::test]
    async fn test_get_returns_raw_result() {
        let handler = method_routes();
        let mut request = route_request(Method::GET, "/test-system/current-time.v1", "");

        let response = handler.handle(&mut request).await.expect("handled");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "application/json",
            "non-204 responses always carry a json content type"
        );
        let body = body_json(response).await;
        assert_eq!(body, serde_json::json!({"ts": 1000}));
    }

    #[tokio::test]
    async fn test_post_enforced_by_guard() {
        let handler = method_routes();
        let mut request = route_request(
            Method::GET,
            "/test-system/get-profile.v1",
            r#"{"uuid":"d69b8e2c-3e72-47fe-9c06-5113d03e7d59"}"#,
        );

        let response = handler.handle(&mut request).await.expect("handled");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_invalid_params_is_400_with_path_detail() {
        let handler = method_routes();
        let mut request = route_request(
            Method::POST,
            "/test-system/get-profile.v1",
            r#"{"uuid":"not-36-chars"}"#,
        );

        let response = handler.handle(&mut request).await.expect("handled");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], hermes_core::codes::INVALID_PARAMS);
        assert_eq!(body["data"]["details"][0]["data"]["path"][0], "uuid");
    }

    #[tokio::test]
    async fn test_null_result_is_204_without_body() {
        let handler = method_routes();
        let mut request = route_request(Method::GET, "/test-system/ping.v1", "");

        let response = handler.handle(&mut request).await.expect("handled");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get("content-type").is_none());
    }

    #[tokio::test]
    async fn test_unreadable_body_is_parse_error() {
        let handler = method_routes();
        let mut request = route_request(Method::POST, "/test-system/get-profile.v1", "{broken");

        let response = handler.handle(&mut request).await.expect("handled");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], hermes_core::codes::PARSE);
    }
}
