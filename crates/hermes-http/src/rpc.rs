//! The batched JSON-RPC endpoint: every call arrives as a POST to one
//! configured path.

use crate::request::{empty_response, json_response, HttpResponse, HttpResponseWriter, RouteRequest};
use crate::server::RouteHandler;
use async_trait::async_trait;
use hermes_core::{
    Cancellation, Context, Error, HttpVerb, MethodHandler, RpcErrorResponse, RpcSource,
};
use http::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;

/// Serves batched JSON-RPC 2.0 over a single HTTP path.
pub struct HttpRpcHandler {
    path: String,
    methods: Arc<MethodHandler>,
}

impl HttpRpcHandler {
    /// Creates the handler mounted at `path`.
    #[must_use]
    pub fn new(methods: Arc<MethodHandler>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            methods,
        }
    }
}

#[async_trait]
impl RouteHandler for HttpRpcHandler {
    async fn handle(&self, request: &mut RouteRequest) -> Option<HttpResponse> {
        if request.path() != self.path {
            return None;
        }

        // POST only, to keep simple cross-site requests out.
        if *request.method() != Method::POST {
            let body = serde_json::to_vec(&RpcErrorResponse::new(
                Value::Null,
                Error::method_not_allowed(),
            ))
            .unwrap_or_default();
            return Some(json_response(StatusCode::METHOD_NOT_ALLOWED, body));
        }

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

        let (replies, batch) = Arc::clone(&self.methods)
            .serve_payload(
                &Cancellation::new(),
                RpcSource::HttpRpc,
                HttpVerb::Post,
                &seed,
                request.body(),
            )
            .await;

        let mut response = if replies.is_empty() {
            // Nothing to return, but everything went fine (notifications).
            empty_response(StatusCode::OK)
        } else {
            let body = if batch {
                serde_json::to_vec(&replies).unwrap_or_default()
            } else {
                serde_json::to_vec(&replies[0]).unwrap_or_default()
            };
            json_response(StatusCode::OK, body)
        };
        writer.apply_headers(&mut response);
        Some(response)
    }
}
