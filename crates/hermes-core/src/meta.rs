//! Per-call metadata and HTTP verb guards.

use crate::context::Context;
use crate::error::Error;
use crate::resolve::Resolve;
use crate::value::ContextValue;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// The HTTP verb a call arrived with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpVerb {
    /// HTTP GET.
    #[serde(rename = "GET")]
    Get,
    /// HTTP POST.
    #[serde(rename = "POST")]
    Post,
    /// Anything else, or a transport without verbs (websocket, internal).
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl HttpVerb {
    /// Parses an HTTP method name. Anything but GET and POST maps to
    /// [`HttpVerb::Unknown`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "GET" => Self::Get,
            "POST" => Self::Post,
            _ => Self::Unknown,
        }
    }
}

/// Where a call entered the framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RpcSource {
    /// A per-method or regex-routed HTTP endpoint.
    Http,
    /// The batched JSON-RPC HTTP endpoint.
    HttpRpc,
    /// A websocket session.
    Ws,
    /// A nested `call_method` invocation.
    Internal,
}

/// Per-call record of method name, HTTP verb and call source.
///
/// Stored into every dispatch context before the method runs. Not
/// shareable: forks install their own (an internal call is a different
/// method from a different source).
#[derive(Debug, Clone, Serialize)]
pub struct RpcMeta {
    method: String,
    http_verb: HttpVerb,
    source: RpcSource,
}

impl RpcMeta {
    /// Creates the metadata record for one call.
    #[must_use]
    pub fn new(method: impl Into<String>, http_verb: HttpVerb, source: RpcSource) -> Self {
        Self {
            method: method.into(),
            http_verb,
            source,
        }
    }

    /// The endpoint key being dispatched.
    #[must_use]
    pub fn method(&self) -> String {
        self.method.clone()
    }

    /// The HTTP verb the call arrived with.
    #[must_use]
    pub fn http_verb(&self) -> HttpVerb {
        self.http_verb
    }

    /// The transport the call arrived over.
    #[must_use]
    pub fn source(&self) -> RpcSource {
        self.source
    }
}

impl ContextValue for RpcMeta {}

/// Requires GET for remote procedures served over per-method HTTP.
///
/// Declared as a method argument. For calls arriving over the batched RPC
/// endpoint, websockets or internal calls the verb cannot be enforced and
/// the guard passes.
///
/// ```ignore
/// async fn current_time_v1(
///     self: Arc<Self>,
///     ctx: &Context,
///     public: Arc<Public>,
///     _get: HttpGet,
/// ) -> Result<CurrentTimeV1Result, Error> { /* ... */ }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct HttpGet;

/// Requires POST for remote procedures served over per-method HTTP.
///
/// See [`HttpGet`] for the enforcement rules.
#[derive(Debug, Clone, Copy)]
pub struct HttpPost;

fn enforce_verb<'a>(
    ctx: &'a Context,
    expected: HttpVerb,
) -> BoxFuture<'a, Result<(), Error>> {
    Box::pin(async move {
        let meta = ctx.require::<RpcMeta>().await?;
        // Only direct http calls carry an enforceable verb.
        if meta.source() == RpcSource::Http && meta.http_verb() != expected {
            return Err(Error::method_not_allowed());
        }
        Ok(())
    })
}

impl Resolve for HttpGet {
    fn resolve(ctx: &Context) -> BoxFuture<'_, Result<Self, Error>> {
        Box::pin(async move {
            enforce_verb(ctx, HttpVerb::Get).await?;
            Ok(Self)
        })
    }
}

impl Resolve for HttpPost {
    fn resolve(ctx: &Context) -> BoxFuture<'_, Result<Self, Error>> {
        Box::pin(async move {
            enforce_verb(ctx, HttpVerb::Post).await?;
            Ok(Self)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::factory::Factory;
    use crate::Cancellation;
    use std::sync::Arc;

    fn meta_context(verb: HttpVerb, source: RpcSource) -> Context {
        let ctx = Context::root(Cancellation::new(), Arc::new(Factory::new()), None);
        ctx.store(Arc::new(RpcMeta::new("test-system/noop.v1", verb, source)));
        ctx
    }

    #[test]
    fn test_verb_from_name() {
        assert_eq!(HttpVerb::from_name("GET"), HttpVerb::Get);
        assert_eq!(HttpVerb::from_name("POST"), HttpVerb::Post);
        assert_eq!(HttpVerb::from_name("DELETE"), HttpVerb::Unknown);
    }

    #[test]
    fn test_meta_serializes_upper_case_verbs() {
        let meta = RpcMeta::new("a/b.v1", HttpVerb::Get, RpcSource::HttpRpc);
        let json = serde_json::to_string(&meta).expect("serializes");
        assert!(json.contains(r#""GET""#));
        assert!(json.contains(r#""http-rpc""#));
    }

    #[test]
    fn test_meta_accessors_return_copies() {
        let meta = RpcMeta::new("a/b.v1", HttpVerb::Post, RpcSource::Ws);
        let mut copy = meta.method();
        copy.push_str("-mutated");
        assert_eq!(meta.method(), "a/b.v1");
    }

    #[tokio::test]
    async fn test_get_guard_passes_on_matching_verb() {
        let ctx = meta_context(HttpVerb::Get, RpcSource::Http);
        assert!(HttpGet::resolve(&ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_get_guard_rejects_post_over_http() {
        let ctx = meta_context(HttpVerb::Post, RpcSource::Http);
        let err = HttpGet::resolve(&ctx).await.expect_err("must reject");
        assert_eq!(err.code, crate::codes::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_guards_pass_for_non_http_sources() {
        for source in [RpcSource::HttpRpc, RpcSource::Ws, RpcSource::Internal] {
            let ctx = meta_context(HttpVerb::Unknown, source);
            assert!(HttpGet::resolve(&ctx).await.is_ok());
            assert!(HttpPost::resolve(&ctx).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_post_guard_rejects_get_over_http() {
        let ctx = meta_context(HttpVerb::Get, RpcSource::Http);
        let err = HttpPost::resolve(&ctx).await.expect_err("must reject");
        assert_eq!(err.code, crate::codes::METHOD_NOT_ALLOWED);
    }
}
