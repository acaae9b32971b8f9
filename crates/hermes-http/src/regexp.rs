//! Regex-routed raw HTTP handlers.
//!
//! For the endpoints that are not remote procedures (file downloads,
//! webhooks, health probes), a list of `(pattern, handler)` pairs is
//! matched in registration order against the request path; the first match
//! wins. Handlers still run inside a dispatch context: provider arguments,
//! the response writer and the captured match parts all resolve the usual
//! way, and panics surface as JSON error bodies.

use crate::request::{empty_response, json_response, HttpRequest, HttpResponse, HttpResponseWriter, MatchedParts, RouteRequest};
use crate::server::RouteHandler;
use crate::status::http_status;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use hermes_core::{
    format_rpc_method, parse_rpc_method, ArgList, Cancellation, Context, Error, MethodHandler,
    RpcMeta, RpcSource, Secret,
};
use http::StatusCode;
use regex::Regex;
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

type RegexpInvokeFn =
    Arc<dyn for<'a> Fn(&'a Context) -> BoxFuture<'a, Result<(), Error>> + Send + Sync>;

/// Adapts a raw handler: `async fn(&Context, ...provider args...) ->
/// Result<(), Error>`.
pub trait RegexpFn<'a, Args>: Clone + Send + Sync + 'static {
    /// The handler's future.
    type Future: Future<Output = Result<(), Error>> + Send + 'a;

    /// Invokes the handler with resolved arguments.
    fn call(self, ctx: &'a Context, args: Args) -> Self::Future;
}

macro_rules! impl_regexp_fn {
    ($($arg:ident),*) => {
        impl<'a, F, Fut, $($arg),*> RegexpFn<'a, ($($arg,)*)> for F
        where
            F: Fn(&'a Context $(, $arg)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Result<(), Error>> + Send + 'a,
            $($arg: hermes_core::Resolve,)*
        {
            type Future = Fut;

            #[allow(non_snake_case)]
            fn call(self, ctx: &'a Context, args: ($($arg,)*)) -> Fut {
                let ($($arg,)*) = args;
                (self)(ctx $(, $arg)*)
            }
        }
    };
}

impl_regexp_fn!();
impl_regexp_fn!(A1);
impl_regexp_fn!(A1, A2);
impl_regexp_fn!(A1, A2, A3);
impl_regexp_fn!(A1, A2, A3, A4);

/// One registered regex route.
pub struct RegexpRoute {
    pattern: Regex,
    rpc_method: String,
    invoke: RegexpInvokeFn,
}

impl RegexpRoute {
    /// Overrides the `RpcMeta` method recorded for this route.
    ///
    /// By default the method is the pattern itself, or the parsed endpoint
    /// key when the pattern happens to be a valid `system/method.vN`
    /// string.
    pub fn with_rpc_method(&mut self, method: impl Into<String>) -> &mut Self {
        self.rpc_method = method.into();
        self
    }
}

/// Serves raw HTTP handlers routed by regular expressions.
pub struct HttpRegexpHandler {
    methods: Arc<MethodHandler>,
    routes: Vec<RegexpRoute>,
}

impl HttpRegexpHandler {
    /// Creates an empty route list over the given method handler (used
    /// for its factory and debug codec).
    #[must_use]
    pub fn new(methods: Arc<MethodHandler>) -> Self {
        Self {
            methods,
            routes: Vec::new(),
        }
    }

    /// Registers a handler for a pattern. First match wins, in
    /// registration order.
    ///
    /// # Panics
    ///
    /// Panics when the same pattern is registered twice.
    pub fn register<F, Args>(&mut self, pattern: Regex, handler: F) -> &mut RegexpRoute
    where
        Args: ArgList + 'static,
        F: for<'a> RegexpFn<'a, Args>,
    {
        assert!(
            !self
                .routes
                .iter()
                .any(|route| route.pattern.as_str() == pattern.as_str()),
            "http regexp handler: pattern {} registered twice",
            pattern.as_str()
        );

        let rpc_method = parse_rpc_method(pattern.as_str())
            .and_then(|(system, method, version)| format_rpc_method(&system, &method, version))
            .unwrap_or_else(|_| pattern.as_str().to_string());

        let invoke: RegexpInvokeFn = Arc::new(move |ctx: &Context| {
            let handler = handler.clone();
            Box::pin(async move {
                let args = Args::resolve(ctx).await?;
                handler.call(ctx, args).await
            })
        });

        self.routes.push(RegexpRoute {
            pattern,
            rpc_method,
            invoke,
        });
        self.routes.last_mut().expect("just pushed")
    }

    async fn run_route(&self, route: &RegexpRoute, ctx: &Context) -> Result<(), Error> {
        let future = (route.invoke)(ctx);
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let payload = match payload.downcast::<Error>() {
                    Ok(err) => return Err(*err),
                    Err(payload) => payload,
                };
                let message = if let Some(text) = payload.downcast_ref::<String>() {
                    text.clone()
                } else if let Some(text) = payload.downcast_ref::<&'static str>() {
                    (*text).to_string()
                } else {
                    "panic with non-string payload".to_string()
                };
                error!(
                    pattern = %route.pattern.as_str(),
                    panic = %message,
                    stack = %Backtrace::force_capture(),
                    "http regexp handler: panic",
                );
                Err(Error::internal().with_debug(self.methods.secret(), &message))
            }
        }
    }
}

#[async_trait]
impl RouteHandler for HttpRegexpHandler {
    async fn handle(&self, request: &mut RouteRequest) -> Option<HttpResponse> {
        let route = self
            .routes
            .iter()
            .find(|route| route.pattern.is_match(request.path()))?;
        let parts: Vec<String> = route
            .pattern
            .captures(request.path())
            .map(|caps| {
                caps.iter()
                    .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();

        let ctx = Context::root(
            Cancellation::new(),
            Arc::clone(self.methods.factory()),
            Some(Arc::clone(&self.methods)),
        );
        let writer = Arc::new(HttpResponseWriter::new());
        ctx.store::<Secret>(Arc::clone(self.methods.secret()));
        ctx.store(Arc::new(request.snapshot()));
        ctx.store(Arc::clone(&writer));
        ctx.store(Arc::new(MatchedParts::new(parts)));
        ctx.store(Arc::new(RpcMeta::new(
            route.rpc_method.clone(),
            request.verb(),
            RpcSource::Http,
        )));

        let result = self.run_route(route, &ctx).await;
        let err = ctx.finalize(result.err()).await;

        if let Some(response) = writer.take_response() {
            return Some(response);
        }

        match err {
            Some(err) => {
                let body = serde_json::to_vec(&err).unwrap_or_default();
                Some(json_response(http_status(&err), body))
            }
            None => Some(empty_response(StatusCode::OK)),
        }
    }
}
