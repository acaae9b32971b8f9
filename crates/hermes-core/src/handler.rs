//! Endpoint registration and dispatch.
//!
//! A [`MethodHandler`] maps endpoint keys (`<system>/<method>.v<N>`) to
//! typed adapter closures built at registration time. Dispatch of one call
//! runs: envelope parse → endpoint lookup → params decode + validation →
//! provider argument resolution → method invocation under a panic guard →
//! reply formatting → context finalization.

use crate::cancel::Cancellation;
use crate::casing::to_kebab_case;
use crate::context::Context;
use crate::error::{codes, Error, PanicError};
use crate::factory::Factory;
use crate::meta::{HttpVerb, RpcMeta, RpcSource};
use crate::params::{decode_params, Params};
use crate::resolve::Resolve;
use crate::rpc::{RpcErrorResponse, RpcRequest, RpcResultResponse};
use crate::secret::Secret;
use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;
use serde::Serialize;
use serde_json::value::RawValue;
use serde_json::Value;
use std::any::{type_name, Any};
use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, LazyLock};
use tracing::{error, info, warn};

static METHOD_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^(.+)V([0-9]+)$").expect("valid pattern"));
static RPC_METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9-]+)/([a-z0-9-]+)\.v([0-9]+)$").expect("valid pattern")
});
static KEBAB_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-z0-9-]+$").expect("valid pattern"));

/// Splits a PascalCase method name with a version suffix.
///
/// `"CurrentTimeV1"` yields `("current-time", 1)`; names without the exact
/// `V<positive>` suffix yield `("", 0)`.
#[must_use]
pub fn split_method_name(name: &str) -> (String, u64) {
    let Some(caps) = METHOD_SUFFIX.captures(name) else {
        return (String::new(), 0);
    };
    let version = caps[2].parse().unwrap_or(0);
    if version == 0 {
        return (String::new(), 0);
    }
    (to_kebab_case(&caps[1]), version)
}

/// Formats an endpoint key from its parts.
///
/// # Errors
///
/// Fails on empty or non-kebab identifiers or a non-positive version.
pub fn format_rpc_method(system: &str, method: &str, version: u64) -> Result<String, Error> {
    if !KEBAB_IDENTIFIER.is_match(system) {
        return Err(Error::new(
            codes::INTERNAL,
            format!("invalid system identifier: {system:?}"),
        ));
    }
    if !KEBAB_IDENTIFIER.is_match(method) {
        return Err(Error::new(
            codes::INTERNAL,
            format!("invalid method identifier: {method:?}"),
        ));
    }
    if version == 0 {
        return Err(Error::new(codes::INTERNAL, "version must be positive"));
    }
    Ok(format!("{system}/{method}.v{version}"))
}

/// Parses an endpoint key into `(system, method, version)`.
///
/// # Errors
///
/// Fails when the key does not match `<kebab-system>/<kebab-method>.v<N>`
/// with a positive version.
pub fn parse_rpc_method(key: &str) -> Result<(String, String, u64), Error> {
    let caps = RPC_METHOD
        .captures(key)
        .ok_or_else(|| Error::new(codes::INTERNAL, format!("invalid rpc method: {key:?}")))?;
    let version: u64 = caps[3]
        .parse()
        .map_err(|_| Error::new(codes::INTERNAL, format!("invalid version in: {key:?}")))?;
    if version == 0 {
        return Err(Error::new(codes::INTERNAL, "version must be positive"));
    }
    Ok((caps[1].to_string(), caps[2].to_string(), version))
}

/// Severity raised at registration for a params type without validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingValidationLevel {
    /// Accept silently.
    #[default]
    Ignore,
    /// Log at info.
    Info,
    /// Log at warn.
    Warn,
    /// Log at error.
    Error,
    /// Refuse the registration.
    Fatal,
}

/// Method handler configuration.
#[derive(Debug, Clone, Default)]
pub struct MethodHandlerOptions {
    /// Severity for params types registered without validation.
    pub missing_validation_level: MissingValidationLevel,
}

/// The registered identity of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDefinition {
    /// Kebab-case system name.
    pub system: String,
    /// Kebab-case method name.
    pub method: String,
    /// Positive version.
    pub version: u64,
}

type InvokeFn = Arc<
    dyn for<'a> Fn(&'a Context, Option<&'a RawValue>) -> BoxFuture<'a, Result<Option<Value>, Error>>
        + Send
        + Sync,
>;

struct Endpoint {
    definition: MethodDefinition,
    accepts_params: bool,
    invoke: InvokeFn,
}

/// Marker for methods without a params argument; `Args` is the tuple of
/// provider-driven argument types.
pub struct WithoutParams<Args>(PhantomData<Args>);

/// Marker for methods whose trailing argument is the params type `P`.
pub struct WithParams<Args, P>(PhantomData<(Args, P)>);

/// Adapts a typed method into the erased endpoint shape.
///
/// Implemented for `async fn(Arc<S>, &Context, ...provider args...)`
/// (marker [`WithoutParams`]) and for
/// `async fn(Arc<S>, &Context, ...provider args..., P)` with `P:
/// [`Params`]` (marker [`WithParams`]). The return type is
/// `Result<R, Error>` with `R: Serialize`; serializing to `null` (e.g.
/// `R = ()`) makes the call result-less.
pub trait MethodFn<'a, S, M>: Clone + Send + Sync + 'static {
    /// Whether the method takes a params argument.
    const ACCEPTS_PARAMS: bool;
    /// Whether the params type carries real validation.
    const PARAMS_VALIDATED: bool;

    /// The adapted invocation future.
    type Future: Future<Output = Result<Option<Value>, Error>> + Send + 'a;

    /// Decodes params, resolves provider arguments and invokes the method.
    fn invoke(
        self,
        this: Arc<S>,
        ctx: &'a Context,
        secret: &'a Arc<Secret>,
        raw: Option<&'a RawValue>,
    ) -> Self::Future;
}

fn into_rpc_result<R: Serialize>(out: Result<R, Error>) -> Result<Option<Value>, Error> {
    let value = serde_json::to_value(out?)
        .map_err(|err| Error::new(codes::INTERNAL, format!("result not serializable: {err}")))?;
    Ok(if value.is_null() { None } else { Some(value) })
}

macro_rules! impl_method_fn {
    ($($arg:ident),*) => {
        impl<'a, S, F, Fut, R, $($arg),*> MethodFn<'a, S, WithoutParams<($($arg,)*)>> for F
        where
            S: Send + Sync + 'static,
            F: Fn(Arc<S>, &'a Context $(, $arg)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Result<R, Error>> + Send + 'a,
            R: Serialize,
            $($arg: Resolve,)*
        {
            const ACCEPTS_PARAMS: bool = false;
            const PARAMS_VALIDATED: bool = true;

            type Future = BoxFuture<'a, Result<Option<Value>, Error>>;

            #[allow(non_snake_case)]
            fn invoke(
                self,
                this: Arc<S>,
                ctx: &'a Context,
                _secret: &'a Arc<Secret>,
                _raw: Option<&'a RawValue>,
            ) -> Self::Future {
                Box::pin(async move {
                    $(let $arg = $arg::resolve(ctx).await?;)*
                    into_rpc_result((self)(this, ctx $(, $arg)*).await)
                })
            }
        }

        impl<'a, S, F, Fut, R, $($arg,)* P> MethodFn<'a, S, WithParams<($($arg,)*), P>> for F
        where
            S: Send + Sync + 'static,
            P: Params,
            F: Fn(Arc<S>, &'a Context $(, $arg)*, P) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Result<R, Error>> + Send + 'a,
            R: Serialize,
            $($arg: Resolve,)*
        {
            const ACCEPTS_PARAMS: bool = true;
            const PARAMS_VALIDATED: bool = P::VALIDATED;

            type Future = BoxFuture<'a, Result<Option<Value>, Error>>;

            #[allow(non_snake_case)]
            fn invoke(
                self,
                this: Arc<S>,
                ctx: &'a Context,
                secret: &'a Arc<Secret>,
                raw: Option<&'a RawValue>,
            ) -> Self::Future {
                Box::pin(async move {
                    let params = decode_params::<P>(ctx, secret, raw).await?;
                    $(let $arg = $arg::resolve(ctx).await?;)*
                    into_rpc_result((self)(this, ctx $(, $arg)*, params).await)
                })
            }
        }
    };
}

impl_method_fn!();
impl_method_fn!(A1);
impl_method_fn!(A1, A2);
impl_method_fn!(A1, A2, A3);
impl_method_fn!(A1, A2, A3, A4);

/// Registers and dispatches versioned methods grouped into systems.
pub struct MethodHandler {
    factory: Arc<Factory>,
    secret: Arc<Secret>,
    options: MethodHandlerOptions,
    endpoints: HashMap<String, Endpoint>,
}

impl MethodHandler {
    /// Creates a handler over the given provider registry and debug codec.
    #[must_use]
    pub fn new(factory: Arc<Factory>, secret: Arc<Secret>, options: MethodHandlerOptions) -> Self {
        Self {
            factory,
            secret,
            options,
            endpoints: HashMap::new(),
        }
    }

    /// The debug codec attached to outgoing errors.
    #[must_use]
    pub fn secret(&self) -> &Arc<Secret> {
        &self.secret
    }

    /// The provider registry.
    #[must_use]
    pub fn factory(&self) -> &Arc<Factory> {
        &self.factory
    }

    /// Registers a system: a named group of versioned methods.
    ///
    /// The system's wire name is the kebab-case of `S`'s type name; each
    /// method is added inside `mount` under its PascalCase code name:
    ///
    /// ```ignore
    /// handler.register_system(Arc::new(TestSystem::new()), |sys| {
    ///     sys.method("CurrentTimeV1", TestSystem::current_time_v1);
    ///     sys.method_with_params("GetProfileV1", TestSystem::get_profile_v1);
    /// });
    /// ```
    ///
    /// # Panics
    ///
    /// Panics on invalid method names, duplicate endpoints, and, with
    /// [`MissingValidationLevel::Fatal`], params types without validation.
    pub fn register_system<S>(&mut self, system: Arc<S>, mount: impl FnOnce(&mut SystemScope<'_, S>))
    where
        S: Send + Sync + 'static,
    {
        let name = to_kebab_case(short_type_name::<S>());
        let mut scope = SystemScope {
            handler: self,
            system,
            name,
        };
        mount(&mut scope);
    }

    /// Returns whether the endpoint exists, and whether it takes params.
    #[must_use]
    pub fn endpoint_accepts_params(&self, key: &str) -> Option<bool> {
        self.endpoints.get(key).map(|endpoint| endpoint.accepts_params)
    }

    /// The registered endpoint keys, sorted.
    #[must_use]
    pub fn endpoint_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.endpoints.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// The definition registered under `key`.
    #[must_use]
    pub fn definition(&self, key: &str) -> Option<&MethodDefinition> {
        self.endpoints.get(key).map(|endpoint| &endpoint.definition)
    }

    /// Dispatches one parsed envelope on an existing context.
    ///
    /// This is the dispatch core: endpoint lookup, argument construction
    /// and the panic guard. The caller owns context finalization.
    pub async fn dispatch(
        &self,
        ctx: &Context,
        request: &RpcRequest,
    ) -> Result<Option<Value>, Error> {
        let Some(endpoint) = self.endpoints.get(&request.method) else {
            warn!(method = %request.method, "method handler: endpoint not found");
            return Err(Error::method_not_found());
        };

        let future = (endpoint.invoke)(ctx, request.params.as_deref());
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(self.recovered(payload, request)),
        }
    }

    /// Dispatches one envelope in a fresh root context and finalizes it.
    ///
    /// `seed` stores the transport's request-scoped values before dispatch.
    pub async fn serve_call(
        self: Arc<Self>,
        cancel: &Cancellation,
        source: RpcSource,
        verb: HttpVerb,
        seed: &(dyn Fn(&Context) + Send + Sync),
        request: &RpcRequest,
    ) -> Result<Option<Value>, Error> {
        let ctx = Context::root(
            cancel.clone(),
            Arc::clone(&self.factory),
            Some(Arc::clone(&self)),
        );
        ctx.store(Arc::clone(&self.secret));
        seed(&ctx);
        ctx.store(Arc::new(RpcMeta::new(request.method.clone(), verb, source)));

        let result = self.dispatch(&ctx, request).await;
        finalize_into(ctx, result).await
    }

    /// Handles a raw transport payload: a single envelope object or a
    /// batch array of envelopes.
    ///
    /// Returns the serialized reply envelopes plus whether the response
    /// must be rendered as a batch. Notifications contribute no element;
    /// unreadable envelopes contribute a *parse* error.
    pub async fn serve_payload(
        self: Arc<Self>,
        cancel: &Cancellation,
        source: RpcSource,
        verb: HttpVerb,
        seed: &(dyn Fn(&Context) + Send + Sync),
        data: &[u8],
    ) -> (Vec<Value>, bool) {
        let parse_failure =
            || vec![serialize_reply(RpcErrorResponse::new(Value::Null, Error::parse()))];

        if data.is_empty() {
            warn!("method handler: empty body received");
            return (parse_failure(), false);
        }

        let (raw_requests, batch) = match data[0] {
            b'[' => match serde_json::from_slice::<Vec<Box<RawValue>>>(data) {
                Ok(requests) if requests.is_empty() => {
                    warn!("method handler: empty request array received");
                    return (parse_failure(), false);
                }
                Ok(requests) => (requests, true),
                Err(err) => {
                    warn!(%err, "method handler: parse error");
                    return (parse_failure(), false);
                }
            },
            b'{' => match serde_json::from_slice::<Box<RawValue>>(data) {
                Ok(request) => (vec![request], false),
                Err(err) => {
                    warn!(%err, "method handler: parse error");
                    return (parse_failure(), false);
                }
            },
            _ => {
                warn!("method handler: payload is neither an array nor an object");
                return (parse_failure(), false);
            }
        };

        let mut replies = Vec::new();
        for raw in &raw_requests {
            let request: RpcRequest = match serde_json::from_str(raw.get()) {
                Ok(request) => request,
                Err(err) => {
                    warn!(%err, "method handler: parse error");
                    replies.push(serialize_reply(RpcErrorResponse::new(
                        Value::Null,
                        Error::parse(),
                    )));
                    continue;
                }
            };

            let result = Arc::clone(&self)
                .serve_call(cancel, source, verb, seed, &request)
                .await;
            if request.is_notification() {
                continue;
            }
            replies.push(match result {
                Ok(value) => serialize_reply(RpcResultResponse::new(
                    request.id_value(),
                    value.unwrap_or(Value::Null),
                )),
                Err(err) => serialize_reply(RpcErrorResponse::new(request.id_value(), err)),
            });
        }

        (replies, batch)
    }

    /// Dispatches a nested internal call on behalf of `caller`.
    ///
    /// The callee context is a fork of the caller carrying only `SHAREABLE`
    /// slots plus a fresh `RpcMeta` with source `internal`; it is finalized
    /// before returning.
    pub(crate) async fn call_internal(
        self: Arc<Self>,
        caller: &Context,
        method: &str,
        verb: HttpVerb,
        payload: Value,
    ) -> Result<Option<Value>, Error> {
        let params = serde_json::value::to_raw_value(&payload)
            .map_err(|err| Error::new(codes::INTERNAL, format!("payload not serializable: {err}")))?;
        let request = RpcRequest::new(None, method, Some(params));

        let forked = caller.fork_shared();
        forked.store(Arc::new(RpcMeta::new(method, verb, RpcSource::Internal)));

        let result = self.dispatch(&forked, &request).await;
        finalize_into(forked, result).await
    }

    fn recovered(&self, payload: Box<dyn Any + Send>, request: &RpcRequest) -> Error {
        // A panic carrying an Error is developer-intentional and surfaces
        // verbatim.
        let payload = match payload.downcast::<Error>() {
            Ok(err) => return *err,
            Err(payload) => payload,
        };

        let message = if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else if let Some(text) = payload.downcast_ref::<&'static str>() {
            (*text).to_string()
        } else {
            "panic with non-string payload".to_string()
        };

        let panic_error = PanicError {
            message,
            stack: Backtrace::force_capture().to_string(),
            method: request.method.clone(),
            request_id: request.id.as_deref().map(|raw| raw.get().to_string()),
        };
        error!(
            method = %panic_error.method,
            request_id = ?panic_error.request_id,
            panic = %panic_error.message,
            stack = %panic_error.stack,
            "method handler: panic",
        );
        Error::internal().with_debug(&self.secret, &panic_error.message)
    }

    fn insert_endpoint(&mut self, key: String, endpoint: Endpoint) {
        assert!(
            !self.endpoints.contains_key(&key),
            "method handler: endpoint {key} already registered"
        );
        self.endpoints.insert(key, endpoint);
    }
}

impl std::fmt::Debug for MethodHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodHandler")
            .field("endpoints", &self.endpoint_keys())
            .field("secret", &self.secret.kind())
            .finish()
    }
}

async fn finalize_into(
    ctx: Context,
    result: Result<Option<Value>, Error>,
) -> Result<Option<Value>, Error> {
    let (value, err) = match result {
        Ok(value) => (value, None),
        Err(err) => (None, Some(err)),
    };
    match ctx.finalize(err).await {
        None => Ok(value),
        Some(err) => Err(err),
    }
}

fn serialize_reply<R: Serialize>(reply: R) -> Value {
    serde_json::to_value(reply).unwrap_or(Value::Null)
}

fn short_type_name<S>() -> &'static str {
    let full = type_name::<S>();
    let base = full.rsplit("::").next().unwrap_or(full);
    base.split('<').next().unwrap_or(base)
}

/// Registration scope for one system's methods.
pub struct SystemScope<'h, S> {
    handler: &'h mut MethodHandler,
    system: Arc<S>,
    name: String,
}

impl<S: Send + Sync + 'static> SystemScope<'_, S> {
    /// The system's kebab-case wire name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a method without a params argument.
    ///
    /// `name` is the PascalCase code name with version suffix, e.g.
    /// `"CurrentTimeV1"`.
    ///
    /// # Panics
    ///
    /// Panics on a name without a positive `V<N>` suffix or a duplicate
    /// endpoint.
    pub fn method<F, Args>(&mut self, name: &str, method: F)
    where
        Args: 'static,
        F: for<'a> MethodFn<'a, S, WithoutParams<Args>>,
    {
        self.register::<F, WithoutParams<Args>>(name, method);
    }

    /// Registers a method whose trailing argument is a [`Params`] type.
    ///
    /// # Panics
    ///
    /// Same conditions as [`method`](Self::method), plus a params type
    /// without validation when the handler is configured with
    /// [`MissingValidationLevel::Fatal`].
    pub fn method_with_params<F, Args, P>(&mut self, name: &str, method: F)
    where
        Args: 'static,
        P: Params,
        F: for<'a> MethodFn<'a, S, WithParams<Args, P>>,
    {
        self.register::<F, WithParams<Args, P>>(name, method);
    }

    fn register<F, M>(&mut self, name: &str, method: F)
    where
        M: 'static,
        F: for<'a> MethodFn<'a, S, M>,
    {
        let (method_name, version) = split_method_name(name);
        assert!(
            version > 0,
            "method handler: {name} must carry a positive V<N> suffix"
        );
        let key = match format_rpc_method(&self.name, &method_name, version) {
            Ok(key) => key,
            Err(err) => panic!("method handler: {err}"),
        };

        let accepts_params = <F as MethodFn<'static, S, M>>::ACCEPTS_PARAMS;
        let validated = <F as MethodFn<'static, S, M>>::PARAMS_VALIDATED;
        if accepts_params && !validated {
            match self.handler.options.missing_validation_level {
                MissingValidationLevel::Ignore => {}
                MissingValidationLevel::Info => {
                    info!(endpoint = %key, "method handler: params type is not validated");
                }
                MissingValidationLevel::Warn => {
                    warn!(endpoint = %key, "method handler: params type is not validated");
                }
                MissingValidationLevel::Error => {
                    error!(endpoint = %key, "method handler: params type is not validated");
                }
                MissingValidationLevel::Fatal => {
                    panic!("method handler: {key} params type is not validated");
                }
            }
        }

        let system = Arc::clone(&self.system);
        let secret = Arc::clone(&self.handler.secret);
        let invoke: InvokeFn = Arc::new(move |ctx: &Context, raw: Option<&RawValue>| {
            let method = method.clone();
            let system = Arc::clone(&system);
            let secret = Arc::clone(&secret);
            Box::pin(async move { method.invoke(system, ctx, &secret, raw).await })
        });

        self.handler.insert_endpoint(
            key,
            Endpoint {
                definition: MethodDefinition {
                    system: self.name.clone(),
                    method: method_name,
                    version,
                },
                accepts_params,
                invoke,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::HttpGet;
    use crate::params::Validate;
    use crate::time::{Clock, TimeProvider};
    use serde::Deserialize;

    struct TestSystem;

    #[derive(Debug, Serialize, Deserialize)]
    struct CurrentTimeV1Result {
        ts: i64,
    }

    #[derive(Debug, Deserialize)]
    struct EchoV1Params {
        x: i64,
    }

    #[async_trait::async_trait]
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
            _get: HttpGet,
        ) -> Result<CurrentTimeV1Result, Error> {
            let clock = ctx.require::<Clock>().await?;
            Ok(CurrentTimeV1Result {
                ts: clock.now_unix(),
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

        async fn fail_intentionally_v1(self: Arc<Self>, _ctx: &Context) -> Result<(), Error> {
            std::panic::panic_any(Error::too_many_requests());
        }

        async fn relay_v1(self: Arc<Self>, ctx: &Context) -> Result<EchoV1Result, Error> {
            let nested = ctx
                .call_method(
                    "test-system/echo.v1",
                    HttpVerb::Unknown,
                    &serde_json::json!({"x": 9}),
                )
                .await?
                .unwrap_or(Value::Null);
            Ok(EchoV1Result {
                x: nested["x"].as_i64().unwrap_or_default(),
            })
        }
    }

    fn build_handler() -> Arc<MethodHandler> {
        let mut factory = Factory::new();
        factory.install(TimeProvider::fixed(1000));

        let mut handler = MethodHandler::new(
            Arc::new(factory),
            Arc::new(Secret::debug()),
            MethodHandlerOptions::default(),
        );
        handler.register_system(Arc::new(TestSystem), |sys| {
            assert_eq!(sys.name(), "test-system");
            sys.method("CurrentTimeV1", TestSystem::current_time_v1);
            sys.method("NotifyV1", TestSystem::notify_v1);
            sys.method("BoomV1", TestSystem::boom_v1);
            sys.method("FailIntentionallyV1", TestSystem::fail_intentionally_v1);
            sys.method("RelayV1", TestSystem::relay_v1);
            sys.method_with_params("EchoV1", TestSystem::echo_v1);
        });
        Arc::new(handler)
    }

    fn root_context(handler: &Arc<MethodHandler>) -> Context {
        Context::root(
            Cancellation::new(),
            Arc::clone(handler.factory()),
            Some(Arc::clone(handler)),
        )
    }

    #[test]
    fn test_split_method_name_table() {
        assert_eq!(
            split_method_name("MyMethodV1"),
            ("my-method".to_string(), 1)
        );
        assert_eq!(
            split_method_name("CurrentTimeV12"),
            ("current-time".to_string(), 12)
        );
        assert_eq!(split_method_name("MyMethodx"), (String::new(), 0));
        assert_eq!(split_method_name("MyMethodV0"), (String::new(), 0));
        assert_eq!(split_method_name(""), (String::new(), 0));
    }

    #[test]
    fn test_format_parse_round_trip() {
        let key = format_rpc_method("sys1", "my-method", 10).expect("formats");
        assert_eq!(key, "sys1/my-method.v10");
        assert_eq!(
            parse_rpc_method(&key).expect("parses"),
            ("sys1".to_string(), "my-method".to_string(), 10)
        );
    }

    #[test]
    fn test_format_rejections() {
        assert!(format_rpc_method("", "m", 1).is_err());
        assert!(format_rpc_method("Sys", "m", 1).is_err());
        assert!(format_rpc_method("sys", "My-Method", 1).is_err());
        assert!(format_rpc_method("sys", "m", 0).is_err());
    }

    #[test]
    fn test_parse_rejections() {
        for key in [
            "Sys2/my-other-method.v1",
            "sys/My-other-method.v1",
            "sys/my-other-method.vx",
            "sys/my-other-method",
            "sys/my-other-method*.v1",
            "sys!/my-other-method.v1",
            "sys/my-other-method.v-1",
        ] {
            assert!(parse_rpc_method(key).is_err(), "{key} must not parse");
        }
    }

    #[test]
    fn test_endpoint_keys_and_params_flags() {
        let handler = build_handler();
        assert!(handler
            .endpoint_keys()
            .contains(&"test-system/current-time.v1".to_string()));
        assert_eq!(
            handler.endpoint_accepts_params("test-system/current-time.v1"),
            Some(false)
        );
        assert_eq!(
            handler.endpoint_accepts_params("test-system/echo.v1"),
            Some(true)
        );
        assert_eq!(handler.endpoint_accepts_params("missing/m.v1"), None);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_endpoint_panics() {
        let mut handler = MethodHandler::new(
            Arc::new(Factory::new()),
            Arc::new(Secret::debug()),
            MethodHandlerOptions::default(),
        );
        handler.register_system(Arc::new(TestSystem), |sys| {
            sys.method("NotifyV1", TestSystem::notify_v1);
            sys.method("NotifyV1", TestSystem::notify_v1);
        });
    }

    #[test]
    #[should_panic(expected = "positive V<N> suffix")]
    fn test_unversioned_method_panics() {
        let mut handler = MethodHandler::new(
            Arc::new(Factory::new()),
            Arc::new(Secret::debug()),
            MethodHandlerOptions::default(),
        );
        handler.register_system(Arc::new(TestSystem), |sys| {
            sys.method("Notify", TestSystem::notify_v1);
        });
    }

    #[test]
    #[should_panic(expected = "params type is not validated")]
    fn test_fatal_missing_validation_panics() {
        #[derive(Debug, Deserialize)]
        struct Unchecked {
            #[allow(dead_code)]
            x: i64,
        }
        #[async_trait::async_trait]
        impl Validate for Unchecked {}
        impl Params for Unchecked {}

        async fn with_unchecked(
            _this: Arc<TestSystem>,
            _ctx: &Context,
            _params: Unchecked,
        ) -> Result<(), Error> {
            Ok(())
        }

        let mut handler = MethodHandler::new(
            Arc::new(Factory::new()),
            Arc::new(Secret::debug()),
            MethodHandlerOptions {
                missing_validation_level: MissingValidationLevel::Fatal,
            },
        );
        handler.register_system(Arc::new(TestSystem), |sys| {
            sys.method_with_params("UncheckedV1", with_unchecked);
        });
    }

    #[tokio::test]
    async fn test_call_method_returns_result() {
        let handler = build_handler();
        let ctx = root_context(&handler);

        let result = ctx
            .call_method("test-system/current-time.v1", HttpVerb::Get, &Value::Null)
            .await
            .expect("call succeeds")
            .expect("has result");
        assert_eq!(result["ts"], 1000);
    }

    #[tokio::test]
    async fn test_call_method_unknown_endpoint() {
        let handler = build_handler();
        let ctx = root_context(&handler);

        let err = ctx
            .call_method("test-system/missing.v1", HttpVerb::Get, &Value::Null)
            .await
            .expect_err("must fail");
        assert_eq!(err.code, codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_nested_call_reaches_other_endpoint() {
        let handler = build_handler();
        let ctx = root_context(&handler);

        let result = ctx
            .call_method("test-system/relay.v1", HttpVerb::Unknown, &Value::Null)
            .await
            .expect("call succeeds")
            .expect("has result");
        assert_eq!(result["x"], 9);
    }

    #[tokio::test]
    async fn test_panic_is_wrapped_as_internal_with_debug() {
        let handler = build_handler();
        let ctx = root_context(&handler);

        let err = ctx
            .call_method("test-system/boom.v1", HttpVerb::Unknown, &Value::Null)
            .await
            .expect_err("must fail");
        assert_eq!(err.code, codes::INTERNAL);
        assert_eq!(err.data.expect("data").debug.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_error_panic_surfaces_verbatim() {
        let handler = build_handler();
        let ctx = root_context(&handler);

        let err = ctx
            .call_method(
                "test-system/fail-intentionally.v1",
                HttpVerb::Unknown,
                &Value::Null,
            )
            .await
            .expect_err("must fail");
        assert_eq!(err.code, codes::TOO_MANY_REQUESTS);
        assert!(err.data.is_none(), "no debug wrapping for intentional errors");
    }

    async fn payload_roundtrip(handler: &Arc<MethodHandler>, body: &str) -> (Vec<Value>, bool) {
        Arc::clone(handler)
            .serve_payload(
                &Cancellation::new(),
                RpcSource::HttpRpc,
                HttpVerb::Post,
                &|_ctx| {},
                body.as_bytes(),
            )
            .await
    }

    #[tokio::test]
    async fn test_serve_payload_single_object() {
        let handler = build_handler();
        let (replies, batch) = payload_roundtrip(
            &handler,
            r#"{"jsonrpc":"2.0","id":1,"method":"test-system/current-time.v1"}"#,
        )
        .await;
        assert!(!batch);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["result"]["ts"], 1000);
        assert_eq!(replies[0]["id"], 1);
    }

    #[tokio::test]
    async fn test_serve_payload_batch_with_notification() {
        let handler = build_handler();
        let body = r#"[
            {"jsonrpc":"2.0","id":null,"method":"test-system/notify.v1"},
            {"jsonrpc":"2.0","id":"7","method":"test-system/echo.v1","params":{"x":1}}
        ]"#;
        let (replies, batch) = payload_roundtrip(&handler, body).await;
        assert!(batch);
        assert_eq!(replies.len(), 1, "notification contributes no element");
        assert_eq!(replies[0]["id"], "7");
        assert_eq!(replies[0]["result"]["x"], 1);
    }

    #[tokio::test]
    async fn test_serve_payload_parse_errors() {
        let handler = build_handler();
        for body in ["", "[]", "trash", "{broken"] {
            let (replies, _) = payload_roundtrip(&handler, body).await;
            assert_eq!(replies.len(), 1, "{body:?}");
            assert_eq!(replies[0]["error"]["code"], codes::PARSE, "{body:?}");
        }
    }

    #[tokio::test]
    async fn test_serve_payload_invalid_params() {
        let handler = build_handler();
        let body = r#"{"jsonrpc":"2.0","id":2,"method":"test-system/echo.v1","params":{"x":1,"bogus":true}}"#;
        let (replies, _) = payload_roundtrip(&handler, body).await;
        assert_eq!(replies[0]["error"]["code"], codes::INVALID_PARAMS);
    }

    #[test]
    fn test_short_type_name_strips_path() {
        assert_eq!(short_type_name::<TestSystem>(), "TestSystem");
    }
}
