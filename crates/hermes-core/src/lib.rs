//! # Hermes Core
//!
//! The dispatch core of the Hermes JSON-RPC framework:
//!
//! - [`Context`] - per-call container of typed values with lazy resolution,
//!   cycle detection and ordered finalization
//! - [`Factory`] - the provider registry constructing values on demand
//! - [`MethodHandler`] - endpoint registration and dispatch of single calls
//!   and batches
//! - [`Error`] - the structured error model with inspection API
//! - [`Secret`] - the codec encrypting error debug strings
//! - [`Validator`] - per-field validation of params containers
//!
//! Transports live in `hermes-http` and `hermes-ws`; identity and
//! impersonation live in `hermes-auth`.
//!
//! ## A minimal system
//!
//! ```
//! use hermes_core::{
//!     Cancellation, Context, Error, Factory, HttpGet, MethodHandler,
//!     MethodHandlerOptions, Secret, TimeProvider, Clock,
//! };
//! use serde::Serialize;
//! use std::sync::Arc;
//!
//! struct StatusSystem;
//!
//! #[derive(Serialize)]
//! struct UptimeV1Result {
//!     ts: i64,
//! }
//!
//! impl StatusSystem {
//!     async fn uptime_v1(
//!         self: Arc<Self>,
//!         ctx: &Context,
//!         _get: HttpGet,
//!     ) -> Result<UptimeV1Result, Error> {
//!         let clock = ctx.require::<Clock>().await?;
//!         Ok(UptimeV1Result {
//!             ts: clock.now_unix(),
//!         })
//!     }
//! }
//!
//! let mut factory = Factory::new();
//! factory.install(TimeProvider::new());
//!
//! let mut handler = MethodHandler::new(
//!     Arc::new(factory),
//!     Arc::new(Secret::debug()),
//!     MethodHandlerOptions::default(),
//! );
//! handler.register_system(Arc::new(StatusSystem), |sys| {
//!     sys.method("UptimeV1", StatusSystem::uptime_v1);
//! });
//! assert_eq!(handler.endpoint_keys(), ["status-system/uptime.v1"]);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod cancel;
mod casing;
mod context;
mod error;
mod factory;
mod handler;
mod inspect;
mod meta;
mod params;
mod resolve;
mod rpc;
mod secret;
mod time;
mod validate;
mod value;

pub use cancel::Cancellation;
pub use casing::{to_kebab_case, to_pascal_case};
pub use context::Context;
pub use error::{codes, Error, ErrorData, PanicError};
pub use factory::{Factory, MemberProviderFn, ProviderFn, ProviderSet};
pub use handler::{
    format_rpc_method, parse_rpc_method, split_method_name, MethodDefinition, MethodFn,
    MethodHandler, MethodHandlerOptions, MissingValidationLevel, SystemScope, WithParams,
    WithoutParams,
};
pub use inspect::Inspector;
pub use meta::{HttpGet, HttpPost, HttpVerb, RpcMeta, RpcSource};
pub use params::{decode_params, Params, Validate};
pub use resolve::{ArgList, Resolve};
pub use rpc::{RpcErrorResponse, RpcNotification, RpcRequest, RpcResultResponse, VERSION};
pub use secret::{Secret, SecretDecodeError, SecretKeyError};
pub use time::{Clock, TimeProvider};
pub use validate::{validate_value, Fault, Validator};
pub use value::ContextValue;
