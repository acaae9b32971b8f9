//! # Hermes
//!
//! **Multi-transport JSON-RPC 2.0 server framework with per-request
//! dependency injection**
//!
//! Services are organized as *systems*: named groups of versioned methods
//! reachable as `<system>/<method>.v<N>`. Every call runs inside a
//! [`Context`](prelude::Context) that resolves the method's declared
//! arguments from a registry of providers: lazily, with cycle detection,
//! and with finalization in reverse construction order.
//!
//! The same registered methods are served over three transports:
//!
//! - batched JSON-RPC over a single HTTP endpoint
//! - one HTTP route per method (`POST /account/update.v1`)
//! - persistent websocket sessions
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use hermes::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let mut factory = Factory::new();
//!     factory.install(TimeProvider::new());
//!     factory.install(AuthProvider::new(auth_backend));
//!
//!     let mut methods = MethodHandler::new(
//!         Arc::new(factory),
//!         Arc::new(Secret::aead(&key_hex).expect("valid key")),
//!         MethodHandlerOptions::default(),
//!     );
//!     methods.register_system(Arc::new(AccountSystem::new()), |sys| {
//!         sys.method("MeV1", AccountSystem::me_v1);
//!         sys.method_with_params("UpdateV1", AccountSystem::update_v1);
//!     });
//!     let methods = Arc::new(methods);
//!
//!     let graceful = GracefulProvider::new();
//!     let server = Arc::new(
//!         Server::new()
//!             .with(HttpRpcHandler::new(Arc::clone(&methods), "/rpc"))
//!             .with(HttpMethodHandler::new(Arc::clone(&methods)))
//!             .with(WsHandler::new(methods, "/ws", WsOptions::default())),
//!     );
//!     graceful.listen_and_serve(server, "0.0.0.0:8080".parse().unwrap()).await
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/hermes/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export the dispatch core
pub use hermes_core as core;

// Re-export identity & impersonation
pub use hermes_auth as auth;

// Re-export the HTTP transports
pub use hermes_http as http;

// Re-export the websocket transport
pub use hermes_ws as ws;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use hermes::prelude::*;
/// ```
pub mod prelude {
    pub use hermes_core::{
        codes, Cancellation, Clock, Context, ContextValue, Error, ErrorData, Factory, HttpGet,
        HttpPost, HttpVerb, MethodHandler, MethodHandlerOptions, MissingValidationLevel, Params,
        ProviderSet, RpcMeta, RpcNotification, RpcSource, Secret, TimeProvider, Validate,
        Validator,
    };

    pub use hermes_auth::{
        AuthClient, AuthProvider, Impersonated, Impersonator, ImpersonatorProvider, Private,
        Public,
    };

    pub use hermes_http::{
        get_free_port, Graceful, GracefulProvider, HttpMethodHandler, HttpRegexpHandler,
        HttpRequest, HttpResponseWriter, HttpRpcHandler, MatchedParts, Server,
    };

    pub use hermes_ws::{WsClient, WsHandler, WsOptions};
}
