//! # Hermes HTTP
//!
//! The HTTP transports of the Hermes JSON-RPC framework:
//!
//! - [`HttpRpcHandler`] - batched JSON-RPC 2.0 over one POST endpoint
//! - [`HttpMethodHandler`] - one HTTP route per registered method
//! - [`HttpRegexpHandler`] - regex-routed raw handlers for everything that
//!   is not a remote procedure
//! - [`Server`] - the ordered handler chain on a hyper serve loop
//! - [`GracefulProvider`] - signal-driven graceful shutdown with a
//!   [`Graceful`] latch handlers can poll
//!
//! All transports funnel into the same dispatch core
//! (`hermes_core::MethodHandler`); they differ only in how calls arrive
//! and how replies are rendered.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod graceful;
mod method;
mod regexp;
mod request;
mod rpc;
mod server;
mod status;

pub use graceful::{get_free_port, Graceful, GracefulProvider};
pub use method::HttpMethodHandler;
pub use regexp::{HttpRegexpHandler, RegexpFn, RegexpRoute};
pub use request::{
    HttpRequest, HttpResponse, HttpResponseWriter, MatchedParts, ResponseBody, RouteRequest,
};
pub use rpc::HttpRpcHandler;
pub use server::{RouteHandler, Server};
pub use status::http_status;
