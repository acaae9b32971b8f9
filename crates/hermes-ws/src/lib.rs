//! # Hermes WS
//!
//! The websocket transport of the Hermes JSON-RPC framework.
//!
//! [`WsHandler`] upgrades one path to persistent sessions. Each session
//! runs two loops: a reader that dispatches every JSON frame to the method
//! handler on its own task (exactly like a body on the batched HTTP
//! endpoint), and a writer that drains the outgoing queue and emits
//! keepalive pings. Either loop ending closes the connection.
//!
//! Methods served from a websocket frame can require the [`WsClient`] to
//! push server-initiated notifications onto the same connection.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod config;
mod handler;

pub use client::{ConnectionId, WsClient};
pub use config::WsOptions;
pub use handler::WsHandler;
