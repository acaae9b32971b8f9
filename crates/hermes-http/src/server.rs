//! The HTTP server: an ordered chain of route handlers on a hyper serve
//! loop.

use crate::request::{empty_response, HttpResponse, RouteRequest};
use async_trait::async_trait;
use hermes_core::Cancellation;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// A mountable request handler.
///
/// Handlers are consulted in mount order; the first one returning a
/// response serves the request.
#[async_trait]
pub trait RouteHandler: Send + Sync + 'static {
    /// Serves the request, or returns `None` when it is not this
    /// handler's to serve.
    async fn handle(&self, request: &mut RouteRequest) -> Option<HttpResponse>;
}

/// The Hermes HTTP server.
///
/// Mount whichever handlers the deployment needs: the batched RPC
/// endpoint, per-method routes, regex routes, a websocket upgrade. Order
/// decides which handler claims a request first.
///
/// # Example
///
/// ```ignore
/// let server = Arc::new(
///     Server::new()
///         .with(HttpRpcHandler::new(Arc::clone(&methods), "/rpc"))
///         .with(HttpMethodHandler::new(Arc::clone(&methods))),
/// );
/// graceful.listen_and_serve(server, addr).await?;
/// ```
#[derive(Default)]
pub struct Server {
    handlers: Vec<Arc<dyn RouteHandler>>,
}

impl Server {
    /// Creates a server with no handlers mounted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts a handler at the end of the chain.
    #[must_use]
    pub fn with(mut self, handler: impl RouteHandler) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Mounts an already shared handler at the end of the chain.
    pub fn push(&mut self, handler: Arc<dyn RouteHandler>) {
        self.handlers.push(handler);
    }

    /// Routes one request through the handler chain. Unclaimed requests
    /// get an empty 404.
    pub async fn route(&self, request: &mut RouteRequest) -> HttpResponse {
        for handler in &self.handlers {
            if let Some(response) = handler.handle(request).await {
                return response;
            }
        }
        empty_response(StatusCode::NOT_FOUND)
    }

    /// Accepts connections until `shutdown` fires, serving each on its own
    /// task.
    ///
    /// # Errors
    ///
    /// Fails when the listener cannot bind or accept.
    pub async fn serve(
        self: Arc<Self>,
        addr: SocketAddr,
        shutdown: Cancellation,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "server: accepting connections");

        loop {
            let (stream, remote_addr) = tokio::select! {
                accepted = listener.accept() => accepted?,
                () = shutdown.cancelled() => break,
            };

            let server = Arc::clone(&self);
            tokio::spawn(async move {
                let service = service_fn(move |incoming: Request<Incoming>| {
                    let server = Arc::clone(&server);
                    async move {
                        Ok::<_, Infallible>(server.serve_request(incoming, remote_addr).await)
                    }
                });
                let connection = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .with_upgrades();
                if let Err(err) = connection.await {
                    debug!(%err, "server: connection closed with error");
                }
            });
        }

        info!("server: stopped accepting connections");
        Ok(())
    }

    async fn serve_request(
        &self,
        incoming: Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> HttpResponse {
        let (parts, body) = incoming.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                warn!(%err, "server: failed to read request body");
                return empty_response(StatusCode::BAD_REQUEST);
            }
        };
        let mut request = RouteRequest::new(parts, body, Some(remote_addr));
        self.route(&mut request).await
    }
}
