//! The websocket route handler and session loops.

use crate::client::WsClient;
use crate::config::WsOptions;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hermes_core::{Cancellation, Context, HttpVerb, MethodHandler, RpcSource};
use hermes_http::{HttpRequest, HttpResponse, RouteHandler, RouteRequest};
use http::header::{CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE};
use http::{HeaderValue, StatusCode};
use http_body_util::Full;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

/// Upgrades one path to websocket sessions dispatching JSON-RPC frames.
///
/// Frames are dispatched exactly like bodies on the batched HTTP endpoint;
/// replies are pushed back over the same connection.
pub struct WsHandler {
    path: String,
    methods: Arc<MethodHandler>,
    options: WsOptions,
}

impl WsHandler {
    /// Creates the handler mounted at `path`.
    #[must_use]
    pub fn new(methods: Arc<MethodHandler>, path: impl Into<String>, options: WsOptions) -> Self {
        Self {
            path: path.into(),
            methods,
            options,
        }
    }
}

#[async_trait]
impl RouteHandler for WsHandler {
    async fn handle(&self, request: &mut RouteRequest) -> Option<HttpResponse> {
        if request.path() != self.path {
            return None;
        }

        if !wants_upgrade(request) {
            return Some(plain_response(StatusCode::BAD_REQUEST));
        }
        let Some(key) = request
            .headers()
            .get(SEC_WEBSOCKET_KEY)
            .map(|value| value.as_bytes().to_vec())
        else {
            return Some(plain_response(StatusCode::BAD_REQUEST));
        };
        let Some(on_upgrade) = request.extensions_mut().remove::<OnUpgrade>() else {
            warn!("ws handler: request is not upgradable");
            return Some(plain_response(StatusCode::BAD_REQUEST));
        };
        let Ok(accept) = HeaderValue::from_str(&derive_accept_key(&key)) else {
            return Some(plain_response(StatusCode::BAD_REQUEST));
        };

        let methods = Arc::clone(&self.methods);
        let options = self.options.clone();
        let snapshot = Arc::new(request.snapshot());
        tokio::spawn(async move {
            let upgraded = match on_upgrade.await {
                Ok(upgraded) => upgraded,
                Err(err) => {
                    warn!(%err, "ws handler: upgrade failed");
                    return;
                }
            };

            let mut config = WebSocketConfig::default();
            config.max_message_size = Some(options.max_message_size);
            let stream = WebSocketStream::from_raw_socket(
                TokioIo::new(upgraded),
                Role::Server,
                Some(config),
            )
            .await;
            run_session(methods, options, snapshot, stream).await;
        });

        let mut response = plain_response(StatusCode::SWITCHING_PROTOCOLS);
        response
            .headers_mut()
            .insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        response
            .headers_mut()
            .insert(UPGRADE, HeaderValue::from_static("websocket"));
        response.headers_mut().insert(SEC_WEBSOCKET_ACCEPT, accept);
        Some(response)
    }
}

fn wants_upgrade(request: &RouteRequest) -> bool {
    let upgrade = request
        .headers()
        .get(UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"));
    let connection = request
        .headers()
        .get(CONNECTION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        });
    upgrade && connection
}

fn plain_response(status: StatusCode) -> HttpResponse {
    let mut response = http::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

async fn run_session<S>(
    methods: Arc<MethodHandler>,
    options: WsOptions,
    request: Arc<HttpRequest>,
    stream: WebSocketStream<S>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, source) = stream.split();
    let (outgoing, outgoing_rx) = mpsc::channel(512);
    let client = Arc::new(WsClient::new(Arc::clone(&request), outgoing));
    debug!(connection_id = %client.connection_id(), "ws: session opened");

    // Either loop ending tears down the whole session: the select drops
    // both stream halves and with them the connection.
    tokio::select! {
        () = write_loop(sink, outgoing_rx, &options) => {}
        () = read_loop(source, &methods, &options, &request, &client) => {}
    }
    debug!(connection_id = %client.connection_id(), "ws: session closed");
}

async fn read_loop<S>(
    mut source: SplitStream<WebSocketStream<S>>,
    methods: &Arc<MethodHandler>,
    options: &WsOptions,
    request: &Arc<HttpRequest>,
    client: &Arc<WsClient>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    loop {
        let frame = match tokio::time::timeout(options.pong_wait, source.next()).await {
            Err(_elapsed) => {
                debug!("ws: read deadline reached");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(err))) => {
                debug!(%err, "ws: read failed");
                return;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                dispatch_frame(methods, client, request, text.into_bytes());
            }
            Message::Binary(data) => {
                dispatch_frame(methods, client, request, data);
            }
            Message::Ping(data) => {
                let _ = client.push(Message::Pong(data));
            }
            Message::Close(_) => return,
            _ => {}
        }
    }
}

// One dispatch task per frame: a slow method must not stall the reader.
fn dispatch_frame(
    methods: &Arc<MethodHandler>,
    client: &Arc<WsClient>,
    request: &Arc<HttpRequest>,
    data: Vec<u8>,
) {
    let methods = Arc::clone(methods);
    let client = Arc::clone(client);
    let request = Arc::clone(request);
    tokio::spawn(async move {
        let seed = {
            let client = Arc::clone(&client);
            let request = Arc::clone(&request);
            move |ctx: &Context| {
                ctx.store(Arc::clone(&request));
                ctx.store(Arc::clone(&client));
            }
        };
        let (replies, batch) = methods
            .serve_payload(
                &Cancellation::new(),
                RpcSource::Ws,
                HttpVerb::Unknown,
                &seed,
                &data,
            )
            .await;
        if replies.is_empty() {
            return;
        }

        let body = if batch {
            serde_json::to_string(&replies)
        } else {
            serde_json::to_string(&replies[0])
        };
        match body {
            Ok(body) => {
                if client.send(Message::text(body)).await.is_err() {
                    debug!("ws: reply dropped, connection gone");
                }
            }
            Err(err) => warn!(%err, "ws: reply not serializable"),
        }
    });
}

async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut outgoing: mpsc::Receiver<Message>,
    options: &WsOptions,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut ping = tokio::time::interval(options.ping_period);
    loop {
        let message = tokio::select! {
            queued = outgoing.recv() => match queued {
                Some(message) => message,
                None => return,
            },
            _ = ping.tick() => Message::Ping(Vec::new()),
        };

        match tokio::time::timeout(options.write_wait, sink.send(message)).await {
            Err(_elapsed) => {
                debug!("ws: write deadline reached");
                return;
            }
            Ok(Err(err)) => {
                debug!(%err, "ws: write failed");
                return;
            }
            Ok(Ok(())) => {}
        }
    }
}
