//! The per-connection client handle stored into dispatch contexts.

use hermes_core::{ContextValue, Error, RpcNotification};
use hermes_http::HttpRequest;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

/// A unique identifier for one websocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Creates a new time-ordered connection id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A handle onto the websocket session serving the current call.
///
/// Shareable: internal calls triggered by a websocket frame may keep
/// pushing to the same connection. Methods require it to push
/// server-initiated notifications:
///
/// ```ignore
/// let ws = ctx.require::<WsClient>().await?;
/// ws.send_notification(&RpcNotification::new("price/update.v1", &update))?;
/// ```
#[derive(Debug)]
pub struct WsClient {
    id: ConnectionId,
    request: Arc<HttpRequest>,
    outgoing: mpsc::Sender<Message>,
}

impl ContextValue for WsClient {
    const SHAREABLE: bool = true;
}

impl WsClient {
    pub(crate) fn new(request: Arc<HttpRequest>, outgoing: mpsc::Sender<Message>) -> Self {
        Self {
            id: ConnectionId::new(),
            request,
            outgoing,
        }
    }

    /// The connection's id.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.id
    }

    /// The ip address that opened the connection.
    #[must_use]
    pub fn ip_address(&self) -> String {
        self.request.ip_address()
    }

    /// The user agent sent with the opening request, if any.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.request.user_agent()
    }

    /// Queues a notification onto the connection.
    ///
    /// # Errors
    ///
    /// Fails when the connection's outgoing queue is full or closed.
    pub fn send_notification(&self, notification: &RpcNotification) -> Result<(), Error> {
        let payload = serde_json::to_string(notification).map_err(|err| {
            Error::new(
                hermes_core::codes::INTERNAL,
                format!("notification not serializable: {err}"),
            )
        })?;
        self.push(Message::text(payload))
    }

    pub(crate) fn push(&self, message: Message) -> Result<(), Error> {
        self.outgoing.try_send(message).map_err(|err| {
            Error::new(
                hermes_core::codes::INTERNAL,
                format!("ws client: connection queue unavailable: {err}"),
            )
        })
    }

    // Blocking variant used for replies, which must not be dropped under
    // backpressure.
    pub(crate) async fn send(&self, message: Message) -> Result<(), Error> {
        self.outgoing.send(message).await.map_err(|err| {
            Error::new(
                hermes_core::codes::INTERNAL,
                format!("ws client: connection closed: {err}"),
            )
        })
    }
}
