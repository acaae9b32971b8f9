//! Graceful shutdown: a closed-latch the whole process can watch.
//!
//! The provider owns the latch and ties it to SIGINT/SIGTERM; handlers
//! that run long loops require a [`Graceful`] and poll
//! [`is_up`](Graceful::is_up) to exit voluntarily once shutdown begins.

use crate::server::Server;
use hermes_core::{Cancellation, Context, ContextValue, Error, Factory, ProviderSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Lets request handlers observe server shutdown.
///
/// ```ignore
/// let graceful = ctx.require::<Graceful>().await?;
/// while graceful.is_up() {
///     // next chunk of work...
/// }
/// ```
#[derive(Debug)]
pub struct Graceful {
    shutdown: Cancellation,
}

impl ContextValue for Graceful {
    const SHAREABLE: bool = true;
    const SHAREABLE_ACROSS_IMPERSONATION: bool = true;
}

impl Graceful {
    /// `true` while the server is accepting requests.
    #[must_use]
    pub fn is_up(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// `true` once the server started shutting down.
    #[must_use]
    pub fn is_down(&self) -> bool {
        !self.is_up()
    }
}

/// Owns the shutdown latch and runs the serve-until-signal loop.
#[derive(Clone)]
pub struct GracefulProvider {
    shutdown: Cancellation,
    timeout: Option<Duration>,
}

impl GracefulProvider {
    /// Creates the provider with no drain timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shutdown: Cancellation::new(),
            timeout: None,
        }
    }

    /// Bounds how long shutdown waits for the serve loop to drain.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// A handle onto the latch, e.g. to trigger shutdown from tests.
    #[must_use]
    pub fn shutdown_handle(&self) -> Cancellation {
        self.shutdown.clone()
    }

    async fn new_graceful(&self, _ctx: &Context) -> Result<Arc<Graceful>, Error> {
        Ok(Arc::new(Graceful {
            shutdown: self.shutdown.clone(),
        }))
    }

    /// Serves until SIGINT/SIGTERM, then closes the latch and waits for
    /// the serve loop to drain (bounded by the configured timeout).
    ///
    /// # Errors
    ///
    /// Fails when the server cannot bind or accept.
    pub async fn listen_and_serve(
        &self,
        server: Arc<Server>,
        addr: SocketAddr,
    ) -> std::io::Result<()> {
        let mut serving = tokio::spawn(server.serve(addr, self.shutdown.clone()));

        tokio::select! {
            finished = &mut serving => {
                // The serve loop ended on its own (bind error, listener failure).
                return finished.unwrap_or_else(|join_err| Err(std::io::Error::other(join_err)));
            }
            () = shutdown_signal() => {}
        }

        info!("graceful: shutting down");
        self.shutdown.cancel();

        let drained = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, &mut serving).await.is_ok(),
            None => {
                let _ = (&mut serving).await;
                true
            }
        };
        if !drained {
            warn!("graceful: drain timeout reached, exiting");
            serving.abort();
        }
        Ok(())
    }
}

impl Default for GracefulProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderSet for GracefulProvider {
    fn register(self: Arc<Self>, factory: &mut Factory) {
        factory.bind_member(&self, GracefulProvider::new_graceful);
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(err) => {
                warn!(%err, "graceful: SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Asks the operating system for a free TCP port.
///
/// # Errors
///
/// Fails when no local listener can be opened.
pub fn get_free_port() -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}
