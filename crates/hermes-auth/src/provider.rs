//! The `Public` and `Private` identity tokens.

use async_trait::async_trait;
use hermes_core::{Context, ContextValue, Error, Factory, ProviderSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// The authentication backend consulted when identity tokens resolve.
///
/// Both operations return `Ok(None)` for "no identity, no error": an
/// anonymous caller is a first-class outcome, not a failure. Errors are
/// reserved for the backend itself failing (network, storage).
#[async_trait]
pub trait AuthClient: Send + Sync + 'static {
    /// Does the caller possess a valid session, i.e. do we know who they are?
    ///
    /// Returns the account uuid when authenticated, `None` when not.
    async fn is_authenticated(&self, ctx: &Context) -> Result<Option<String>, Error>;

    /// Is the caller allowed to call the method currently being
    /// dispatched? Implementations read the current method from the
    /// context's `RpcMeta`.
    ///
    /// Returns the account uuid when authorized, `None` when not.
    async fn is_authorized(&self, ctx: &Context) -> Result<Option<String>, Error>;
}

/// Installs the [`Public`] and [`Private`] providers backed by an
/// [`AuthClient`].
pub struct AuthProvider {
    client: Arc<dyn AuthClient>,
}

impl AuthProvider {
    /// Creates the provider over the given backend.
    #[must_use]
    pub fn new(client: Arc<dyn AuthClient>) -> Self {
        Self { client }
    }

    async fn new_private(&self, ctx: &Context) -> Result<Arc<Private>, Error> {
        match self.client.is_authorized(ctx).await? {
            Some(account_uuid) => Ok(Arc::new(Private { account_uuid })),
            None => Err(Error::unauthorized()),
        }
    }

    async fn new_public(&self, _ctx: &Context) -> Result<Arc<Public>, Error> {
        Ok(Arc::new(Public {
            client: Arc::clone(&self.client),
            resolved: Mutex::new(None),
        }))
    }
}

impl ProviderSet for AuthProvider {
    fn register(self: Arc<Self>, factory: &mut Factory) {
        factory.bind_member(&self, AuthProvider::new_private);
        factory.bind_member(&self, AuthProvider::new_public);
    }
}

/// Proof that the caller may call the current method.
///
/// Never shareable across forks: when one endpoint calls another
/// internally, the callee is a different method and authorization must be
/// re-evaluated against it. The internal-call fork drops this value, so
/// the callee's `require` builds a fresh one through
/// [`AuthClient::is_authorized`].
#[derive(Debug)]
pub struct Private {
    account_uuid: String,
}

impl ContextValue for Private {}

impl Private {
    /// The authorized account's uuid.
    #[must_use]
    pub fn account_uuid(&self) -> &str {
        &self.account_uuid
    }
}

/// Lazily resolved caller identity for public endpoints.
///
/// Shareable: a public identity resolved once stays valid for nested
/// public calls in the same request, saving round trips to the
/// authenticator.
pub struct Public {
    client: Arc<dyn AuthClient>,
    resolved: Mutex<Option<Result<Option<String>, Error>>>,
}

impl ContextValue for Public {
    const SHAREABLE: bool = true;
}

impl Public {
    /// The caller's account uuid, if any.
    ///
    /// The first call resolves through the backend and memoizes the
    /// answer; concurrent callers serialize on the internal mutex so
    /// exactly one outbound call happens. If a [`Private`] was already
    /// resolved in this context, its identity is reused without another
    /// backend round trip.
    ///
    /// # Errors
    ///
    /// Fails when the backend fails; "not authenticated" is `Ok(None)`.
    pub async fn account_uuid(&self, ctx: &Context) -> Result<Option<String>, Error> {
        let mut resolved = self.resolved.lock().await;
        if let Some(cached) = resolved.as_ref() {
            return cached.clone();
        }

        let answer = match ctx.get::<Private>() {
            Some(private) => Ok(Some(private.account_uuid().to_string())),
            None => self.client.is_authenticated(ctx).await,
        };
        *resolved = Some(answer.clone());
        answer
    }
}

impl std::fmt::Debug for Public {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Public").finish_non_exhaustive()
    }
}
