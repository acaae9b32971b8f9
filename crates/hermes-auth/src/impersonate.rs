//! Scoped impersonation: running calls as another account.

use hermes_core::{Context, ContextValue, Error, Factory, ProviderSet};
use std::future::Future;
use std::sync::Arc;

/// Installs the [`Impersonator`] provider.
pub struct ImpersonatorProvider;

impl ImpersonatorProvider {
    /// Creates the provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn new_impersonator(&self, _ctx: &Context) -> Result<Arc<Impersonator>, Error> {
        Ok(Arc::new(Impersonator))
    }
}

impl Default for ImpersonatorProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderSet for ImpersonatorProvider {
    fn register(self: Arc<Self>, factory: &mut Factory) {
        factory.bind_member(&self, ImpersonatorProvider::new_impersonator);
    }
}

/// Opens impersonation scopes on behalf of the current caller.
#[derive(Debug)]
pub struct Impersonator;

impl ContextValue for Impersonator {}

impl Impersonator {
    /// Runs `scope` as `account_uuid`.
    ///
    /// The scope receives a fresh context carrying only the values marked
    /// shareable across impersonation, plus an [`Impersonated`] record
    /// whose chain extends any impersonation already active on `ctx`.
    /// Policy is not decided here: the auth backend checks every hop of
    /// the chain when the impersonated context resolves its identity.
    ///
    /// # Errors
    ///
    /// Returns whatever `scope` returns.
    pub async fn impersonate<F, Fut>(
        &self,
        ctx: &Context,
        account_uuid: impl Into<String>,
        scope: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<(), Error>> + Send,
    {
        let forked = ctx.fork_impersonated();
        let existing = ctx.get::<Impersonated>();
        forked.store(Arc::new(Impersonated::chained(
            existing.as_deref(),
            account_uuid.into(),
        )));
        scope(forked).await
    }
}

/// The active impersonation of a context.
///
/// Shareable: internal calls made inside an impersonation scope stay
/// inside that scope. Not shareable across impersonation: a nested scope
/// records its own extended chain instead.
#[derive(Debug, Clone)]
pub struct Impersonated {
    account_uuid: String,
    account_uuids: Vec<String>,
}

impl ContextValue for Impersonated {
    const SHAREABLE: bool = true;
}

impl Impersonated {
    fn chained(existing: Option<&Impersonated>, account_uuid: String) -> Self {
        let mut account_uuids = existing
            .map(|imp| imp.account_uuids.clone())
            .unwrap_or_default();
        account_uuids.push(account_uuid.clone());
        Self {
            account_uuid,
            account_uuids,
        }
    }

    /// The account currently being impersonated.
    #[must_use]
    pub fn account_uuid(&self) -> &str {
        &self.account_uuid
    }

    /// The full impersonation chain, outermost hop first; the last entry
    /// equals [`account_uuid`](Self::account_uuid).
    #[must_use]
    pub fn traced_account_uuids(&self) -> Vec<String> {
        self.account_uuids.clone()
    }
}
