//! The in-memory auth backend used by service tests.

use async_trait::async_trait;
use hermes_auth::{AuthClient, Impersonated};
use hermes_core::{Context, ContextValue, Error, ErrorData, HttpVerb, RpcMeta};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One method an account is allowed to call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodAccess {
    /// The endpoint key.
    pub method: String,
    /// The verb the access is granted for.
    pub verb: HttpVerb,
}

impl MethodAccess {
    /// Grants `method` over `verb`.
    #[must_use]
    pub fn new(method: impl Into<String>, verb: HttpVerb) -> Self {
        Self {
            method: method.into(),
            verb,
        }
    }
}

#[derive(Default)]
struct MockState {
    method_access: HashMap<String, Vec<MethodAccess>>,
    full_access: HashSet<String>,
    authenticated: HashSet<String>,
    can_impersonate: HashMap<String, HashSet<String>>,
    accounts: HashSet<String>,
}

/// An in-memory [`AuthClient`].
///
/// The caller's identity travels inside the context: tests attach an
/// account with [`Account::provide`], the same way production attaches
/// request credentials, and the mock reads it back on every check.
#[derive(Default)]
pub struct AuthClientMock {
    state: Arc<Mutex<MockState>>,
}

impl AuthClientMock {
    /// Creates an empty mock: nobody is authenticated, nobody may call
    /// anything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an account handle for the given uuid.
    ///
    /// # Panics
    ///
    /// Panics when the same uuid is created twice; reuse the first handle
    /// instead.
    #[must_use]
    pub fn new_account(&self, uuid: impl Into<String>) -> Account {
        let uuid = uuid.into();
        let mut state = self.state.lock();
        assert!(
            state.accounts.insert(uuid.clone()),
            "auth mock: account {uuid} created twice"
        );
        Account {
            uuid,
            state: Arc::clone(&self.state),
        }
    }

    /// Walks the impersonation chain of `ctx`, verifying each hop was
    /// permitted. Returns the effective account: the impersonated one, or
    /// `main_account` without impersonation.
    fn check_impersonation(
        &self,
        ctx: &Context,
        main_account: &str,
    ) -> Result<Option<String>, Error> {
        let Some(impersonated) = ctx.get::<Impersonated>() else {
            return Ok(Some(main_account.to_string()));
        };

        let mut chain = vec![main_account.to_string()];
        chain.extend(impersonated.traced_account_uuids());

        let state = self.state.lock();
        for hop in chain.windows(2) {
            let allowed = state
                .can_impersonate
                .get(&hop[0])
                .is_some_and(|targets| targets.contains(&hop[1]));
            if !allowed {
                return Err(Error::unauthorized().clone_with_data(ErrorData {
                    debug: Some(format!(
                        "account '{}' cannot impersonate account '{}'; did you forget to call can_impersonate()?",
                        hop[0], hop[1]
                    )),
                    ..ErrorData::default()
                }));
            }
        }
        Ok(Some(impersonated.account_uuid().to_string()))
    }
}

#[async_trait]
impl AuthClient for AuthClientMock {
    async fn is_authenticated(&self, ctx: &Context) -> Result<Option<String>, Error> {
        let Some(account) = ctx.get::<TestAccount>() else {
            return Ok(None);
        };
        if !self.state.lock().authenticated.contains(account.uuid()) {
            return Ok(None);
        }
        self.check_impersonation(ctx, account.uuid())
    }

    async fn is_authorized(&self, ctx: &Context) -> Result<Option<String>, Error> {
        let Some(account) = ctx.get::<TestAccount>() else {
            return Ok(None);
        };
        let Some(uuid) = self.check_impersonation(ctx, account.uuid())? else {
            return Ok(None);
        };

        if self.state.lock().full_access.contains(&uuid) {
            return Ok(Some(uuid));
        }

        let meta = ctx.require::<RpcMeta>().await?;
        let state = self.state.lock();
        let granted = state.method_access.get(&uuid).is_some_and(|grants| {
            grants
                .iter()
                .any(|grant| grant.method == meta.method() && grant.verb == meta.http_verb())
        });
        Ok(granted.then_some(uuid))
    }
}

/// A fluent handle configuring one mock account.
pub struct Account {
    uuid: String,
    state: Arc<Mutex<MockState>>,
}

impl Account {
    /// The account's uuid.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Marks the account as authenticated (logged in).
    pub fn authenticated(&self) -> &Self {
        self.state.lock().authenticated.insert(self.uuid.clone());
        self
    }

    /// Revokes the account's session.
    pub fn logged_out(&self) -> &Self {
        self.state.lock().authenticated.remove(&self.uuid);
        self
    }

    /// Authorizes the account for every method. Implies authentication.
    ///
    /// # Panics
    ///
    /// Panics when mixed with per-method grants.
    pub fn authorized_all(&self) -> &Self {
        self.authenticated();
        let mut state = self.state.lock();
        assert!(
            !state.method_access.contains_key(&self.uuid),
            "auth mock: do not mix full and per-method access for {}",
            self.uuid
        );
        state.full_access.insert(self.uuid.clone());
        self
    }

    /// Authorizes the account for the listed methods only. Implies
    /// authentication.
    ///
    /// # Panics
    ///
    /// Panics when mixed with [`authorized_all`](Self::authorized_all).
    pub fn authorized(&self, methods: impl IntoIterator<Item = MethodAccess>) -> &Self {
        self.authenticated();
        let mut state = self.state.lock();
        assert!(
            !state.full_access.contains(&self.uuid),
            "auth mock: do not mix full and per-method access for {}",
            self.uuid
        );
        state
            .method_access
            .entry(self.uuid.clone())
            .or_default()
            .extend(methods);
        self
    }

    /// Allows this account to impersonate the given accounts. Cumulative
    /// over multiple calls.
    pub fn can_impersonate(&self, accounts: &[&Account]) -> &Self {
        let mut state = self.state.lock();
        let targets = state
            .can_impersonate
            .entry(self.uuid.clone())
            .or_default();
        for account in accounts {
            targets.insert(account.uuid.clone());
        }
        self
    }

    /// Attaches this account's identity to a context, like request
    /// credentials would in production.
    pub fn provide(&self, ctx: &Context) {
        ctx.store(Arc::new(TestAccount {
            uuid: self.uuid.clone(),
        }));
    }
}

/// The identity value [`Account::provide`] stores into contexts.
///
/// Shareable both ways, like the credential headers it stands in for.
#[derive(Debug, Clone)]
pub struct TestAccount {
    uuid: String,
}

impl ContextValue for TestAccount {
    const SHAREABLE: bool = true;
    const SHAREABLE_ACROSS_IMPERSONATION: bool = true;
}

impl TestAccount {
    /// The attached account's uuid.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }
}
