//! The provider registry.
//!
//! A [`Factory`] maps a type to the constructor that builds it on first
//! [`require`](crate::Context::require). Constructors come in two shapes,
//! mirroring how applications organize them:
//!
//! - **bare function**: an `async fn(&Context) -> Result<Arc<T>, Error>`
//!   registered with [`Factory::bind`];
//! - **member constructor**: an async method on a long-lived provider
//!   object (a database pool, an auth client wrapper) registered with
//!   [`Factory::bind_member`], usually from a [`ProviderSet::register`]
//!   implementation.
//!
//! The registry is written only during setup and must be frozen (wrapped in
//! an `Arc`) before serving starts.

use crate::context::Context;
use crate::error::Error;
use crate::value::ContextValue;
use futures::future::BoxFuture;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Type-erased value as held by context slots.
pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;

type ConstructFn =
    Arc<dyn for<'a> Fn(&'a Context) -> BoxFuture<'a, Result<AnyValue, Error>> + Send + Sync>;

struct Binding {
    type_name: &'static str,
    construct: ConstructFn,
}

/// A bare provider function: `async fn(&Context) -> Result<Arc<T>, Error>`.
///
/// Implemented automatically for plain `async fn`s; a closure works too if
/// it explicitly returns a [`BoxFuture`].
pub trait ProviderFn<'a, T>: Send + Sync + 'static {
    /// The constructor future.
    type Future: Future<Output = Result<Arc<T>, Error>> + Send + 'a;

    /// Builds the value.
    fn call(&self, ctx: &'a Context) -> Self::Future;
}

impl<'a, T, F, Fut> ProviderFn<'a, T> for F
where
    F: Fn(&'a Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Arc<T>, Error>> + Send + 'a,
{
    type Future = Fut;

    fn call(&self, ctx: &'a Context) -> Fut {
        (self)(ctx)
    }
}

/// A member constructor: `async fn(&self, &Context) -> Result<Arc<T>, Error>`
/// on a provider object `P`.
pub trait MemberProviderFn<'a, P: 'a, T>: Send + Sync + 'static {
    /// The constructor future.
    type Future: Future<Output = Result<Arc<T>, Error>> + Send + 'a;

    /// Builds the value on behalf of `receiver`.
    fn call(&self, receiver: &'a P, ctx: &'a Context) -> Self::Future;
}

impl<'a, P: 'a, T, F, Fut> MemberProviderFn<'a, P, T> for F
where
    F: Fn(&'a P, &'a Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Arc<T>, Error>> + Send + 'a,
{
    type Future = Fut;

    fn call(&self, receiver: &'a P, ctx: &'a Context) -> Fut {
        (self)(receiver, ctx)
    }
}

/// A provider object contributing one binding per member constructor.
///
/// # Example
///
/// ```
/// use hermes_core::{Context, ContextValue, Error, Factory, ProviderSet};
/// use std::sync::Arc;
///
/// struct Counter;
/// impl ContextValue for Counter {}
///
/// struct CounterProvider;
///
/// impl CounterProvider {
///     async fn new_counter(&self, _ctx: &Context) -> Result<Arc<Counter>, Error> {
///         Ok(Arc::new(Counter))
///     }
/// }
///
/// impl ProviderSet for CounterProvider {
///     fn register(self: Arc<Self>, factory: &mut Factory) {
///         factory.bind_member(&self, CounterProvider::new_counter);
///     }
/// }
///
/// let mut factory = Factory::new();
/// factory.install(CounterProvider);
/// ```
pub trait ProviderSet: Send + Sync + Sized + 'static {
    /// Binds every constructor this set contributes.
    fn register(self: Arc<Self>, factory: &mut Factory);
}

/// The provider registry.
#[derive(Default)]
pub struct Factory {
    bindings: HashMap<TypeId, Binding>,
}

impl Factory {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    /// Registers a bare provider function for `T`.
    ///
    /// # Panics
    ///
    /// Panics if a provider for `T` is already registered. Registration
    /// runs at setup time; a duplicate is a wiring bug.
    pub fn bind<T, F>(&mut self, provider: F)
    where
        T: ContextValue,
        F: for<'a> ProviderFn<'a, T> + Clone,
    {
        let construct: ConstructFn = Arc::new(move |ctx: &Context| {
            let provider = provider.clone();
            Box::pin(async move {
                let value = provider.call(ctx).await?;
                Ok(value as AnyValue)
            })
        });
        self.insert::<T>(construct);
    }

    /// Registers a member constructor for `T`, bound to `receiver`.
    ///
    /// # Panics
    ///
    /// Panics if a provider for `T` is already registered.
    pub fn bind_member<P, T, F>(&mut self, receiver: &Arc<P>, method: F)
    where
        P: Send + Sync + 'static,
        T: ContextValue,
        F: for<'a> MemberProviderFn<'a, P, T> + Clone,
    {
        let receiver = Arc::clone(receiver);
        let construct: ConstructFn = Arc::new(move |ctx: &Context| {
            let receiver = Arc::clone(&receiver);
            let method = method.clone();
            Box::pin(async move {
                let value = method.call(&receiver, ctx).await?;
                Ok(value as AnyValue)
            })
        });
        self.insert::<T>(construct);
    }

    /// Installs a [`ProviderSet`], letting it bind all of its constructors.
    pub fn install<P: ProviderSet>(&mut self, set: P) {
        Arc::new(set).register(self);
    }

    /// Invokes the constructor bound for `key`.
    ///
    /// # Errors
    ///
    /// Fails if no provider is registered for the requested type, or with
    /// whatever error the constructor itself returns.
    pub async fn provide(
        &self,
        ctx: &Context,
        key: TypeId,
        requested: &'static str,
    ) -> Result<AnyValue, Error> {
        let Some(binding) = self.bindings.get(&key) else {
            return Err(Error::new(
                crate::codes::INTERNAL,
                format!("factory: unknown provider type requested: {requested}"),
            ));
        };
        (binding.construct)(ctx).await
    }

    /// Returns the registered type identities.
    #[must_use]
    pub fn types(&self) -> Vec<TypeId> {
        self.bindings.keys().copied().collect()
    }

    /// Returns `true` if a provider for `key` is registered.
    #[must_use]
    pub fn contains(&self, key: TypeId) -> bool {
        self.bindings.contains_key(&key)
    }

    /// Returns the number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` if no providers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn insert<T: ContextValue>(&mut self, construct: ConstructFn) {
        let previous = self.bindings.insert(
            TypeId::of::<T>(),
            Binding {
                type_name: type_name::<T>(),
                construct,
            },
        );
        assert!(
            previous.is_none(),
            "factory: provider for type {} already exists",
            type_name::<T>()
        );
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.bindings.values().map(|b| b.type_name).collect();
        names.sort_unstable();
        f.debug_struct("Factory").field("providers", &names).finish()
    }
}
