//! The per-call value container.
//!
//! A [`Context`] owns every value resolved during one call: stored by the
//! transport (request, metadata, codec), or constructed lazily by the
//! [`Factory`](crate::Factory) on first [`require`](Context::require).
//! Values live in an ordered slot list; finalization walks it in reverse so
//! resources release in the opposite order of their creation.
//!
//! A context is owned by the task driving its call. To hand state to a
//! background task, [`split`](Context::split) a fresh context pre-populated
//! with the currently valid slots and move that instead.

use crate::cancel::Cancellation;
use crate::error::{codes, Error, ErrorData};
use crate::factory::{AnyValue, Factory};
use crate::handler::MethodHandler;
use crate::meta::HttpVerb;
use crate::value::ContextValue;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::{type_name, Any, TypeId};
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

type Finalizer = Arc<
    dyn for<'a> Fn(&'a (dyn Any + Send + Sync), &'a [Error]) -> BoxFuture<'a, Option<Error>>
        + Send
        + Sync,
>;

/// Sharing and finalization behavior of a slot, fixed when the value enters
/// the context.
#[derive(Clone)]
struct Descriptor {
    shareable: bool,
    shareable_across_impersonation: bool,
    finalizer: Option<Finalizer>,
}

fn finalize_value<'a, T: ContextValue>(
    value: &'a (dyn Any + Send + Sync),
    errors: &'a [Error],
) -> BoxFuture<'a, Option<Error>> {
    Box::pin(async move {
        match value.downcast_ref::<T>() {
            Some(value) => value.finalize(errors).await,
            None => None,
        }
    })
}

fn descriptor_of<T: ContextValue>() -> Descriptor {
    Descriptor {
        shareable: T::SHAREABLE,
        shareable_across_impersonation: T::SHAREABLE_ACROSS_IMPERSONATION,
        finalizer: T::FINALIZABLE.then(|| Arc::new(finalize_value::<T>) as Finalizer),
    }
}

/// One entry of the slot list. `value` is `None` while the provider for
/// this type is still running; that in-progress marker is what detects
/// construction cycles.
struct Slot {
    key: TypeId,
    type_name: &'static str,
    value: Option<AnyValue>,
    descriptor: Descriptor,
}

#[derive(Default)]
struct SlotList {
    items: Vec<Slot>,
    finalized: bool,
}

/// The per-call container of typed values.
///
/// # Example
///
/// ```
/// use hermes_core::{Cancellation, Context, ContextValue, Factory};
/// use std::sync::Arc;
///
/// struct Greeting(&'static str);
/// impl ContextValue for Greeting {}
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let ctx = Context::root(Cancellation::new(), Arc::new(Factory::new()), None);
/// ctx.store(Arc::new(Greeting("hello")));
///
/// let greeting = ctx.require::<Greeting>().await.unwrap();
/// assert_eq!(greeting.0, "hello");
/// # });
/// ```
pub struct Context {
    cancel: Cancellation,
    factory: Arc<Factory>,
    methods: Option<Arc<MethodHandler>>,
    slots: Mutex<SlotList>,
}

impl Context {
    /// Creates a root context, as transports do on request arrival.
    #[must_use]
    pub fn root(
        cancel: Cancellation,
        factory: Arc<Factory>,
        methods: Option<Arc<MethodHandler>>,
    ) -> Self {
        Self {
            cancel,
            factory,
            methods,
            slots: Mutex::new(SlotList::default()),
        }
    }

    /// Creates an empty child context sharing this context's factory,
    /// method handler and cancellation.
    #[must_use]
    pub fn fork(&self) -> Self {
        Self::root(
            self.cancel.clone(),
            Arc::clone(&self.factory),
            self.methods.clone(),
        )
    }

    /// Creates an empty context with a different cancellation parent but
    /// the same factory and method handler. Used to detach work from the
    /// lifetime of the incoming request.
    #[must_use]
    pub fn with_parent(&self, cancel: Cancellation) -> Self {
        Self::root(cancel, Arc::clone(&self.factory), self.methods.clone())
    }

    /// Creates a fork pre-populated with every valid slot of this context,
    /// for handing to a background task. In-progress slots are skipped.
    #[must_use]
    pub fn split(&self) -> Self {
        self.fork_filtered(|_| true)
    }

    /// Fork carrying only `SHAREABLE` slots. This is the internal-call
    /// boundary: authorization results and other per-method state stay
    /// behind.
    #[must_use]
    pub fn fork_shared(&self) -> Self {
        self.fork_filtered(|descriptor| descriptor.shareable)
    }

    /// Fork carrying only `SHAREABLE_ACROSS_IMPERSONATION` slots. This is
    /// the impersonation boundary.
    #[must_use]
    pub fn fork_impersonated(&self) -> Self {
        self.fork_filtered(|descriptor| descriptor.shareable_across_impersonation)
    }

    fn fork_filtered(&self, keep: impl Fn(&Descriptor) -> bool) -> Self {
        let forked = self.fork();
        {
            let source = self.slots.lock();
            let mut target = forked.slots.lock();
            for slot in &source.items {
                let Some(value) = &slot.value else {
                    continue;
                };
                if !keep(&slot.descriptor) {
                    continue;
                }
                target.items.push(Slot {
                    key: slot.key,
                    type_name: slot.type_name,
                    value: Some(Arc::clone(value)),
                    descriptor: slot.descriptor.clone(),
                });
            }
        }
        forked
    }

    /// Binds `value` to its type at the tail of the slot list.
    ///
    /// # Panics
    ///
    /// Panics if a value of this type is already present or the context is
    /// finalized; both are wiring bugs in the caller.
    pub fn store<T: ContextValue>(&self, value: Arc<T>) {
        let mut slots = self.slots.lock();
        assert!(!slots.finalized, "context is already finalized");
        assert!(
            !slots.items.iter().any(|slot| slot.key == TypeId::of::<T>()),
            "value of type {} is already stored",
            type_name::<T>()
        );
        slots.items.push(Slot {
            key: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            value: Some(value as AnyValue),
            descriptor: descriptor_of::<T>(),
        });
    }

    /// Returns the value for `T`, constructing it through the factory on
    /// first use.
    ///
    /// Construction may itself call `require` for its dependencies; a value
    /// whose construction recurses onto itself fails with a diagnostic
    /// listing the in-progress chain.
    ///
    /// Not safe for concurrent use from multiple tasks; use
    /// [`split`](Self::split) to move state into another task.
    ///
    /// # Errors
    ///
    /// Fails if the context is finalized, no provider is registered for
    /// `T`, the provider fails, or construction cycles.
    pub async fn require<T: ContextValue>(&self) -> Result<Arc<T>, Error> {
        let key = TypeId::of::<T>();
        {
            let mut slots = self.slots.lock();
            if slots.finalized {
                return Err(finalized_error());
            }
            if let Some(slot) = slots.items.iter().find(|slot| slot.key == key) {
                return match &slot.value {
                    Some(value) => downcast::<T>(Arc::clone(value)),
                    None => Err(cycle_error::<T>(&slots)),
                };
            }
            // In-progress marker: a nested require of T lands on it above.
            slots.items.push(Slot {
                key,
                type_name: type_name::<T>(),
                value: None,
                descriptor: descriptor_of::<T>(),
            });
        }

        let constructed = self.factory.provide(self, key, type_name::<T>()).await;

        let mut slots = self.slots.lock();
        if slots.finalized {
            return Err(finalized_error());
        }
        match constructed {
            Ok(value) => {
                if let Some(slot) = slots.items.iter_mut().find(|slot| slot.key == key) {
                    slot.value = Some(Arc::clone(&value));
                }
                downcast::<T>(value)
            }
            Err(err) => {
                // Drop the marker so the failure does not read as a cycle
                // on a later require.
                slots
                    .items
                    .retain(|slot| !(slot.key == key && slot.value.is_none()));
                Err(err)
            }
        }
    }

    /// Returns the already-present value for `T` without constructing.
    ///
    /// Useful for providers that adapt to previously resolved state, like
    /// an identity cache checking whether authorization already ran.
    #[must_use]
    pub fn get<T: ContextValue>(&self) -> Option<Arc<T>> {
        let slots = self.slots.lock();
        if slots.finalized {
            return None;
        }
        slots
            .items
            .iter()
            .find(|slot| slot.key == TypeId::of::<T>())
            .and_then(|slot| slot.value.clone())
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// Drops the slot for `T`, forcing the next `require` to construct a
    /// fresh value. Used after a login or identity change invalidates
    /// cached identity values.
    pub fn invalidate<T: ContextValue>(&self) {
        self.invalidate_types(&[TypeId::of::<T>()]);
    }

    /// Drops the slots for all listed type identities at once.
    pub fn invalidate_types(&self, types: &[TypeId]) {
        let mut slots = self.slots.lock();
        slots.items.retain(|slot| !types.contains(&slot.key));
    }

    /// Single-shot shutdown: runs the finalize hook of every valid slot in
    /// reverse creation order, then clears the slot list.
    ///
    /// A second call is a no-op returning `inbound` unchanged. The return
    /// value collapses the accumulated errors: none → `None`; only the
    /// inbound error → `inbound`; anything else → one *internal* error
    /// carrying the full list.
    pub async fn finalize(&self, inbound: Option<Error>) -> Option<Error> {
        let taken = {
            let mut slots = self.slots.lock();
            if slots.finalized {
                return inbound;
            }
            slots.finalized = true;
            std::mem::take(&mut slots.items)
        };

        let mut errors: Vec<Error> = inbound.clone().into_iter().collect();
        for slot in taken.iter().rev() {
            let (Some(value), Some(finalizer)) = (&slot.value, &slot.descriptor.finalizer) else {
                continue;
            };
            if let Some(err) = finalizer(value.as_ref(), &errors).await {
                errors.push(err);
            }
        }

        match (errors.len(), &inbound) {
            (0, _) => None,
            (1, Some(original)) if errors[0] == *original => inbound,
            _ => {
                let debug = self
                    .methods
                    .as_ref()
                    .map(|methods| methods.secret().encode("context: finalization failed"));
                Some(Error::internal().clone_with_data(ErrorData {
                    details: errors,
                    debug,
                    ..ErrorData::default()
                }))
            }
        }
    }

    /// Dispatches a nested call to another endpoint.
    ///
    /// The callee runs in a fork of this context carrying only `SHAREABLE`
    /// slots and its own `RpcMeta` with source `internal`, so identity and
    /// authorization are re-evaluated against the callee method. The fork
    /// is finalized before this returns.
    ///
    /// # Errors
    ///
    /// Fails with whatever the callee fails with, or with *internal* when
    /// this context has no method handler attached.
    pub async fn call_method<P: Serialize + ?Sized>(
        &self,
        method: &str,
        verb: HttpVerb,
        payload: &P,
    ) -> Result<Option<serde_json::Value>, Error> {
        let Some(methods) = self.methods.clone() else {
            return Err(Error::new(
                codes::INTERNAL,
                "context has no method handler attached",
            ));
        };
        let payload = serde_json::to_value(payload)
            .map_err(|err| Error::new(codes::INTERNAL, format!("payload not serializable: {err}")))?;
        methods.call_internal(self, method, verb, payload).await
    }

    /// The cancellation handle inherited from the transport.
    #[must_use]
    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    /// Returns `true` once the parent cancellation fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes when the parent cancellation fires.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// The deadline of the parent cancellation handle, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.cancel.deadline()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        let names: Vec<_> = slots.items.iter().map(|slot| slot.type_name).collect();
        f.debug_struct("Context")
            .field("slots", &names)
            .field("finalized", &slots.finalized)
            .finish()
    }
}

fn finalized_error() -> Error {
    Error::new(codes::INTERNAL, "context is already finalized")
}

fn downcast<T: ContextValue>(value: AnyValue) -> Result<Arc<T>, Error> {
    value.downcast::<T>().map_err(|_| {
        Error::new(
            codes::INTERNAL,
            format!("provider returned a value that is not {}", type_name::<T>()),
        )
    })
}

fn cycle_error<T: ContextValue>(slots: &SlotList) -> Error {
    let chain: Vec<&str> = slots
        .items
        .iter()
        .filter(|slot| slot.value.is_none())
        .map(|slot| slot.type_name)
        .collect();
    Error::new(
        codes::INTERNAL,
        format!(
            "recursion loop while resolving {}:\n{}\n{}",
            type_name::<T>(),
            chain.join("\n--> "),
            Backtrace::force_capture()
        ),
    )
}
