//! The capability descriptor for values held by a [`Context`](crate::Context).
//!
//! Every type stored in or provided to a context implements
//! [`ContextValue`]. The associated consts replace the marker interfaces a
//! reflective implementation would use: they are read once when the value
//! enters a context and decide whether the value crosses a fork, crosses an
//! impersonation boundary, and whether it participates in finalization.

use crate::error::Error;
use async_trait::async_trait;

/// A value that can live in a context slot.
///
/// The defaults are the safe ones: the value stays inside the context that
/// created it and has no shutdown hook.
///
/// # Sharing
///
/// - `SHAREABLE`: the value is copied into the context forked for an
///   internal [`call_method`](crate::Context::call_method) call. Opt in for
///   values that stay correct when the callee is a *different* method,
///   e.g. a resolved public identity. Authorization results must stay
///   non-shareable so each method re-checks access.
/// - `SHAREABLE_ACROSS_IMPERSONATION`: the value is copied into the context
///   created by an impersonation scope, where calls run *as another
///   account*. This is a separate decision from `SHAREABLE`: an identity
///   cache may safely cross an internal call but never an identity switch.
///
/// # Finalization
///
/// Set `FINALIZABLE` and override [`finalize`](Self::finalize) for values
/// owning resources that must be released when the request ends. Hooks run
/// in reverse creation order; a returned error joins the accumulated list
/// passed to later hooks.
///
/// # Example
///
/// ```
/// use hermes_core::ContextValue;
///
/// struct RequestTrace {
///     id: String,
/// }
///
/// impl ContextValue for RequestTrace {
///     const SHAREABLE: bool = true;
///     const SHAREABLE_ACROSS_IMPERSONATION: bool = true;
/// }
/// ```
#[async_trait]
pub trait ContextValue: Send + Sync + 'static {
    /// Whether the value is copied into contexts forked for internal calls.
    const SHAREABLE: bool = false;

    /// Whether the value is copied into contexts created by an
    /// impersonation scope.
    const SHAREABLE_ACROSS_IMPERSONATION: bool = false;

    /// Whether [`finalize`](Self::finalize) is invoked at context shutdown.
    const FINALIZABLE: bool = false;

    /// Shutdown hook, called with the errors accumulated so far.
    ///
    /// Only invoked when `FINALIZABLE` is set.
    async fn finalize(&self, errors: &[Error]) -> Option<Error> {
        let _ = errors;
        None
    }
}
