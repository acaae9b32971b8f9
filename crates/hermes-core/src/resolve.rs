//! Resolution of provider-driven method arguments.
//!
//! Every positional argument of a registered method except the trailing
//! params struct resolves through [`Resolve`]: `Arc<T>` arguments pull `T`
//! from the context (constructing through the factory on first use), and
//! guard types like [`HttpGet`](crate::HttpGet) enforce call preconditions.

use crate::context::Context;
use crate::error::Error;
use crate::value::ContextValue;
use futures::future::BoxFuture;
use std::sync::Arc;

/// A method argument resolvable from a [`Context`].
pub trait Resolve: Sized + Send {
    /// Resolves the argument, failing the call on error.
    fn resolve(ctx: &Context) -> BoxFuture<'_, Result<Self, Error>>;
}

impl<T: ContextValue> Resolve for Arc<T> {
    fn resolve(ctx: &Context) -> BoxFuture<'_, Result<Self, Error>> {
        Box::pin(ctx.require::<T>())
    }
}

/// A tuple of provider-driven arguments, resolved left to right.
///
/// Resolution order matters: it is the construction order of lazily built
/// values, and therefore the reverse of their finalization order.
pub trait ArgList: Sized + Send {
    /// Resolves every argument in declaration order.
    fn resolve(ctx: &Context) -> BoxFuture<'_, Result<Self, Error>>;
}

impl ArgList for () {
    fn resolve(_ctx: &Context) -> BoxFuture<'_, Result<Self, Error>> {
        Box::pin(async { Ok(()) })
    }
}

macro_rules! impl_arg_list {
    ($($arg:ident),+) => {
        impl<$($arg: Resolve),+> ArgList for ($($arg,)+) {
            fn resolve(ctx: &Context) -> BoxFuture<'_, Result<Self, Error>> {
                Box::pin(async move {
                    Ok(($($arg::resolve(ctx).await?,)+))
                })
            }
        }
    };
}

impl_arg_list!(A1);
impl_arg_list!(A1, A2);
impl_arg_list!(A1, A2, A3);
impl_arg_list!(A1, A2, A3, A4);
impl_arg_list!(A1, A2, A3, A4, A5);
impl_arg_list!(A1, A2, A3, A4, A5, A6);
