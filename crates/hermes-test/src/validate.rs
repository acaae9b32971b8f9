//! One-line validation tests for params types.

use hermes_core::{validate_value, Cancellation, Context, Error, Factory, Secret, Validate};
use std::sync::Arc;

/// Validates `params` in a throwaway context, returning the folded
/// *invalid-params* error if any path faulted.
///
/// ```ignore
/// let err = validate_params(&GetProfileV1Params {
///     uuid: "not-36-chars".to_string(),
/// })
/// .await
/// .expect("must fault");
/// assert!(err.inspect().path(["uuid"]).find_first().is_some());
/// ```
pub async fn validate_params<V: Validate>(params: &V) -> Option<Error> {
    let ctx = Context::root(Cancellation::new(), Arc::new(Factory::new()), None);
    validate_params_in(&ctx, params).await
}

/// Like [`validate_params`], but runs inside the given context so
/// validation rules can require provided values (clock, config).
pub async fn validate_params_in<V: Validate>(ctx: &Context, params: &V) -> Option<Error> {
    validate_value(ctx, &Arc::new(Secret::debug()), params).await
}
