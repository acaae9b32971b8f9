//! Method parameter containers.
//!
//! The trailing argument of a method may be a params struct decoded from
//! the request `params` member. Decoding is strict by default: unknown
//! fields reject the call with *invalid-params*. A type opts out with
//! [`Params::ALLOW_UNKNOWN`] and opts into field validation with
//! [`Params::VALIDATED`] plus a [`Validate`] implementation.

use crate::context::Context;
use crate::error::Error;
use crate::secret::Secret;
use crate::validate::Validator;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use std::sync::Arc;

/// Field-level validation over a value's own rules.
///
/// Nested values implement this too; the validator prefixes their faults
/// with the surrounding path.
///
/// ```
/// use async_trait::async_trait;
/// use hermes_core::{Validate, Validator};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Image {
///     url: String,
/// }
///
/// #[async_trait]
/// impl Validate for Image {
///     async fn validate(&self, v: &mut Validator<'_>) {
///         if self.url.is_empty() {
///             v.fault(["url"]).message("url too short");
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Validate: Send + Sync {
    /// Reports every fault of this value to the collector.
    async fn validate(&self, v: &mut Validator<'_>) {
        let _ = v;
    }
}

/// The params container decoded from the request `params`.
///
/// ```
/// use async_trait::async_trait;
/// use hermes_core::{Params, Validate, Validator};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct GetProfileV1Params {
///     uuid: String,
/// }
///
/// #[async_trait]
/// impl Validate for GetProfileV1Params {
///     async fn validate(&self, v: &mut Validator<'_>) {
///         if self.uuid.len() != 36 {
///             v.fault(["uuid"]).message("uuid invalid");
///         }
///     }
/// }
///
/// impl Params for GetProfileV1Params {
///     const VALIDATED: bool = true;
/// }
/// ```
pub trait Params: DeserializeOwned + Validate + Send + Sync + 'static {
    /// Accept and silently drop unknown JSON fields for this type.
    const ALLOW_UNKNOWN: bool = false;

    /// Marks the [`Validate`] implementation as real. Registering a params
    /// type without it raises the configured missing-validation severity.
    const VALIDATED: bool = false;
}

/// Decodes and validates the raw request params into `P`.
///
/// Strict by default: unknown fields reject the call. All failures come
/// back as *invalid-params* with the decode diagnostic in the encrypted
/// debug field, or with one detail per faulted path after validation.
///
/// # Errors
///
/// Fails on missing params, malformed JSON, unknown fields (unless
/// `P::ALLOW_UNKNOWN`), or validation faults.
pub async fn decode_params<P: Params>(
    ctx: &Context,
    secret: &Arc<Secret>,
    raw: Option<&RawValue>,
) -> Result<P, Error> {
    let Some(raw) = raw else {
        return Err(Error::invalid_params().with_debug(secret, "missing params"));
    };

    let mut unknown = Vec::new();
    let mut deserializer = serde_json::Deserializer::from_str(raw.get());
    let value: P =
        serde_ignored::deserialize(&mut deserializer, |path| unknown.push(path.to_string()))
            .map_err(|err| Error::invalid_params().with_debug(secret, &err.to_string()))?;

    if !P::ALLOW_UNKNOWN && !unknown.is_empty() {
        return Err(Error::invalid_params().with_debug(
            secret,
            &format!("unknown fields: {}", unknown.join(", ")),
        ));
    }

    let mut validator = Validator::new(ctx, Arc::clone(secret));
    value.validate(&mut validator).await;
    if let Some(err) = validator.into_error() {
        return Err(err);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::Factory;
    use crate::Cancellation;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Strict {
        x: i64,
    }

    #[async_trait]
    impl Validate for Strict {}
    impl Params for Strict {}

    #[derive(Debug, Deserialize)]
    struct Lenient {
        x: i64,
    }

    #[async_trait]
    impl Validate for Lenient {}
    impl Params for Lenient {
        const ALLOW_UNKNOWN: bool = true;
    }

    #[derive(Debug, Deserialize)]
    struct Checked {
        uuid: String,
    }

    #[async_trait]
    impl Validate for Checked {
        async fn validate(&self, v: &mut Validator<'_>) {
            if self.uuid.len() != 36 {
                v.fault(["uuid"]).message("uuid invalid");
            }
        }
    }

    impl Params for Checked {
        const VALIDATED: bool = true;
    }

    fn test_context() -> (Context, Arc<Secret>) {
        let ctx = Context::root(Cancellation::new(), Arc::new(Factory::new()), None);
        (ctx, Arc::new(Secret::debug()))
    }

    fn raw(json: &str) -> Box<RawValue> {
        RawValue::from_string(json.to_string()).expect("valid json")
    }

    #[tokio::test]
    async fn test_decode_strict_accepts_known_fields() {
        let (ctx, secret) = test_context();
        let input = raw(r#"{"x":1}"#);
        let decoded: Strict = decode_params(&ctx, &secret, Some(&input))
            .await
            .expect("decodes");
        assert_eq!(decoded, Strict { x: 1 });
    }

    #[tokio::test]
    async fn test_decode_strict_rejects_unknown_fields() {
        let (ctx, secret) = test_context();
        let input = raw(r#"{"x":1,"extra":true}"#);
        let err = decode_params::<Strict>(&ctx, &secret, Some(&input))
            .await
            .expect_err("must reject");
        assert_eq!(err.code, crate::codes::INVALID_PARAMS);
        assert!(err.data.unwrap().debug.unwrap().contains("extra"));
    }

    #[tokio::test]
    async fn test_decode_lenient_ignores_unknown_fields() {
        let (ctx, secret) = test_context();
        let input = raw(r#"{"x":2,"extra":true}"#);
        let decoded: Lenient = decode_params(&ctx, &secret, Some(&input))
            .await
            .expect("decodes");
        assert_eq!(decoded.x, 2);
    }

    #[tokio::test]
    async fn test_decode_missing_params_fails() {
        let (ctx, secret) = test_context();
        let err = decode_params::<Strict>(&ctx, &secret, None)
            .await
            .expect_err("must reject");
        assert_eq!(err.code, crate::codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_decode_malformed_params_fails() {
        let (ctx, secret) = test_context();
        let input = raw(r#""not an object""#);
        let err = decode_params::<Strict>(&ctx, &secret, Some(&input))
            .await
            .expect_err("must reject");
        assert_eq!(err.code, crate::codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_decode_runs_validation() {
        let (ctx, secret) = test_context();
        let input = raw(r#"{"uuid":"not-36-chars"}"#);
        let err = decode_params::<Checked>(&ctx, &secret, Some(&input))
            .await
            .expect_err("must reject");
        assert_eq!(err.code, crate::codes::INVALID_PARAMS);
        let details = &err.data.expect("data").details;
        assert_eq!(details[0].data.as_ref().unwrap().path, vec!["uuid"]);
    }

    #[tokio::test]
    async fn test_decode_valid_params_pass_validation() {
        let (ctx, secret) = test_context();
        let uuid = "d69b8e2c-3e72-47fe-9c06-5113d03e7d59";
        let input = raw(&format!(r#"{{"uuid":"{uuid}"}}"#));
        let decoded: Checked = decode_params(&ctx, &secret, Some(&input))
            .await
            .expect("decodes");
        assert_eq!(decoded.uuid, uuid);
    }
}
