//! The per-field fault collector driving params validation.
//!
//! A params type describes its own rules in [`Validate::validate`]
//! (see [`crate::params`]); the [`Validator`] collects one error per
//! faulted path and folds them into a single *invalid-params* error whose
//! `details` enumerate every fault.

use crate::context::Context;
use crate::error::{codes, Error, ErrorData};
use crate::params::Validate;
use crate::secret::Secret;
use std::sync::Arc;

/// Collects validation faults for one value.
pub struct Validator<'a> {
    ctx: &'a Context,
    secret: Arc<Secret>,
    prefix: Vec<String>,
    errors: Vec<Error>,
}

impl<'a> Validator<'a> {
    /// Creates a collector bound to the call's context and debug codec.
    #[must_use]
    pub fn new(ctx: &'a Context, secret: Arc<Secret>) -> Self {
        Self {
            ctx,
            secret,
            prefix: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// The context of the call being validated. Validation rules may read
    /// previously resolved values, e.g. the clock for date checks.
    #[must_use]
    pub fn context(&self) -> &'a Context {
        self.ctx
    }

    /// Renders an array index as a path segment: `[N]`.
    #[must_use]
    pub fn index(index: usize) -> String {
        format!("[{index}]")
    }

    /// Starts a fault at the given path, relative to the current nesting.
    ///
    /// The fault is recorded once [`Fault::message`] is called:
    ///
    /// ```ignore
    /// v.fault(["name"]).code(-1).debug("raw value").message("name too long");
    /// ```
    pub fn fault<I, S>(&mut self, path: I) -> Fault<'_, 'a>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = path.into_iter().map(Into::into).collect();
        Fault {
            validator: self,
            path,
            code: codes::INVALID_PARAMS,
            debug: None,
        }
    }

    /// Recurses into a nested value, prefixing its faults with `path`.
    pub async fn nested<I, S, V>(&mut self, path: I, value: &V)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        V: Validate + ?Sized,
    {
        let depth = self.prefix.len();
        self.prefix.extend(path.into_iter().map(Into::into));
        value.validate(self).await;
        self.prefix.truncate(depth);
    }

    /// Returns `true` if no fault was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Folds the collected faults into a single *invalid-params* error,
    /// or `None` when no path was faulted.
    #[must_use]
    pub fn into_error(self) -> Option<Error> {
        if self.errors.is_empty() {
            return None;
        }
        Some(Error::invalid_params().clone_with_data(ErrorData {
            details: self.errors,
            ..ErrorData::default()
        }))
    }
}

/// A single fault under construction. Dropping it without calling
/// [`message`](Self::message) records nothing.
pub struct Fault<'v, 'a> {
    validator: &'v mut Validator<'a>,
    path: Vec<String>,
    code: i64,
    debug: Option<String>,
}

impl Fault<'_, '_> {
    /// Overrides the fault's error code. Defaults to *invalid-params*.
    #[must_use]
    pub fn code(mut self, code: i64) -> Self {
        self.code = code;
        self
    }

    /// Attaches an encrypted debug string to the fault.
    #[must_use]
    pub fn debug(mut self, debug: &str) -> Self {
        self.debug = Some(self.validator.secret.encode(debug));
        self
    }

    /// Commits the fault with a literal message.
    pub fn message(self, message: impl Into<String>) {
        let mut path = self.validator.prefix.clone();
        path.extend(self.path);
        self.validator.errors.push(
            Error::new(self.code, message).clone_with_data(ErrorData {
                path,
                debug: self.debug,
                ..ErrorData::default()
            }),
        );
    }
}

/// Validates a standalone value, returning the folded error if any path
/// faulted.
pub async fn validate_value<V>(ctx: &Context, secret: &Arc<Secret>, value: &V) -> Option<Error>
where
    V: Validate + ?Sized,
{
    let mut validator = Validator::new(ctx, Arc::clone(secret));
    value.validate(&mut validator).await;
    validator.into_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::Factory;
    use crate::time::{Clock, TimeProvider};
    use crate::Cancellation;
    use async_trait::async_trait;

    struct Image {
        url: String,
        uuid: String,
    }

    #[async_trait]
    impl Validate for Image {
        async fn validate(&self, v: &mut Validator<'_>) {
            if self.url.is_empty() {
                v.fault(["url"]).message("url too short");
            }
            if self.url.len() > 20 {
                v.fault(["url"]).message("url too long");
            }
            if self.uuid.len() != 36 {
                v.fault(["uuid"]).message("uuid invalid");
            }
        }
    }

    struct Profile {
        name: String,
        image: Option<Image>,
        images: Vec<Image>,
        birthday_ts: i64,
    }

    #[async_trait]
    impl Validate for Profile {
        async fn validate(&self, v: &mut Validator<'_>) {
            if self.name.len() < 2 || self.name.len() > 10 {
                v.fault(["name"])
                    .code(-1)
                    .debug("secret debug message")
                    .message("name len between 2 and 10 chars");
            }
            if let Some(image) = &self.image {
                v.nested(["image"], image).await;
            }
            for (idx, image) in self.images.iter().enumerate() {
                v.nested(["images".to_string(), Validator::index(idx)], image)
                    .await;
            }
            let now = v
                .context()
                .require::<Clock>()
                .await
                .map(|clock| clock.now_unix())
                .unwrap_or_default();
            if self.birthday_ts < now {
                v.fault(["birthdayTs"])
                    .message(format!("birthday before or equal timestamp, got: {now}"));
            }
        }
    }

    fn valid_image() -> Image {
        Image {
            url: "https://example.com".to_string(),
            uuid: "d69b8e2c-3e72-47fe-9c06-5113d03e7d59".to_string(),
        }
    }

    fn valid_profile() -> Profile {
        Profile {
            name: "Silvio".to_string(),
            image: Some(valid_image()),
            images: vec![valid_image(), valid_image()],
            birthday_ts: 1001,
        }
    }

    fn clock_context() -> (Context, Arc<Secret>) {
        let mut factory = Factory::new();
        factory.install(TimeProvider::fixed(1000));
        let ctx = Context::root(Cancellation::new(), Arc::new(factory), None);
        (ctx, Arc::new(Secret::debug()))
    }

    #[tokio::test]
    async fn test_valid_profile_has_no_error() {
        let (ctx, secret) = clock_context();
        assert!(validate_value(&ctx, &secret, &valid_profile()).await.is_none());
    }

    #[tokio::test]
    async fn test_fault_carries_code_and_debug() {
        let (ctx, secret) = clock_context();
        let mut profile = valid_profile();
        profile.name = "a".repeat(11);

        let err = validate_value(&ctx, &secret, &profile).await.expect("error");
        assert_eq!(err.code, codes::INVALID_PARAMS);
        let detail = &err.data.expect("data").details[0];
        assert_eq!(detail.code, -1);
        assert_eq!(detail.data.as_ref().unwrap().path, vec!["name"]);
        assert_eq!(
            detail.data.as_ref().unwrap().debug.as_deref(),
            Some("secret debug message")
        );
    }

    #[tokio::test]
    async fn test_validation_reads_context_values() {
        let (ctx, secret) = clock_context();
        let mut profile = valid_profile();
        profile.birthday_ts = 0;

        let err = validate_value(&ctx, &secret, &profile).await.expect("error");
        let detail = err
            .inspect()
            .code(codes::INVALID_PARAMS)
            .path(["birthdayTs"])
            .find_one()
            .expect("single birthday fault");
        assert_eq!(
            detail.message,
            "birthday before or equal timestamp, got: 1000"
        );
    }

    #[tokio::test]
    async fn test_nested_faults_are_prefixed() {
        let (ctx, secret) = clock_context();
        let mut profile = valid_profile();
        profile.image.as_mut().unwrap().url = String::new();

        let err = validate_value(&ctx, &secret, &profile).await.expect("error");
        let detail = &err.data.expect("data").details[0];
        assert_eq!(detail.data.as_ref().unwrap().path, vec!["image", "url"]);
    }

    #[tokio::test]
    async fn test_indexed_faults_render_brackets() {
        let (ctx, secret) = clock_context();
        let mut profile = valid_profile();
        profile.images[1].url = String::new();

        let err = validate_value(&ctx, &secret, &profile).await.expect("error");
        let detail = &err.data.expect("data").details[0];
        assert_eq!(
            detail.data.as_ref().unwrap().path,
            vec!["images", "[1]", "url"]
        );
    }

    #[tokio::test]
    async fn test_multiple_faults_are_all_collected() {
        let (ctx, secret) = clock_context();
        let mut profile = valid_profile();
        profile.name = "x".to_string();
        profile.images[0].uuid = "short".to_string();

        let err = validate_value(&ctx, &secret, &profile).await.expect("error");
        assert_eq!(err.data.expect("data").details.len(), 2);
    }

    #[tokio::test]
    async fn test_dropped_fault_records_nothing() {
        let (ctx, secret) = clock_context();
        let mut validator = Validator::new(&ctx, secret);
        let _ = validator.fault(["name"]).code(-1);
        assert!(validator.is_empty());
        assert!(validator.into_error().is_none());
    }
}
