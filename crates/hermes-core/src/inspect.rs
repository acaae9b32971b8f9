//! Structured search over [`Error`] trees.
//!
//! Validation and finalization fold many sub-errors into a single error
//! whose `data.details` nest arbitrarily deep. [`Inspector`] walks that
//! tree depth-first and filters by code, message, and exact path, so tests
//! and callers can assert on specific faults without string matching.

use crate::error::Error;

/// A composable query over an [`Error`] and its nested details.
///
/// All matchers are conjunctive: an error matches only if every configured
/// matcher accepts it.
///
/// # Example
///
/// ```
/// use hermes_core::{Error, ErrorData};
///
/// let err = Error::invalid_params().clone_with_data(ErrorData {
///     details: vec![Error::new(-32602, "uuid invalid").clone_with_data(ErrorData {
///         path: vec!["uuid".to_string()],
///         ..ErrorData::default()
///     })],
///     ..ErrorData::default()
/// });
///
/// let found = err.inspect().code(-32602).path(["uuid"]).find_first();
/// assert!(found.is_some());
/// ```
#[derive(Debug)]
pub struct Inspector<'a> {
    root: &'a Error,
    code: Option<i64>,
    path: Option<Vec<String>>,
    message: Option<String>,
}

impl<'a> Inspector<'a> {
    /// Creates a new inspector rooted at the given error.
    #[must_use]
    pub fn new(root: &'a Error) -> Self {
        Self {
            root,
            code: None,
            path: None,
            message: None,
        }
    }

    /// Matches errors with the given code.
    #[must_use]
    pub fn code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    /// Matches errors whose exact path equals the given segments.
    #[must_use]
    pub fn path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path = Some(path.into_iter().map(Into::into).collect());
        self
    }

    /// Matches errors with the given message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Matches errors with the same code as `err`, ignoring everything else.
    #[must_use]
    pub fn error(self, err: &Error) -> Self {
        self.code(err.code)
    }

    /// Returns the first matching error in depth-first order, if any.
    #[must_use]
    pub fn find_first(&self) -> Option<&'a Error> {
        self.find_first_in(self.root)
    }

    /// Returns every matching error in depth-first order.
    #[must_use]
    pub fn find_all(&self) -> Vec<&'a Error> {
        let mut out = Vec::new();
        self.collect_into(self.root, &mut out);
        out
    }

    /// Returns all matches if there are exactly `count` of them.
    #[must_use]
    pub fn find_count(&self, count: usize) -> Option<Vec<&'a Error>> {
        let out = self.find_all();
        (out.len() == count).then_some(out)
    }

    /// Returns the match if there is exactly one.
    #[must_use]
    pub fn find_one(&self) -> Option<&'a Error> {
        let out = self.find_all();
        match out.as_slice() {
            [single] => Some(single),
            _ => None,
        }
    }

    /// Returns the number of matching errors.
    #[must_use]
    pub fn count(&self) -> usize {
        self.find_all().len()
    }

    fn find_first_in(&self, err: &'a Error) -> Option<&'a Error> {
        if self.matches(err) {
            return Some(err);
        }
        let data = err.data.as_deref()?;
        data.details
            .iter()
            .find_map(|detail| self.find_first_in(detail))
    }

    fn collect_into(&self, err: &'a Error, out: &mut Vec<&'a Error>) {
        if self.matches(err) {
            out.push(err);
        }
        if let Some(data) = err.data.as_deref() {
            for detail in &data.details {
                self.collect_into(detail, out);
            }
        }
    }

    fn matches(&self, err: &Error) -> bool {
        if let Some(code) = self.code {
            if code != err.code {
                return false;
            }
        }
        if let Some(message) = &self.message {
            if *message != err.message {
                return false;
            }
        }
        if let Some(path) = &self.path {
            let actual = err
                .data
                .as_deref()
                .map(|d| d.path.as_slice())
                .unwrap_or_default();
            if actual.len() != path.len() {
                return false;
            }
            if !actual.iter().zip(path).all(|(a, b)| a == b) {
                return false;
            }
        }
        true
    }
}
