//! The structured error model shared across all transports.
//!
//! [`Error`] is the single error type that crosses the wire: an integer
//! code, a message, and an optional [`ErrorData`] payload carrying a field
//! path, nested detail errors, and an encrypted debug string. The
//! well-known JSON-RPC codes live in [`codes`].

use crate::secret::Secret;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known RPC error codes.
pub mod codes {
    /// Invalid JSON was received by the server.
    pub const PARSE: i64 = -32700;
    /// The method does not exist.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal server error.
    pub const INTERNAL: i64 = -32603;
    /// The method exists but may not be called with this HTTP verb.
    pub const METHOD_NOT_ALLOWED: i64 = -32000;
    /// The caller is known but may not call this method.
    pub const UNAUTHORIZED: i64 = -32001;
    /// The caller has no valid session.
    pub const UNAUTHENTICATED: i64 = -32002;
    /// The caller exceeded a rate limit.
    pub const TOO_MANY_REQUESTS: i64 = -32003;
}

/// A structured RPC error.
///
/// `Error` is both the wire representation (it serializes straight into the
/// JSON-RPC `error` member) and the error type returned by providers and
/// methods. Application code builds domain errors by cloning one of the
/// well-known constructors with additional [`ErrorData`]:
///
/// ```
/// use hermes_core::{Error, ErrorData};
///
/// let err = Error::invalid_params().clone_with_data(ErrorData {
///     details: vec![Error::new(10001, "profile not found")],
///     ..ErrorData::default()
/// });
/// assert_eq!(err.code, hermes_core::codes::INVALID_PARAMS);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Error {
    /// The numeric error code.
    pub code: i64,
    /// A human-readable message. Stable across deployments; diagnostics
    /// belong in the encrypted `data.debug` field instead.
    pub message: String,
    /// Optional structured payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<ErrorData>>,
}

impl Error {
    /// Creates a new error with the given code and message.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Invalid JSON payload.
    #[must_use]
    pub fn parse() -> Self {
        Self::new(codes::PARSE, "Parse error")
    }

    /// Unknown endpoint.
    #[must_use]
    pub fn method_not_found() -> Self {
        Self::new(codes::METHOD_NOT_FOUND, "Method not found")
    }

    /// Parameter decoding or validation failed.
    #[must_use]
    pub fn invalid_params() -> Self {
        Self::new(codes::INVALID_PARAMS, "Invalid params")
    }

    /// Unexpected server-side failure.
    #[must_use]
    pub fn internal() -> Self {
        Self::new(codes::INTERNAL, "Internal error")
    }

    /// The endpoint rejects the HTTP verb used for the call.
    #[must_use]
    pub fn method_not_allowed() -> Self {
        Self::new(codes::METHOD_NOT_ALLOWED, "Server error: method not allowed")
    }

    /// The caller may not call the current method.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(codes::UNAUTHORIZED, "Not authorized")
    }

    /// The caller has no valid session.
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self::new(codes::UNAUTHENTICATED, "Not authenticated")
    }

    /// The caller exceeded a rate limit.
    #[must_use]
    pub fn too_many_requests() -> Self {
        Self::new(codes::TOO_MANY_REQUESTS, "Too many requests")
    }

    /// Returns a copy of this error with the supplied data attached.
    #[must_use]
    pub fn clone_with_data(&self, data: ErrorData) -> Self {
        Self {
            code: self.code,
            message: self.message.clone(),
            data: Some(Box::new(data)),
        }
    }

    /// Returns a copy of this error with an encrypted debug string attached.
    #[must_use]
    pub fn with_debug(&self, secret: &Secret, debug: &str) -> Self {
        self.clone_with_data(ErrorData {
            debug: Some(secret.encode(debug)),
            ..ErrorData::default()
        })
    }

    /// Starts a structured search over this error and its nested details.
    #[must_use]
    pub fn inspect(&self) -> crate::inspect::Inspector<'_> {
        crate::inspect::Inspector::new(self)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for Error {}

/// Structured payload carried by an [`Error`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    /// Path of the faulted field, outermost first. Array indices render
    /// as `[N]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
    /// Nested sub-errors, e.g. one per invalid field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<Error>,
    /// Encrypted diagnostic, opaque to untrusted readers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<String>,
}

/// Internal carrier for a panic caught during dispatch.
///
/// Never serialized to the wire: the transport sees an *internal* error
/// whose `data.debug` holds the encrypted panic message, while the stack
/// is logged exactly once at error severity.
#[derive(Debug)]
pub struct PanicError {
    /// The panic payload rendered as text.
    pub message: String,
    /// The stack captured at the recovery point.
    pub stack: String,
    /// The endpoint key being dispatched.
    pub method: String,
    /// The serialized request id, if any.
    pub request_id: Option<String>,
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic in {}: {}", self.method, self.message)
    }
}

impl std::error::Error for PanicError {}
