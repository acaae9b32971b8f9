//! HTTP status mapping for RPC errors.

use hermes_core::{codes, Error};
use http::StatusCode;

/// Maps a structured error to the HTTP status of a per-method or raw
/// response.
///
/// Authorization failures map to 403 rather than 401: a 401 would make
/// browsers pop their basic-auth dialog.
#[must_use]
pub fn http_status(error: &Error) -> StatusCode {
    match error.code {
        codes::METHOD_NOT_ALLOWED => StatusCode::METHOD_NOT_ALLOWED,
        codes::PARSE | codes::INVALID_PARAMS => StatusCode::BAD_REQUEST,
        codes::UNAUTHORIZED | codes::UNAUTHENTICATED => StatusCode::FORBIDDEN,
        codes::METHOD_NOT_FOUND => StatusCode::NOT_FOUND,
        codes::TOO_MANY_REQUESTS => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
