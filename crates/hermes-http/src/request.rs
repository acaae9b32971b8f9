//! Request-scoped values stored into dispatch contexts by the HTTP
//! transports.

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use http::{request::Parts, Method, StatusCode, Uri};
use http_body_util::Full;
use hermes_core::{ContextValue, HttpVerb};
use parking_lot::Mutex;
use std::net::SocketAddr;

/// The response body type used by every Hermes HTTP handler.
pub type ResponseBody = Full<Bytes>;

/// The HTTP response produced by route handlers.
pub type HttpResponse = http::Response<ResponseBody>;

/// One incoming request as seen by the route-handler chain.
///
/// The body is read up front; the original request parts stay available so
/// the websocket transport can take its upgrade handle out of the
/// extensions.
#[derive(Debug)]
pub struct RouteRequest {
    parts: Parts,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
}

impl RouteRequest {
    /// Wraps a decomposed hyper request.
    #[must_use]
    pub fn new(parts: Parts, body: Bytes, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            parts,
            body,
            remote_addr,
        }
    }

    /// The request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// The request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    /// The request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// The raw request body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The verb as dispatch metadata.
    #[must_use]
    pub fn verb(&self) -> HttpVerb {
        HttpVerb::from_name(self.parts.method.as_str())
    }

    /// Mutable access to the request extensions (upgrade handles live
    /// here).
    pub fn extensions_mut(&mut self) -> &mut http::Extensions {
        &mut self.parts.extensions
    }

    /// Builds the immutable [`HttpRequest`] snapshot stored into dispatch
    /// contexts.
    #[must_use]
    pub fn snapshot(&self) -> HttpRequest {
        HttpRequest {
            method: self.parts.method.clone(),
            uri: self.parts.uri.clone(),
            headers: self.parts.headers.clone(),
            remote_addr: self.remote_addr,
        }
    }
}

/// Immutable snapshot of the request that opened the current call.
///
/// For websocket sessions this is the request that opened the connection.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
}

impl ContextValue for HttpRequest {
    const SHAREABLE: bool = true;
    const SHAREABLE_ACROSS_IMPERSONATION: bool = true;
}

impl HttpRequest {
    /// Builds a snapshot directly; transports normally go through
    /// [`RouteRequest::snapshot`].
    #[must_use]
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            method,
            uri,
            headers,
            remote_addr,
        }
    }

    /// The request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request uri.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A named header as text, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// The requestor's ip address.
    ///
    /// Reads the first entry of `X-Forwarded-For` when present. That
    /// header is client-controlled, so this assumes a trusted proxy that
    /// strips it from client requests. Falls back to the peer address.
    #[must_use]
    pub fn ip_address(&self) -> String {
        if let Some(forwarded) = self.header("x-forwarded-for") {
            if let Some(first) = forwarded.split(", ").next() {
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
        self.remote_addr
            .map(|addr| addr.to_string())
            .unwrap_or_default()
    }

    /// The user agent sent with the request, if any.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
    }
}

#[derive(Debug, Default)]
struct WriterState {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Option<Bytes>,
    written: bool,
}

/// A buffered response writer available to methods and raw HTTP handlers.
///
/// Methods normally return values and let the transport render the reply;
/// the writer exists for the cases that need direct control over the
/// response: extra headers (cookies, caching) on any transport, or a fully
/// hand-built response from a regex-routed handler. Once
/// [`write`](Self::write) or [`set_status`](Self::set_status) is called the
/// transport sends the buffered response instead of its default rendering.
#[derive(Debug, Default)]
pub struct HttpResponseWriter {
    state: Mutex<WriterState>,
}

impl ContextValue for HttpResponseWriter {
    const SHAREABLE: bool = true;
    const SHAREABLE_ACROSS_IMPERSONATION: bool = true;
}

impl HttpResponseWriter {
    /// Creates an untouched writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the response status. Marks the response as written.
    pub fn set_status(&self, status: StatusCode) {
        let mut state = self.state.lock();
        state.status = Some(status);
        state.written = true;
    }

    /// Adds a response header without taking over the response body.
    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        self.state.lock().headers.insert(name, value);
    }

    /// Replaces the response body. Marks the response as written.
    pub fn write(&self, body: impl Into<Bytes>) {
        let mut state = self.state.lock();
        state.body = Some(body.into());
        state.written = true;
    }

    /// Whether a handler took over the response.
    #[must_use]
    pub fn written(&self) -> bool {
        self.state.lock().written
    }

    /// Extends `response` with the buffered headers.
    pub fn apply_headers(&self, response: &mut HttpResponse) {
        let state = self.state.lock();
        for (name, value) in &state.headers {
            response.headers_mut().insert(name.clone(), value.clone());
        }
    }

    /// Renders the buffered response, if one was written.
    #[must_use]
    pub fn take_response(&self) -> Option<HttpResponse> {
        let mut state = self.state.lock();
        if !state.written {
            return None;
        }
        let mut response = http::Response::new(Full::new(state.body.take().unwrap_or_default()));
        *response.status_mut() = state.status.unwrap_or(StatusCode::OK);
        for (name, value) in state.headers.drain() {
            if let Some(name) = name {
                response.headers_mut().insert(name, value);
            }
        }
        Some(response)
    }
}

/// The capture groups of the regex route that matched the current request.
///
/// Index 0 is the whole match, further entries are the pattern's groups.
#[derive(Debug, Clone)]
pub struct MatchedParts {
    parts: Vec<String>,
}

impl ContextValue for MatchedParts {
    const SHAREABLE: bool = true;
    const SHAREABLE_ACROSS_IMPERSONATION: bool = true;
}

impl MatchedParts {
    /// Wraps the captured parts.
    #[must_use]
    pub fn new(parts: Vec<String>) -> Self {
        Self { parts }
    }

    /// All captured parts.
    #[must_use]
    pub fn parts(&self) -> &[String] {
        &self.parts
    }
}

/// Builds a JSON response with the given status.
pub(crate) fn json_response(status: StatusCode, body: Vec<u8>) -> HttpResponse {
    let mut response = http::Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Builds an empty response with the given status.
pub(crate) fn empty_response(status: StatusCode) -> HttpResponse {
    let mut response = http::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
