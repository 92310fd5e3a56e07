//! CORS header computation for the edge worker
//!
//! The worker serves browser-facing API routes, a server-to-server webhook
//! endpoint, and proxied static assets on one listener, each with a
//! different CORS posture. A blanket middleware cannot express that split,
//! so headers are computed per request and attached selectively:
//!
//! - API responses (success and error alike) always carry them.
//! - Preflight `OPTIONS` requests short-circuit to 204 with headers only.
//! - The webhook response carries none (server-to-server).
//! - Proxied responses carry them only when the payload is not HTML, so page
//!   loads keep the origin's own caching/security headers untouched.
//!
//! `Access-Control-Allow-Origin` reflects the request's `Origin` header and
//! falls back to `*` for origin-less callers.
//!
//! # Example
//!
//! ```rust
//! use http::header::HeaderValue;
//! use edgehost::cors::cors_headers;
//!
//! let origin = HeaderValue::from_static("https://example.com");
//! let headers = cors_headers(Some(&origin));
//! assert_eq!(
//!     headers["access-control-allow-origin"],
//!     "https://example.com"
//! );
//! ```

use axum::body::Body;
use axum::response::Response;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};

/// Request headers a cross-origin caller may send
pub const ALLOWED_HEADERS: [HeaderName; 2] = [header::CONTENT_TYPE, header::AUTHORIZATION];

/// Methods the API surface answers
pub const ALLOWED_METHODS: [Method; 3] = [Method::GET, Method::POST, Method::OPTIONS];

/// Preflight cache lifetime (1 hour)
pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;

const ALLOW_METHODS_VALUE: &str = "GET, POST, OPTIONS";
const ALLOW_HEADERS_VALUE: &str = "Content-Type, Authorization";

/// Compute the CORS headers for one request
///
/// # Arguments
///
/// * `origin` - the request's `Origin` header, reflected verbatim when
///   present; absent origins get `*`
pub fn cors_headers(origin: Option<&HeaderValue>) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(4);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        allow_origin_value(origin),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS_VALUE),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS_VALUE),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers
}

/// Merge the computed CORS headers into an existing header map
pub fn apply_cors_headers(target: &mut HeaderMap, origin: Option<&HeaderValue>) {
    target.extend(cors_headers(origin));
}

/// Build the immediate 204 answer for a preflight request
pub fn preflight_response(origin: Option<&HeaderValue>) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.extend(cors_headers(origin));
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from(DEFAULT_MAX_AGE_SECS),
    );
    response
}

fn allow_origin_value(origin: Option<&HeaderValue>) -> HeaderValue {
    match origin {
        Some(value) => value.clone(),
        None => HeaderValue::from_static("*"),
    }
}
