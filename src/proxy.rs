//! Static origin proxy
//!
//! Every request the router cannot classify is forwarded to the configured
//! static origin: same method, same path and query, headers minus the
//! hop-by-hop set, body passed through untouched. Redirects are not
//! followed, so the origin's 3xx responses reach the caller as-is.
//!
//! On the way back, CORS headers are merged into non-HTML responses only.
//! HTML page loads keep exactly the origin's own header set; assets and API
//! style responses fetched cross-origin get the reflected CORS grant.

use axum::body::{Body, Bytes};
use axum::response::Response;
use http::header;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use metrics::counter;
use reqwest::redirect;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::cors::apply_cors_headers;
use crate::error::ProxyError;

/// Single-shot forwarder to the backing static origin
#[derive(Debug, Clone)]
pub struct StaticProxy {
    client: Client,
    origin: Url,
}

impl StaticProxy {
    /// Build a proxy for the given origin
    ///
    /// The HTTP client never follows redirects: the origin's redirect
    /// responses belong to the caller.
    pub fn new(origin: Url) -> Result<Self, ProxyError> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { client, origin })
    }

    /// The origin requests are forwarded to
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Forward one request and stream the origin's response back
    ///
    /// # Errors
    ///
    /// [`ProxyError::InvalidTarget`] if the path does not combine with the
    /// origin into a URL, [`ProxyError::Upstream`] if the fetch itself fails.
    /// An error status from the origin is not an error; it is the response.
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        inbound: &HeaderMap,
        body: Bytes,
    ) -> Result<Response, ProxyError> {
        let target = self.target_url(path_and_query)?;
        let origin_header = inbound.get(header::ORIGIN).cloned();

        let upstream = match self
            .client
            .request(method.clone(), target.clone())
            .headers(upstream_headers(inbound))
            .body(body)
            .send()
            .await
        {
            Ok(upstream) => upstream,
            Err(e) => {
                counter!("edgehost_proxied_requests_total", "status" => "upstream_error")
                    .increment(1);
                return Err(ProxyError::Upstream(e));
            }
        };

        let status = upstream.status();
        counter!("edgehost_proxied_requests_total", "status" => status_class(status)).increment(1);
        let mut headers = response_headers(upstream.headers());
        let html = is_html(headers.get(header::CONTENT_TYPE));
        if !html {
            apply_cors_headers(&mut headers, origin_header.as_ref());
        }
        debug!(
            method = %method,
            target = %target,
            status = %status,
            html,
            "proxied request"
        );

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    fn target_url(&self, path_and_query: &str) -> Result<Url, ProxyError> {
        self.origin
            .join(path_and_query)
            .map_err(|e| ProxyError::InvalidTarget(format!("{path_and_query}: {e}")))
    }
}

/// Status class label for the proxy counter
fn status_class(status: http::StatusCode) -> &'static str {
    match status.as_u16() / 100 {
        1 => "1xx",
        2 => "2xx",
        3 => "3xx",
        4 => "4xx",
        5 => "5xx",
        _ => "other",
    }
}

/// Whether a content type is an HTML page load
fn is_html(content_type: Option<&HeaderValue>) -> bool {
    content_type
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().eq_ignore_ascii_case("text/html"))
        .unwrap_or(false)
}

/// Connection-scoped headers that must not cross the proxy
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Inbound headers rewritten for the upstream fetch
///
/// Drops the hop-by-hop set plus `Host` and `Content-Length` (the client
/// recomputes both) and records the original host in `X-Forwarded-Host`.
fn upstream_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in inbound {
        if is_hop_by_hop(name) || name == header::HOST || name == header::CONTENT_LENGTH {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    if let Some(host) = inbound.get(header::HOST) {
        out.insert(HeaderName::from_static("x-forwarded-host"), host.clone());
    }
    out
}

/// Origin response headers passed back to the caller
fn response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in upstream {
        if is_hop_by_hop(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}
