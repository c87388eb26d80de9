//! Response relay
//! Maps the outcome of a forwarded call onto the response sent to the caller

use crate::cors;
use crate::error::ProxyError;
use crate::forwarder::UpstreamResponse;
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, TE, TRAILER,
    TRANSFER_ENCODING, UPGRADE,
};
use hyper::{Response, StatusCode};
use serde::Serialize;

pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Marker set on every successfully relayed response
pub const PROXY_MARKER: &str = "x-proxy-response";

const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// Headers describing the upstream connection rather than the payload
const HOP_BY_HOP: [&str; 3] = ["keep-alive", "proxy-connection", "proxy-authenticate"];

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

/// Turn a pipeline outcome into the caller's response
pub fn relay(outcome: Result<UpstreamResponse, ProxyError>) -> Response<ProxyBody> {
    match outcome {
        Ok(upstream) => relay_success(upstream),
        Err(ProxyError::Upstream(upstream)) => relay_verbatim(*upstream),
        Err(err) => error_response(err.status(), err.code(), &err.to_string()),
    }
}

/// Status and body as received, a fixed header set around them
fn relay_success(upstream: UpstreamResponse) -> Response<ProxyBody> {
    let mut response = Response::new(full_body(upstream.body));
    *response.status_mut() = upstream.status;

    let headers = response.headers_mut();
    let content_type = upstream
        .headers
        .get(CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    headers.insert(CONTENT_TYPE, content_type);
    cors::apply(headers);
    cors::apply_allowances(headers);
    headers.insert(
        HeaderName::from_static(PROXY_MARKER),
        HeaderValue::from_static("true"),
    );

    response
}

/// Status, headers and body all as received
fn relay_verbatim(upstream: UpstreamResponse) -> Response<ProxyBody> {
    let mut response = Response::new(full_body(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = end_to_end(upstream.headers);
    response
}

/// Drop connection-level and framing headers; the body is re-framed on the way out
fn end_to_end(mut headers: HeaderMap) -> HeaderMap {
    for name in [CONNECTION, TRANSFER_ENCODING, UPGRADE, TE, TRAILER, CONTENT_LENGTH] {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers
}

/// JSON `{error, message}` response
pub fn error_response(status: StatusCode, error: &str, message: &str) -> Response<ProxyBody> {
    json_response(status, &ErrorBody { error, message })
}

/// Serialize `body` as the JSON payload of a response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<ProxyBody> {
    let bytes = serde_json::to_vec(body).unwrap_or_default();

    let mut response = Response::new(full_body(Bytes::from(bytes)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    response
}

/// Create full body
pub fn full_body(bytes: Bytes) -> ProxyBody {
    Full::new(bytes).map_err(|never| match never {}).boxed()
}

/// Create empty body
pub fn empty_body() -> ProxyBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}
