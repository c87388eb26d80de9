//! Permissive CORS policy shared by every response

use hyper::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS,
    ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_METHOD,
};
use hyper::{Method, Request};

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET,POST,PUT,DELETE,OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type,Authorization";
pub const EXPOSE_HEADERS: &str = "Content-Length,X-Proxy-Response";
pub const MAX_AGE_SECS: &str = "86400";

/// Headers carried by every response
pub fn apply(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static(ALLOW_ORIGIN));
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(EXPOSE_HEADERS),
    );
}

/// Method and header allowances, also sent on relayed upstream responses
pub fn apply_allowances(headers: &mut HeaderMap) {
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
}

/// Headers for a preflight answer
pub fn apply_preflight(headers: &mut HeaderMap) {
    apply(headers);
    apply_allowances(headers);
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE_SECS));
}

/// An OPTIONS request announcing the method it intends to use
pub fn is_preflight<B>(req: &Request<B>) -> bool {
    req.method() == Method::OPTIONS && req.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preflight_detection() {
        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/example.com")
            .header("Access-Control-Request-Method", "POST")
            .body(())
            .unwrap();
        assert!(is_preflight(&preflight));

        let plain_options = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/example.com")
            .body(())
            .unwrap();
        assert!(!is_preflight(&plain_options));

        let get = Request::builder()
            .uri("/api/example.com")
            .header("Access-Control-Request-Method", "POST")
            .body(())
            .unwrap();
        assert!(!is_preflight(&get));
    }

    #[test]
    fn test_preflight_headers() {
        let mut headers = HeaderMap::new();
        apply_preflight(&mut headers);

        assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert_eq!(
            headers.get(ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
            "GET,POST,PUT,DELETE,OPTIONS"
        );
        assert_eq!(
            headers.get(ACCESS_CONTROL_ALLOW_HEADERS).unwrap(),
            "Content-Type,Authorization"
        );
        assert_eq!(headers.get(ACCESS_CONTROL_MAX_AGE).unwrap(), "86400");
        assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(), "true");
    }
}
