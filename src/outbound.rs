//! Outbound request construction
//!
//! Every upstream call carries the same browser-like header template. Inbound
//! headers are not copied; only the method and the raw body are taken from the
//! caller. `Host` is always the target's hostname.

use crate::error::InputError;
use bytes::Bytes;
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CACHE_CONTROL,
    CONNECTION, HOST, UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};
use hyper::{Method, StatusCode};
use url::Url;

const TEMPLATE: [(HeaderName, &str); 7] = [
    (
        USER_AGENT,
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    ),
    (
        ACCEPT,
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    (
        ACCEPT_LANGUAGE,
        "zh-CN,zh;q=0.8,zh-TW;q=0.7,zh-HK;q=0.5,en-US;q=0.3,en;q=0.2",
    ),
    (ACCEPT_ENCODING, "gzip, deflate, br"),
    (CONNECTION, "keep-alive"),
    (UPGRADE_INSECURE_REQUESTS, "1"),
    (CACHE_CONTROL, "max-age=0"),
];

/// A fully assembled upstream request
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutboundRequest {
    /// Assemble the upstream request for `target`
    pub fn build(method: Method, target: &str, body: Bytes) -> Result<Self, InputError> {
        let url = Url::parse(target).map_err(|e| InputError::InvalidTarget(e.to_string()))?;
        let headers = template_headers(&url)?;

        Ok(Self {
            method,
            url,
            headers,
            body,
        })
    }

    /// Re-target this request at a redirect `location`.
    ///
    /// 301/302 turn POST into GET, 303 turns anything but HEAD into GET; a
    /// method change drops the body. 307/308 keep both.
    pub fn redirect(&self, status: StatusCode, location: &str) -> Result<Self, InputError> {
        let url = self
            .url
            .join(location)
            .map_err(|e| InputError::InvalidTarget(format!("{}: {}", location, e)))?;

        let method = match status {
            StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND if self.method == Method::POST => {
                Method::GET
            }
            StatusCode::SEE_OTHER if self.method != Method::HEAD => Method::GET,
            _ => self.method.clone(),
        };

        let body = if method == self.method {
            self.body.clone()
        } else {
            Bytes::new()
        };

        Ok(Self {
            headers: template_headers(&url)?,
            method,
            url,
            body,
        })
    }
}

fn template_headers(url: &Url) -> Result<HeaderMap, InputError> {
    let host = url
        .host_str()
        .ok_or_else(|| InputError::InvalidTarget(format!("{} has no host", url)))?;

    let mut headers = HeaderMap::with_capacity(TEMPLATE.len() + 1);
    for (name, value) in TEMPLATE {
        headers.insert(name, HeaderValue::from_static(value));
    }
    headers.insert(
        HOST,
        HeaderValue::from_str(host).map_err(|e| InputError::InvalidTarget(e.to_string()))?,
    );

    Ok(headers)
}
