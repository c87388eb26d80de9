//! Upstream forwarding
//!
//! Sends an [`OutboundRequest`] over a shared HTTP client that does not verify
//! upstream TLS certificates. Self-signed and otherwise invalid certificates
//! are accepted. Redirects are followed here rather than inside the client so
//! that `Host` and the method can be recomputed for every hop.

use crate::error::{ProxyError, TransportError};
use crate::outbound::OutboundRequest;
use anyhow::{Context, Result};
use bytes::Bytes;
use hyper::header::{HeaderMap, LOCATION};
use hyper::StatusCode;
use std::time::Duration;
use tracing::debug;

/// Transport settings, fixed for the lifetime of the process
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub connect_timeout: Duration,
    /// Longest silence between reads from the upstream; `None` waits indefinitely.
    /// A slow transfer that keeps making progress is never cut off.
    pub read_timeout: Option<Duration>,
    pub max_redirects: usize,
    /// Lowest status classified as an upstream error
    pub min_error_status: u16,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Some(Duration::from_secs(120)),
            max_redirects: 5,
            min_error_status: 500,
        }
    }
}

/// A response received from the upstream, body fully buffered
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Executes outbound calls. Cheap to clone, all clones share one client.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    max_redirects: usize,
    min_error_status: u16,
}

impl Forwarder {
    /// Create a forwarder from its transport settings
    pub fn new(config: &ForwarderConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(config.connect_timeout);

        if let Some(timeout) = config.read_timeout {
            builder = builder.read_timeout(timeout);
        }

        let client = builder
            .build()
            .context("Failed to build upstream HTTP client")?;

        Ok(Self {
            client,
            max_redirects: config.max_redirects,
            min_error_status: config.min_error_status,
        })
    }

    /// Perform one proxied call, following redirects up to the configured limit.
    ///
    /// Any received response below `min_error_status` is `Ok`; one at or above
    /// it comes back as [`ProxyError::Upstream`] with the response attached.
    /// Failing to get a response at all is a [`ProxyError::Transport`].
    pub async fn forward(&self, request: OutboundRequest) -> Result<UpstreamResponse, ProxyError> {
        let mut request = request;
        let mut redirects = 0;

        loop {
            let response = self.send(&request).await?;

            if let Some(location) = redirect_location(&response) {
                if redirects >= self.max_redirects {
                    return Err(TransportError::new(format!(
                        "too many redirects (limit {}) at {}",
                        self.max_redirects, request.url
                    ))
                    .into());
                }
                redirects += 1;

                debug!(
                    from = %request.url,
                    to = %location,
                    status = response.status().as_u16(),
                    "Following redirect"
                );

                request = request
                    .redirect(response.status(), &location)
                    .map_err(|e| TransportError::new(format!("bad redirect: {}", e)))?;
                continue;
            }

            let upstream = read_response(response).await?;

            return if upstream.status.as_u16() < self.min_error_status {
                Ok(upstream)
            } else {
                Err(ProxyError::Upstream(Box::new(upstream)))
            };
        }
    }

    async fn send(&self, request: &OutboundRequest) -> Result<reqwest::Response, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());

        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        Ok(builder.send().await?)
    }
}

/// `Location` of a followable redirect, if this response is one
fn redirect_location(response: &reqwest::Response) -> Option<String> {
    match response.status() {
        StatusCode::MOVED_PERMANENTLY
        | StatusCode::FOUND
        | StatusCode::SEE_OTHER
        | StatusCode::TEMPORARY_REDIRECT
        | StatusCode::PERMANENT_REDIRECT => response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        _ => None,
    }
}

async fn read_response(response: reqwest::Response) -> Result<UpstreamResponse, TransportError> {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?;

    Ok(UpstreamResponse {
        status,
        headers,
        body,
    })
}
