//! Proxy server implementation
//! Accepts inbound HTTP, routes the mount prefix through the forwarding pipeline

use crate::cors;
use crate::error::ProxyError;
use crate::forwarder::{Forwarder, ForwarderConfig, UpstreamResponse};
use crate::outbound::OutboundRequest;
use crate::relay::{self, error_response, json_response, ProxyBody};
use crate::target;
use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::header::{CONTENT_TYPE, USER_AGENT};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, field, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Path answered by the health check
pub const HEALTH_PATH: &str = "/health";

/// Proxy server configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    /// Path segment under which requests are forwarded
    pub mount_prefix: String,
    pub forwarder: ForwarderConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            mount_prefix: "/api".to_string(),
            forwarder: ForwarderConfig::default(),
        }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    timestamp: String,
    port: u16,
}

/// Proxy server
pub struct ProxyServer {
    port: u16,
    mount_prefix: String,
    forwarder: Forwarder,
}

impl ProxyServer {
    /// Create a new proxy server
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let forwarder = Forwarder::new(&config.forwarder)?;

        Ok(Self {
            port: config.port,
            mount_prefix: normalize_prefix(&config.mount_prefix),
            forwarder,
        })
    }

    /// Start the proxy server
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let addr: SocketAddr = format!("0.0.0.0:{}", self.port).parse()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!(port = self.port, mount_prefix = %self.mount_prefix, "Server started");

        self.serve(listener).await
    }

    /// Accept connections from an already bound listener
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let server = self.clone();

            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, remote_addr).await {
                    debug!("HTTP connection error from {}: {}", remote_addr, e);
                }
            });
        }
    }

    /// Handle a single HTTP connection
    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
    ) -> Result<()> {
        let io = TokioIo::new(stream);

        http1::Builder::new()
            .serve_connection(
                io,
                service_fn(move |req| {
                    let server = self.clone();
                    async move { server.handle_request(req, remote_addr).await }
                }),
            )
            .await
            .map_err(|e| anyhow!("HTTP service error: {}", e))
    }

    /// Handle one inbound request; every outcome becomes a response
    pub async fn handle_request<B>(
        &self,
        req: Request<B>,
        remote_addr: SocketAddr,
    ) -> Result<Response<ProxyBody>, Infallible>
    where
        B: Body<Data = Bytes>,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let span = info_span!(
            "request",
            id = %Uuid::new_v4(),
            method = %req.method(),
            uri = %req.uri(),
            target = field::Empty,
        );

        async move {
            info!(
                ip = %remote_addr.ip(),
                user_agent = req.headers().get(USER_AGENT).and_then(|v| v.to_str().ok()),
                "Request received"
            );

            let mut response = match self.process_request(req).await {
                Ok(response) => response,
                Err(e) => {
                    error!(error = %e, "Server error");
                    error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal server error",
                        &e.to_string(),
                    )
                }
            };

            cors::apply(response.headers_mut());
            Ok(response)
        }
        .instrument(span)
        .await
    }

    /// Route a request to the preflight answer, the health check or the pipeline
    async fn process_request<B>(&self, req: Request<B>) -> Result<Response<ProxyBody>>
    where
        B: Body<Data = Bytes>,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let method = req.method().clone();

        if cors::is_preflight(&req) {
            return Ok(preflight_response());
        }

        if req.uri().path() == HEALTH_PATH && (method == Method::GET || method == Method::HEAD) {
            info!("Health check");
            return Ok(self.health_response());
        }

        if let Some(sub_path) = sub_path(&self.mount_prefix, req.uri()) {
            let body = req
                .into_body()
                .collect()
                .await
                .context("Failed to read request body")?
                .to_bytes();

            return Ok(self.proxy(method, &sub_path, body).await);
        }

        Ok(error_response(
            StatusCode::NOT_FOUND,
            "not found",
            &format!("no route for {} {}", method, req.uri().path()),
        ))
    }

    /// Run the forwarding pipeline and relay its outcome
    async fn proxy(&self, method: Method, sub_path: &str, body: Bytes) -> Response<ProxyBody> {
        let outcome = self.forward(method, sub_path, body).await;

        match &outcome {
            Ok(upstream) => info!(
                status = upstream.status.as_u16(),
                content_type = upstream.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
                "Request succeeded"
            ),
            Err(ProxyError::Input(e)) => warn!(error = %e, "Rejected request"),
            Err(ProxyError::Upstream(upstream)) => warn!(
                status = upstream.status.as_u16(),
                "Upstream returned an error status"
            ),
            Err(e) => error!(error = %e, "Request failed"),
        }

        relay::relay(outcome)
    }

    async fn forward(
        &self,
        method: Method,
        sub_path: &str,
        body: Bytes,
    ) -> Result<UpstreamResponse, ProxyError> {
        let target = target::resolve(sub_path)?;
        Span::current().record("target", target.as_str());
        info!(target_url = %target, "Forwarding request");

        let outbound = OutboundRequest::build(method, &target, body)?;
        self.forwarder.forward(outbound).await
    }

    fn health_response(&self) -> Response<ProxyBody> {
        json_response(
            StatusCode::OK,
            &Health {
                status: "ok",
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                port: self.port,
            },
        )
    }
}

fn preflight_response() -> Response<ProxyBody> {
    let mut response = Response::new(relay::empty_body());
    *response.status_mut() = StatusCode::NO_CONTENT;
    cors::apply_preflight(response.headers_mut());
    response
}

/// `/api/` and `api` both become `/api`
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// The path of `uri` after `mount_prefix`, one leading slash removed. The
/// query string is not part of it. `None` when the path is not under the prefix.
fn sub_path(mount_prefix: &str, uri: &Uri) -> Option<String> {
    let rest = uri.path().strip_prefix(mount_prefix)?;
    let rest = if rest.is_empty() {
        rest
    } else {
        rest.strip_prefix('/')?
    };

    Some(rest.to_string())
}
