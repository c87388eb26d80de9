//! Error taxonomy for a single proxied call

use crate::forwarder::UpstreamResponse;
use hyper::StatusCode;
use thiserror::Error;

/// The request did not name a usable target
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("missing target URL")]
    MissingTarget,

    #[error("invalid target URL: {0}")]
    InvalidTarget(String),
}

/// No response could be obtained from the upstream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build from an error, flattening its `source()` chain into the message
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            let text = cause.to_string();
            if !message.contains(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            source = cause.source();
        }
        Self { message }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::from_error(&err)
    }
}

/// Failure outcome of the forwarding pipeline
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A response was received but the acceptance policy rejected its status
    #[error("upstream responded with {}", .0.status)]
    Upstream(Box<UpstreamResponse>),
}

impl ProxyError {
    /// Status code the caller will see for this failure
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Input(_) => StatusCode::BAD_REQUEST,
            ProxyError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Upstream(response) => response.status,
        }
    }

    /// Short code used in the JSON `error` field
    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::Input(InputError::MissingTarget) => "missing target URL",
            ProxyError::Input(InputError::InvalidTarget(_)) => "invalid target URL",
            ProxyError::Transport(_) => "request failed",
            ProxyError::Upstream(_) => "upstream error",
        }
    }
}
