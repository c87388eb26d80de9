//! DynProxy - A dynamic HTTP forward proxy
//!
//! Requests under a mount prefix (`/api` by default) name their own upstream:
//! - `/api/example.com/foo` forwards to `https://www.example.com/foo`
//! - `/api/https://example.com/foo` forwards to `https://example.com/foo`
//!
//! Each request runs resolve, build, forward and relay in sequence. Upstream
//! certificates are not verified.

pub mod cors;
pub mod error;
pub mod forwarder;
pub mod logging;
pub mod outbound;
pub mod proxy;
pub mod relay;
pub mod target;

pub use error::{InputError, ProxyError, TransportError};
pub use forwarder::{Forwarder, ForwarderConfig, UpstreamResponse};
pub use outbound::OutboundRequest;
pub use proxy::{ProxyConfig, ProxyServer};
pub use target::resolve;
