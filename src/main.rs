//! DynProxy - Main entry point

use anyhow::Result;
use clap::Parser;
use dynproxy::logging::{self, LogSettings};
use dynproxy::{ForwarderConfig, ProxyConfig, ProxyServer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// DynProxy - A dynamic HTTP forward proxy
#[derive(Parser, Debug)]
#[command(name = "dynproxy")]
#[command(author = "DynProxy Contributors")]
#[command(version = "1.0.0")]
#[command(about = "Forwards /api/<target> to the upstream named in the path")]
struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Path prefix under which requests are forwarded
    #[arg(long, env = "MOUNT_PREFIX", default_value = "/api")]
    mount_prefix: String,

    /// Runtime environment; `development` also logs to the console
    #[arg(long, env = "APP_ENV", default_value = "production")]
    environment: String,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Directory for combined.log and error.log
    #[arg(long, env = "LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,

    /// Upstream connect timeout in seconds
    #[arg(long, env = "CONNECT_TIMEOUT_SECS", default_value = "10")]
    connect_timeout_secs: u64,

    /// Upstream read idle timeout in seconds (0 disables)
    #[arg(long, env = "READ_TIMEOUT_SECS", default_value = "120")]
    read_timeout_secs: u64,

    /// Redirects followed before giving up
    #[arg(long, env = "MAX_REDIRECTS", default_value = "5")]
    max_redirects: usize,
}

impl Args {
    fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            port: self.port,
            mount_prefix: self.mount_prefix.clone(),
            forwarder: ForwarderConfig {
                connect_timeout: Duration::from_secs(self.connect_timeout_secs),
                read_timeout: (self.read_timeout_secs > 0)
                    .then(|| Duration::from_secs(self.read_timeout_secs)),
                max_redirects: self.max_redirects,
                ..ForwarderConfig::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = logging::init(&LogSettings {
        level: args.log_level.clone(),
        dir: args.log_dir.clone(),
        console: args.environment.eq_ignore_ascii_case("development"),
    })?;

    info!(
        port = args.port,
        environment = %args.environment,
        "Starting DynProxy v1.0.0"
    );

    let server = Arc::new(ProxyServer::new(args.proxy_config())?);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = &result {
                error!(error = %e, "Server stopped");
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    }
}
