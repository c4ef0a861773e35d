//! Server configuration from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Frontend serving mode configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum FrontendMode {
    /// Proxy requests to a development server.
    Proxy { target: String },
    /// Serve the built client bundle from a directory.
    Static { dir: String },
    /// Relay only.
    Disabled,
}

impl FrontendMode {
    /// - `HUDDLE_FRONTEND_MODE`: "proxy" | "static" | "disabled" (default: "disabled")
    /// - `HUDDLE_PROXY_TARGET`: Target URL for proxy mode (default: "http://localhost:8081")
    /// - `HUDDLE_STATIC_DIR`: Directory for static mode (default: "./public")
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mode = lookup("HUDDLE_FRONTEND_MODE")
            .unwrap_or_else(|| "disabled".to_string())
            .to_lowercase();

        match mode.as_str() {
            "proxy" => {
                let target = lookup("HUDDLE_PROXY_TARGET")
                    .unwrap_or_else(|| "http://localhost:8081".to_string());
                FrontendMode::Proxy { target }
            }
            "static" => {
                let dir = lookup("HUDDLE_STATIC_DIR").unwrap_or_else(|| "./public".to_string());
                FrontendMode::Static { dir }
            }
            _ => FrontendMode::Disabled,
        }
    }
}

/// Runtime settings for the relay.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// How often the server pings each socket.
    pub heartbeat_interval: Duration,
    /// A socket silent for this long is treated as lost.
    pub idle_timeout: Duration,
    pub frontend: FrontendMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            heartbeat_interval: Duration::from_secs(20),
            idle_timeout: Duration::from_secs(60),
            frontend: FrontendMode::Disabled,
        }
    }
}

impl ServerConfig {
    /// Environment variables:
    /// - `HUDDLE_BIND_ADDR` (default: "0.0.0.0:3000")
    /// - `HUDDLE_HEARTBEAT_SECS` (default: 20)
    /// - `HUDDLE_IDLE_TIMEOUT_SECS` (default: 60)
    ///
    /// - plus the `FrontendMode` variables
    ///
    /// Unparsable values fall back to the default with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let bind_addr = parse_var(&lookup, "HUDDLE_BIND_ADDR").unwrap_or(defaults.bind_addr);
        let heartbeat_interval = parse_var(&lookup, "HUDDLE_HEARTBEAT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.heartbeat_interval);
        let idle_timeout = parse_var(&lookup, "HUDDLE_IDLE_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.idle_timeout);

        Self {
            bind_addr,
            heartbeat_interval,
            idle_timeout: idle_timeout.max(heartbeat_interval),
            frontend: FrontendMode::from_lookup(&lookup),
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}
