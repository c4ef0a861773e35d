//! The web client, served from the same origin as `/ws`.

use std::path::Path;

use axum::Router;
use axum_reverse_proxy::ReverseProxy;
use tower_http::services::{ServeDir, ServeFile};

use crate::config::FrontendMode;

impl FrontendMode {
    /// Hand every path the relay does not route itself to the web client.
    ///
    /// A static directory without an `index.html` leaves the relay alone.
    pub fn mount(&self, relay: Router) -> Router {
        match self {
            FrontendMode::Proxy { target } => {
                tracing::info!("Web client proxied from {}", target);
                let client: Router = ReverseProxy::new("/", target).into();
                relay.merge(client)
            }
            FrontendMode::Static { dir } => {
                let root = Path::new(dir);
                let index = root.join("index.html");
                if !index.is_file() {
                    tracing::warn!("No index.html in {}, serving the relay only", dir);
                    return relay;
                }
                tracing::info!("Web client served from {}", dir);
                relay.fallback_service(ServeDir::new(root).fallback(ServeFile::new(index)))
            }
            FrontendMode::Disabled => relay,
        }
    }
}
