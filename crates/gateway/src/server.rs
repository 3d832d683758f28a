// IPPAN Gateway - explorer and proxy front for an IPPAN node
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Gateway server: state wiring, CORS, tracing and the serve loop

use crate::{
    cache::ResponseCache,
    config::GatewayConfig,
    explorer::ExplorerService,
    health::HealthService,
    origin::OriginClient,
    routes::MountRegistry,
    websocket::upgrade_gate,
};
use axum::{
    http::{request::Parts, HeaderValue},
    middleware, Router,
};
use eyre::Result;
use gateway_common::shutdown_signal;
use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// Resolved configuration
    pub config: Arc<GatewayConfig>,
    /// Upstream client for raw passthrough
    pub origin: OriginClient,
    /// Process-wide response cache
    pub cache: Arc<ResponseCache>,
    /// Explorer query engine
    pub explorer: Arc<ExplorerService>,
    /// Health check service
    pub health: Arc<HealthService>,
}

/// Builder for configuring GatewayServer with fluent API and sensible defaults
#[derive(Debug, Clone, Default)]
pub struct GatewayServerBuilder {
    config: GatewayConfig,
}

impl GatewayServerBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the upstream node URL
    pub fn upstream_url(mut self, url: impl Into<String>) -> Self {
        self.config.upstream_url = url.into();
        self
    }

    /// Set the upstream health path
    pub fn upstream_health_path(mut self, path: impl Into<String>) -> Self {
        self.config.upstream_health_path = path.into();
        self
    }

    /// Set the per-call upstream timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the health probe timeout
    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.config.health_timeout = timeout;
        self
    }

    /// Set the cache TTL (zero disables caching)
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    /// Set the maximum number of cached entries
    pub fn cache_max_items(mut self, max_items: usize) -> Self {
        self.config.cache_max_items = max_items;
        self
    }

    /// Set the block count bounds
    pub fn block_limits(mut self, default: usize, max: usize) -> Self {
        self.config.default_blocks = default;
        self.config.max_blocks = max;
        self
    }

    /// Set the transaction count bounds
    pub fn transaction_limits(mut self, default: usize, max: usize) -> Self {
        self.config.default_transactions = default;
        self.config.max_transactions = max;
        self
    }

    /// Set the API passthrough prefix
    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.api_prefix = prefix.into();
        self
    }

    /// Set the WebSocket passthrough prefix
    pub fn ws_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.ws_prefix = prefix.into();
        self
    }

    /// Set the explorer prefix
    pub fn explorer_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.explorer_prefix = prefix.into();
        self
    }

    /// Set the CORS origin allowlist
    pub fn allowed_origins<T: Into<Vec<String>>>(mut self, origins: T) -> Self {
        self.config.allowed_origins = origins.into();
        self
    }

    /// Mount or hide the explorer routes
    pub fn enable_explorer(mut self, enabled: bool) -> Self {
        self.config.enable_explorer = enabled;
        self
    }

    /// Hide error details from clients
    pub fn production(mut self, production: bool) -> Self {
        self.config.production = production;
        self
    }

    /// Build the GatewayServer
    pub fn build(self) -> Result<GatewayServer> {
        GatewayServer::new(self.config)
    }
}

/// IPPAN gateway server
///
/// Use GatewayServerBuilder for easy configuration:
/// ```no_run
/// # use ippan_gateway::server::GatewayServerBuilder;
/// # async fn example() -> eyre::Result<()> {
/// let server = GatewayServerBuilder::new()
///     .upstream_url("http://127.0.0.1:8080")
///     .cache_max_items(5000)
///     .build()?;
/// server.serve("0.0.0.0:8081".parse()?).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct GatewayServer {
    state: AppState,
}

impl GatewayServer {
    /// Creates a gateway from a configuration
    ///
    /// The configuration is normalized first. No connection to the upstream
    /// is made here.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let config = config.normalized();
        let origin = OriginClient::new(&config.upstream_url, config.timeout)?;
        let cache = Arc::new(ResponseCache::new(config.cache_max_items));

        let explorer = Arc::new(ExplorerService::new(origin.clone(), cache.clone(), &config));
        let health = Arc::new(HealthService::new(
            origin.clone(),
            config.upstream_health_path.clone(),
            config.health_timeout,
            cache.clone(),
        ));

        let state = AppState { config: Arc::new(config), origin, cache, explorer, health };
        Ok(Self { state })
    }

    /// Resolved configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.state.config
    }

    /// Shared response cache
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.state.cache
    }

    /// Builds the complete application router
    pub fn router(&self) -> Router {
        let state = self.state.clone();
        MountRegistry::for_config(&state.config)
            .into_router()
            .layer(middleware::from_fn_with_state(state.clone(), upgrade_gate))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors_layer(&state.config.allowed_origins)),
            )
            .with_state(state)
    }

    /// Binds `addr` and serves until Ctrl-C or SIGTERM
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_on(listener, shutdown_signal()).await
    }

    /// Serves on an already bound listener until `shutdown` resolves
    ///
    /// # Arguments
    /// * `listener` - Bound TCP listener
    /// * `shutdown` - Future that starts the graceful shutdown when it completes
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let config = &self.state.config;
        info!("IPPAN gateway listening on {}", listener.local_addr()?);
        info!("  upstream: {}", config.upstream_url);
        info!("  api: {}  ws: {}  explorer: {}", config.api_prefix, config.ws_prefix, {
            if config.enable_explorer {
                config.explorer_mount_bases().join(", ")
            } else {
                "disabled".to_string()
            }
        });

        axum::serve(listener, self.router()).with_graceful_shutdown(shutdown).await?;

        info!("IPPAN gateway stopped");
        Ok(())
    }
}

/// CORS policy for an origin allowlist
///
/// `*` allows any origin. Other entries match exactly, or as suffix
/// wildcards such as `*.example.com` or `https://*.example.com`.
/// Disallowed origins get no CORS headers.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.iter().any(|origin| origin == "*") {
        return base.allow_origin(Any);
    }

    let allowed: Arc<[String]> = allowed_origins.into();
    base.allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _: &Parts| {
        let ok = origin.to_str().is_ok_and(|origin| origin_allowed(&allowed, origin));
        if !ok {
            warn!("Rejected CORS origin: {:?}", origin);
        }
        ok
    }))
}

/// Whether `origin` matches any allowlist entry
pub fn origin_allowed(allowed: &[String], origin: &str) -> bool {
    allowed.iter().any(|pattern| origin_matches(pattern, origin))
}

fn origin_matches(pattern: &str, origin: &str) -> bool {
    let origin = origin.trim_end_matches('/').to_ascii_lowercase();
    let pattern = pattern.to_ascii_lowercase();

    let Some((head, suffix)) = pattern.split_once('*') else {
        return pattern == origin;
    };

    let rest = if head.is_empty() {
        origin.split_once("://").map_or(origin.as_str(), |(_, host)| host)
    } else {
        match origin.strip_prefix(head) {
            Some(rest) => rest,
            None => return false,
        }
    };

    // Ignore the port unless the pattern names one
    let host = match rest.rsplit_once(':') {
        Some((host, port)) if !suffix.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => {
            host
        }
        _ => rest,
    };
    host.len() > suffix.len() && host.ends_with(suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_origins() {
        let allowed = list(&["https://explorer.ippan.org", "http://localhost:3000"]);
        assert!(origin_allowed(&allowed, "https://explorer.ippan.org"));
        assert!(origin_allowed(&allowed, "http://localhost:3000"));
        assert!(!origin_allowed(&allowed, "http://localhost:3001"));
        assert!(!origin_allowed(&allowed, "https://evil.org"));
    }

    #[test]
    fn test_suffix_wildcards() {
        let allowed = list(&["*.ippan.org"]);
        assert!(origin_allowed(&allowed, "https://app.ippan.org"));
        assert!(origin_allowed(&allowed, "http://a.b.ippan.org:8443"));
        assert!(!origin_allowed(&allowed, "https://ippan.org"));
        assert!(!origin_allowed(&allowed, "https://notippan.org"));

        let scheme_bound = list(&["https://*.ippan.org"]);
        assert!(origin_allowed(&scheme_bound, "https://app.ippan.org"));
        assert!(!origin_allowed(&scheme_bound, "http://app.ippan.org"));
    }

    #[test]
    fn test_router_layers_for_both_cors_modes() {
        for origins in [list(&["*"]), list(&["https://explorer.ippan.org", "*.ippan.net"])] {
            let server = GatewayServerBuilder::new().allowed_origins(origins).build().unwrap();
            let _router: Router = server.router();
        }
    }

    #[test]
    fn test_builder_applies_settings() {
        let server = GatewayServerBuilder::new()
            .upstream_url("http://node:9000/")
            .api_prefix("v1/")
            .cache_ttl(Duration::ZERO)
            .block_limits(500, 50)
            .production(true)
            .build()
            .unwrap();

        let config = server.config();
        assert_eq!(config.upstream_url, "http://node:9000");
        assert_eq!(config.api_prefix, "/v1");
        assert_eq!(config.cache_ttl, Duration::ZERO);
        assert_eq!(config.default_blocks, 50);
        assert!(config.production);
    }
}
