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

//! Gateway configuration and mount-path helpers

use std::time::Duration;

/// Default upstream IPPAN node
pub const DEFAULT_UPSTREAM_URL: &str = "http://127.0.0.1:8080";

/// Resolved gateway configuration
///
/// Every field has a default, see [`GatewayConfig::default`]. Values coming
/// from the outside should go through [`GatewayConfig::normalized`] before use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Base URL of the upstream node, without trailing slash
    pub upstream_url: String,
    /// Health path on the upstream node
    pub upstream_health_path: String,
    /// Timeout applied to each upstream call
    pub timeout: Duration,
    /// Timeout applied to the upstream health probe
    pub health_timeout: Duration,
    /// Time-to-live of cached explorer reads, zero disables caching
    pub cache_ttl: Duration,
    /// Maximum number of cached entries
    pub cache_max_items: usize,
    /// Upper bound for requested block counts
    pub max_blocks: usize,
    /// Block count used when a request does not specify one
    pub default_blocks: usize,
    /// Upper bound for requested transaction counts
    pub max_transactions: usize,
    /// Transaction count used when a request does not specify one
    pub default_transactions: usize,
    /// Mount prefix of the generic API passthrough
    pub api_prefix: String,
    /// Mount prefix of the WebSocket passthrough
    pub ws_prefix: String,
    /// Mount prefix of the explorer read API
    pub explorer_prefix: String,
    /// CORS origin allowlist, `*` allows any origin
    pub allowed_origins: Vec<String>,
    /// Whether explorer routes are mounted at all
    pub enable_explorer: bool,
    /// Hide error details from clients
    pub production: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let timeout = Duration::from_secs(10);
        Self {
            // Upstream
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            upstream_health_path: "/health".to_string(),
            timeout,
            health_timeout: timeout,

            // Cache
            cache_ttl: Duration::from_secs(5),
            cache_max_items: 10_000,

            // Explorer limits
            max_blocks: 100,
            default_blocks: 10,
            max_transactions: 200,
            default_transactions: 20,

            // Mounts
            api_prefix: "/api".to_string(),
            ws_prefix: "/ws".to_string(),
            explorer_prefix: "/explorer".to_string(),

            allowed_origins: vec!["*".to_string()],
            enable_explorer: true,
            production: false,
        }
    }
}

impl GatewayConfig {
    /// Canonicalizes prefixes, the upstream URL and the explorer limits
    pub fn normalized(mut self) -> Self {
        self.upstream_url = self.upstream_url.trim().trim_end_matches('/').to_string();
        self.upstream_health_path = normalize_prefix(&self.upstream_health_path);
        self.api_prefix = normalize_prefix(&self.api_prefix);
        self.ws_prefix = normalize_prefix(&self.ws_prefix);
        self.explorer_prefix = normalize_prefix(&self.explorer_prefix);

        self.max_blocks = self.max_blocks.max(1);
        self.default_blocks = self.default_blocks.clamp(1, self.max_blocks);
        self.max_transactions = self.max_transactions.max(1);
        self.default_transactions = self.default_transactions.clamp(1, self.max_transactions);

        self.allowed_origins = self
            .allowed_origins
            .iter()
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect();
        self
    }

    /// Distinct mount bases of the explorer API
    ///
    /// The explorer is reachable at its own prefix and nested under the API
    /// prefix. When the API prefix is root both collapse into one base.
    pub fn explorer_mount_bases(&self) -> Vec<String> {
        let mut bases = vec![self.explorer_prefix.clone()];
        let nested = join_paths(&self.api_prefix, &self.explorer_prefix);
        if !bases.contains(&nested) {
            bases.push(nested);
        }
        bases
    }

    /// Mount bases of the gateway health endpoint: root and the API prefix
    pub fn health_mount_bases(&self) -> Vec<String> {
        let mut bases = vec!["/".to_string()];
        if !bases.contains(&self.api_prefix) {
            bases.push(self.api_prefix.clone());
        }
        bases
    }
}

/// Parses a comma-separated origin list
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

/// Canonical mount prefix: leading slash, no trailing slash, root is `/`
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Joins a normalized base with an absolute path
pub fn join_paths(base: &str, path: &str) -> String {
    match (base, path) {
        ("/", path) => path.to_string(),
        (base, "/") => base.to_string(),
        (base, path) => format!("{base}{path}"),
    }
}

/// Strips a mount prefix from a request path
///
/// Returns `None` when the path is not under the prefix. A path equal to the
/// prefix rewrites to `/`, and a root prefix leaves the path unchanged.
pub fn strip_mount_prefix(path: &str, prefix: &str) -> Option<String> {
    if prefix == "/" {
        return Some(if path.is_empty() { "/".to_string() } else { path.to_string() });
    }

    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        // "/apix" is not under "/api"
        None
    }
}
