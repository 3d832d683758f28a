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

//! IPPAN Gateway Server
//!
//! A caching gateway in front of a single IPPAN node. Proxies API calls and
//! WebSocket streams and serves a read-only explorer API.

use clap::{builder::BoolishValueParser, ArgAction, Parser};
use eyre::Result;
use gateway_common::{init_logging, LogFormat};
use ippan_gateway::{config::parse_origins, GatewayConfig, GatewayServer};
use std::{net::IpAddr, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};
use tracing::{debug, info};

/// IPPAN Gateway
#[derive(Parser, Debug)]
#[command(name = "ippan-gateway")]
#[command(about = "Caching explorer and proxy gateway for an IPPAN node")]
#[command(version)]
struct Args {
    // ========== General Configuration ==========
    /// Address to bind to
    #[arg(long, env = "GATEWAY_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "GATEWAY_PORT", default_value = "8081")]
    port: u16,

    /// Upstream IPPAN node URL
    #[arg(long, env = "GATEWAY_UPSTREAM_URL", default_value = "http://127.0.0.1:8080")]
    upstream_url: String,

    /// Health path on the upstream node
    #[arg(long, env = "GATEWAY_UPSTREAM_HEALTH_PATH", default_value = "/health")]
    upstream_health_path: String,

    /// Per-call upstream timeout in milliseconds
    #[arg(long, env = "GATEWAY_TIMEOUT_MS", default_value = "10000")]
    timeout_ms: u64,

    /// Upstream health probe timeout in milliseconds (default: the call timeout)
    #[arg(long, env = "GATEWAY_HEALTH_TIMEOUT_MS")]
    health_timeout_ms: Option<u64>,

    // ========== Cache Configuration ==========
    /// Cache TTL in milliseconds (0 = caching disabled)
    #[arg(long, env = "GATEWAY_CACHE_TTL_MS", default_value = "5000")]
    cache_ttl_ms: u64,

    /// Maximum number of cached entries
    #[arg(long, env = "GATEWAY_CACHE_MAX_ITEMS", default_value = "10000")]
    cache_max_items: usize,

    // ========== Explorer Configuration ==========
    /// Upper bound for requested block counts
    #[arg(long, env = "GATEWAY_MAX_BLOCKS", default_value = "100")]
    max_blocks: usize,

    /// Block count when a request does not name one
    #[arg(long, env = "GATEWAY_DEFAULT_BLOCKS", default_value = "10")]
    default_blocks: usize,

    /// Upper bound for requested transaction counts
    #[arg(long, env = "GATEWAY_MAX_TRANSACTIONS", default_value = "200")]
    max_transactions: usize,

    /// Transaction count when a request does not name one
    #[arg(long, env = "GATEWAY_DEFAULT_TRANSACTIONS", default_value = "20")]
    default_transactions: usize,

    /// Mount the explorer routes
    #[arg(
        long,
        env = "GATEWAY_ENABLE_EXPLORER",
        default_value = "true",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    enable_explorer: bool,

    // ========== Mount Configuration ==========
    /// Prefix of the API passthrough
    #[arg(long, env = "GATEWAY_API_PREFIX", default_value = "/api")]
    api_prefix: String,

    /// Prefix of the WebSocket passthrough
    #[arg(long, env = "GATEWAY_WS_PREFIX", default_value = "/ws")]
    ws_prefix: String,

    /// Prefix of the explorer API
    #[arg(long, env = "GATEWAY_EXPLORER_PREFIX", default_value = "/explorer")]
    explorer_prefix: String,

    /// Allowed CORS origins (comma-separated, `*` for any, `*.domain` for subdomains)
    /// Example: --allowed-origins "https://explorer.ippan.org,*.ippan.net"
    #[arg(long, env = "GATEWAY_ALLOWED_ORIGINS", default_value = "*")]
    allowed_origins: String,

    /// Hide error details from clients
    #[arg(
        long,
        env = "GATEWAY_PRODUCTION",
        default_value = "false",
        num_args = 0..=1,
        default_missing_value = "true",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    production: bool,

    // ========== Logging Configuration ==========
    /// Console log format: pretty or json
    #[arg(long, env = "GATEWAY_LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,

    /// Directory for daily-rotated log files
    #[arg(long, env = "GATEWAY_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

impl Args {
    fn to_config(&self) -> GatewayConfig {
        let timeout = Duration::from_millis(self.timeout_ms);
        GatewayConfig {
            upstream_url: self.upstream_url.clone(),
            upstream_health_path: self.upstream_health_path.clone(),
            timeout,
            health_timeout: self.health_timeout_ms.map_or(timeout, Duration::from_millis),
            cache_ttl: Duration::from_millis(self.cache_ttl_ms),
            cache_max_items: self.cache_max_items,
            max_blocks: self.max_blocks,
            default_blocks: self.default_blocks,
            max_transactions: self.max_transactions,
            default_transactions: self.default_transactions,
            api_prefix: self.api_prefix.clone(),
            ws_prefix: self.ws_prefix.clone(),
            explorer_prefix: self.explorer_prefix.clone(),
            allowed_origins: parse_origins(&self.allowed_origins),
            enable_explorer: self.enable_explorer,
            production: self.production,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let dotenv_path = dotenv::dotenv().ok();
    let args = Args::parse();

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging("ippan-gateway", args.log_format, args.log_dir.as_deref())?;
    if let Some(path) = dotenv_path {
        info!("Loaded environment from {}", path.display());
    }
    debug!("Arguments: {:?}", args);

    let server = GatewayServer::new(args.to_config())?;

    let ip = IpAddr::from_str(&args.host)?;
    let addr = SocketAddr::from((ip, args.port));
    server.serve(addr).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_options_take_values() {
        let args = Args::try_parse_from(["ippan-gateway"]).unwrap();
        assert!(args.enable_explorer);
        assert!(!args.production);

        let args =
            Args::try_parse_from(["ippan-gateway", "--enable-explorer", "false", "--production"])
                .unwrap();
        assert!(!args.enable_explorer);
        assert!(args.production);

        let args = Args::try_parse_from(["ippan-gateway", "--enable-explorer=no"]).unwrap();
        assert!(!args.to_config().enable_explorer);
    }

    #[test]
    fn test_config_from_args() {
        let args = Args::try_parse_from([
            "ippan-gateway",
            "--timeout-ms",
            "2500",
            "--allowed-origins",
            "https://a.org, *.b.org",
        ])
        .unwrap();
        let config = args.to_config();

        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.health_timeout, Duration::from_millis(2500));
        assert_eq!(config.allowed_origins, vec!["https://a.org", "*.b.org"]);
    }
}
