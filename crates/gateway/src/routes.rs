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

//! Route and mount registry
//!
//! Every logical route is registered once per mount base. The registry keeps
//! a flat `(method, path, handler)` table, deduplicated on `(method, path)`,
//! and turns it into an axum [`Router`] at the end.

use crate::{
    config::{join_paths, strip_mount_prefix, GatewayConfig},
    error::ApiError,
    proxy,
    server::AppState,
};
use axum::{
    extract::{Path, Query, Request, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get, MethodRouter},
    Json, Router,
};
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Explorer routes relative to each explorer mount base
const EXPLORER_ROUTES: &[(&str, RouteHandler)] = &[
    ("/summary", RouteHandler::ExplorerSummary),
    ("/blocks", RouteHandler::ExplorerBlocks),
    ("/blocks/{id}", RouteHandler::ExplorerBlock),
    ("/transactions", RouteHandler::ExplorerTransactions),
    ("/transactions/{hash}", RouteHandler::ExplorerTransaction),
    ("/accounts/{address}", RouteHandler::ExplorerAccount),
    ("/network", RouteHandler::ExplorerNetwork),
    ("/search", RouteHandler::ExplorerSearch),
];

/// Methods a route answers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMethod {
    /// GET (and HEAD)
    Get,
    /// Every method
    Any,
}

impl RouteMethod {
    fn overlaps(self, other: Self) -> bool {
        self == other || self == Self::Any || other == Self::Any
    }
}

/// Logical handler behind a mounted route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteHandler {
    /// Gateway health report
    Health,
    /// Network overview with recent blocks and transactions
    ExplorerSummary,
    /// Recent blocks
    ExplorerBlocks,
    /// Block by id or height
    ExplorerBlock,
    /// Recent transactions
    ExplorerTransactions,
    /// Transaction by hash
    ExplorerTransaction,
    /// Account by address
    ExplorerAccount,
    /// Node status projection
    ExplorerNetwork,
    /// Free-form search
    ExplorerSearch,
    /// Raw passthrough with the given prefix stripped
    Proxy {
        /// Normalized mount prefix
        prefix: String,
    },
}

/// One mounted route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRoute {
    /// Accepted methods
    pub method: RouteMethod,
    /// Full path template, `{param}` syntax
    pub path: String,
    /// Handler
    pub handler: RouteHandler,
}

/// Flat route table with `(method, path)` deduplication
#[derive(Debug, Clone, Default)]
pub struct MountRegistry {
    routes: Vec<MountRoute>,
    fallback_proxy: Option<String>,
}

impl MountRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every route the configuration enables
    ///
    /// Health is mounted at the root and under the API prefix, the explorer
    /// at each explorer mount base, and the raw proxy at the API and WS
    /// prefixes. A root proxy prefix becomes the fallback.
    pub fn for_config(config: &GatewayConfig) -> Self {
        let mut registry = Self::new();

        for base in config.health_mount_bases() {
            let path = join_paths(&base, "/health");
            registry.register(RouteMethod::Get, &path, RouteHandler::Health);
        }

        if config.enable_explorer {
            for base in config.explorer_mount_bases() {
                for (path, handler) in EXPLORER_ROUTES {
                    registry.register(RouteMethod::Get, &join_paths(&base, path), handler.clone());
                }
            }
        }

        for prefix in [&config.api_prefix, &config.ws_prefix] {
            registry.mount_proxy(prefix);
        }

        registry
    }

    /// Registers a route unless an overlapping `(method, path)` exists
    ///
    /// # Returns
    /// Whether the route was added
    pub fn register(&mut self, method: RouteMethod, path: &str, handler: RouteHandler) -> bool {
        let taken = self.routes.iter().any(|r| r.path == path && r.method.overlaps(method));
        if taken {
            debug!("Skipping duplicate route {:?} {}", method, path);
            return false;
        }
        self.routes.push(MountRoute { method, path: path.to_string(), handler });
        true
    }

    /// Mounts the raw proxy at `prefix`
    ///
    /// The catch-all never matches an empty tail, so `{prefix}/` is mounted
    /// on its own.
    pub fn mount_proxy(&mut self, prefix: &str) {
        if prefix == "/" {
            self.fallback_proxy.get_or_insert_with(|| prefix.to_string());
            return;
        }
        let handler = RouteHandler::Proxy { prefix: prefix.to_string() };
        self.register(RouteMethod::Any, prefix, handler.clone());
        self.register(RouteMethod::Any, &format!("{prefix}/"), handler.clone());
        self.register(RouteMethod::Any, &format!("{prefix}/{{*rest}}"), handler);
    }

    /// Proxy prefixes in effect, the root fallback included
    pub fn proxy_prefixes(&self) -> Vec<&str> {
        let mut prefixes: Vec<&str> = self
            .routes
            .iter()
            .filter_map(|route| match &route.handler {
                RouteHandler::Proxy { prefix } => Some(prefix.as_str()),
                _ => None,
            })
            .chain(self.fallback_proxy.as_deref())
            .collect();
        prefixes.dedup();
        prefixes
    }

    /// Registered routes in registration order
    pub fn routes(&self) -> &[MountRoute] {
        &self.routes
    }

    /// Prefix of the proxy serving unmatched requests, if any
    pub fn fallback_proxy(&self) -> Option<&str> {
        self.fallback_proxy.as_deref()
    }

    /// Builds the router; unmatched requests go to the root proxy or a JSON 404
    ///
    /// A GET route under a proxy prefix hands its other methods to that
    /// proxy instead of answering 405.
    pub fn into_router(self) -> Router<AppState> {
        let proxies: Vec<String> =
            self.proxy_prefixes().into_iter().map(str::to_string).collect();

        let mut router = Router::new();
        for route in self.routes {
            let mut methods = method_router(route.method, route.handler);
            if route.method == RouteMethod::Get {
                if let Some(prefix) = covering_proxy(&proxies, &route.path) {
                    methods = methods.fallback(proxy_handler(prefix.to_string()));
                }
            }
            router = router.route(&route.path, methods);
        }

        match self.fallback_proxy {
            Some(prefix) => router.fallback(proxy_handler(prefix)),
            None => router.fallback(not_found),
        }
    }
}

/// Longest proxy prefix that `path` falls under
pub fn covering_proxy<'a>(prefixes: &'a [String], path: &str) -> Option<&'a str> {
    prefixes
        .iter()
        .filter(|prefix| strip_mount_prefix(path, prefix).is_some())
        .max_by_key(|prefix| prefix.len())
        .map(String::as_str)
}

type ProxyFuture = BoxFuture<'static, Response>;

fn proxy_handler(
    prefix: String,
) -> impl Fn(State<AppState>, Request) -> ProxyFuture + Clone + Send + Sync + 'static {
    move |State(state): State<AppState>, request: Request| {
        let prefix = prefix.clone();
        Box::pin(async move { proxy::forward_request(state, &prefix, request).await })
    }
}

fn method_router(method: RouteMethod, handler: RouteHandler) -> MethodRouter<AppState> {
    let explorer = match handler {
        RouteHandler::Health => get(health),
        RouteHandler::ExplorerSummary => get(explorer_summary),
        RouteHandler::ExplorerBlocks => get(explorer_blocks),
        RouteHandler::ExplorerBlock => get(explorer_block),
        RouteHandler::ExplorerTransactions => get(explorer_transactions),
        RouteHandler::ExplorerTransaction => get(explorer_transaction),
        RouteHandler::ExplorerAccount => get(explorer_account),
        RouteHandler::ExplorerNetwork => get(explorer_network),
        RouteHandler::ExplorerSearch => get(explorer_search),
        RouteHandler::Proxy { prefix } => return any(proxy_handler(prefix)),
    };
    debug_assert_eq!(method, RouteMethod::Get);
    explorer
}

/// JSON 404 for unmatched requests
pub async fn not_found(uri: Uri) -> Response {
    not_found_response(uri.path())
}

/// JSON 404 body naming the requested path
pub fn not_found_response(path: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found", "path": path }))).into_response()
}

/// `limit`/`start` query of list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    limit: Option<String>,
    start: Option<String>,
}

/// `blocks`/`transactions` query of the summary endpoint
#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    blocks: Option<String>,
    transactions: Option<String>,
}

/// `q` query of the search endpoint
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

/// Lenient count parsing: non-numbers fall back to the default, numbers
/// below one clamp up later
pub fn parse_count(raw: Option<&str>) -> Option<usize> {
    let value: i64 = raw?.trim().parse().ok()?;
    Some(usize::try_from(value.max(0)).unwrap_or(usize::MAX))
}

fn upstream_failure(state: &AppState, err: &crate::error::UpstreamError) -> ApiError {
    warn!("Upstream failure: {}", err);
    ApiError::from_upstream(err, !state.config.production)
}

async fn health(State(state): State<AppState>) -> Response {
    let (status, body) = state.health.report().await;
    (status, Json(body)).into_response()
}

async fn explorer_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Response {
    let summary = state
        .explorer
        .summary(parse_count(query.blocks.as_deref()), parse_count(query.transactions.as_deref()))
        .await;
    Json(summary).into_response()
}

async fn explorer_blocks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let start = query.start.as_deref().and_then(|s| s.trim().parse::<u64>().ok());
    let walk = state
        .explorer
        .recent_blocks(parse_count(query.limit.as_deref()), start)
        .await
        .map_err(|e| upstream_failure(&state, &e))?;

    Ok(Json(json!({ "latestHeight": walk.latest_height, "blocks": walk.summaries() })))
}

async fn explorer_block(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.explorer.block_summary(&id).await.map_err(|e| upstream_failure(&state, &e))? {
        Some(summary) => Ok(Json(json!({ "summary": summary }))),
        None => Err(ApiError::not_found("Block not found", "id", &id)),
    }
}

async fn explorer_transactions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let (latest_height, transactions) = state
        .explorer
        .recent_transactions(parse_count(query.limit.as_deref()), None)
        .await
        .map_err(|e| upstream_failure(&state, &e))?;

    Ok(Json(json!({ "latestHeight": latest_height, "transactions": transactions })))
}

async fn explorer_transaction(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let details =
        state.explorer.transaction_details(&hash).await.map_err(|e| upstream_failure(&state, &e))?;
    match details {
        Some((summary, transaction)) => {
            Ok(Json(json!({ "summary": summary, "transaction": transaction })))
        }
        None => Err(ApiError::not_found("Transaction not found", "hash", &hash)),
    }
}

async fn explorer_account(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let account =
        state.explorer.account_details(&address).await.map_err(|e| upstream_failure(&state, &e))?;
    match account {
        Some(account) => Ok(Json(json!({ "account": account }))),
        None => Err(ApiError::not_found("Account not found", "address", &address)),
    }
}

async fn explorer_network(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let network = state.explorer.network().await.map_err(|e| upstream_failure(&state, &e))?;
    Ok(Json(json!({ "network": network })))
}

async fn explorer_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Response {
    let result = state.explorer.search(query.q.as_deref().unwrap_or_default()).await;
    Json(result).into_response()
}
