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

//! Explorer query engine
//!
//! Answers recent blocks, recent transactions, search and single-entity
//! lookups by composing cached upstream reads with the normalizer.

use crate::{
    cache::{FetchResult, ResponseCache},
    config::GatewayConfig,
    error::UpstreamError,
    normalize::{
        as_u64_lenient, block_transactions, normalize_hex_key, to_block_summary, to_hex,
        to_network_summary, to_transaction_summary, unwrap_envelope, BlockSummary, NetworkSummary,
        TransactionSummary, TxContext,
    },
    origin::OriginClient,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::{collections::HashSet, sync::Arc, time::Duration};
use tracing::{debug, warn};

/// Walk attempts allowed per requested block
const WALK_ATTEMPTS_PER_BLOCK: usize = 5;
/// Blocks walked per requested transaction when no blocks are supplied
const BLOCKS_PER_TRANSACTION: usize = 2;

/// Count bounds for list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExplorerLimits {
    /// Upper bound for block counts
    pub max_blocks: usize,
    /// Block count when none is requested
    pub default_blocks: usize,
    /// Upper bound for transaction counts
    pub max_transactions: usize,
    /// Transaction count when none is requested
    pub default_transactions: usize,
}

impl From<&GatewayConfig> for ExplorerLimits {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            max_blocks: config.max_blocks,
            default_blocks: config.default_blocks,
            max_transactions: config.max_transactions,
            default_transactions: config.default_transactions,
        }
    }
}

/// A block found by a walk, with the raw document kept for flattening
#[derive(Debug, Clone)]
pub struct WalkedBlock {
    /// Normalized view
    pub summary: BlockSummary,
    /// Upstream document
    pub raw: Value,
}

/// Result of a recent-blocks walk
#[derive(Debug, Clone, Default)]
pub struct BlockWalk {
    /// Height reported by the node, if known
    pub latest_height: Option<u64>,
    /// Blocks in descending height order
    pub blocks: Vec<WalkedBlock>,
}

impl BlockWalk {
    /// Summaries only
    pub fn summaries(&self) -> Vec<BlockSummary> {
        self.blocks.iter().map(|b| b.summary.clone()).collect()
    }
}

/// Overview served by the summary endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerSummary {
    /// `ok`, or `degraded` when the node status could not be read
    pub status: &'static str,
    /// When the overview was assembled
    pub fetched_at: String,
    /// Height reported by the node
    pub latest_height: Option<u64>,
    /// Node status projection
    pub network: Option<NetworkSummary>,
    /// Most recent blocks
    pub blocks: Vec<BlockSummary>,
    /// Most recent transactions from those blocks
    pub transactions: Vec<TransactionSummary>,
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SearchMatch {
    /// Block found by height or id
    Block {
        /// How it was looked up: `height` or `id`
        lookup: &'static str,
        /// Normalized block
        summary: BlockSummary,
    },
    /// Transaction found by hash
    Transaction {
        /// Always `hash`
        lookup: &'static str,
        /// Normalized transaction
        summary: TransactionSummary,
    },
    /// Account found by address
    Account {
        /// Always `address`
        lookup: &'static str,
        /// Upstream account document
        account: Value,
    },
}

/// Search response
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// The trimmed query
    pub query: String,
    /// All hits, possibly empty
    pub matches: Vec<SearchMatch>,
}

/// Explorer query engine over a shared cache and origin client
pub struct ExplorerService {
    origin: OriginClient,
    cache: Arc<ResponseCache>,
    ttl: Duration,
    health_path: String,
    limits: ExplorerLimits,
}

impl ExplorerService {
    /// Creates an explorer service
    ///
    /// # Arguments
    /// * `origin` - Client for the upstream node
    /// * `cache` - Shared response cache
    /// * `config` - Gateway configuration, for TTL, limits and the health path
    pub fn new(origin: OriginClient, cache: Arc<ResponseCache>, config: &GatewayConfig) -> Self {
        Self {
            origin,
            cache,
            ttl: config.cache_ttl,
            health_path: config.upstream_health_path.clone(),
            limits: ExplorerLimits::from(config),
        }
    }

    /// Configured count bounds
    pub fn limits(&self) -> ExplorerLimits {
        self.limits
    }

    async fn cached(&self, key: String, path: String) -> FetchResult {
        let origin = self.origin.clone();
        let fetch = move || async move { origin.fetch_json(&path, true).await };
        self.cache.get_or_fetch(&key, self.ttl, fetch).await
    }

    /// Raw block by id or height, `None` when unknown upstream
    pub async fn block(&self, id_or_height: &str) -> FetchResult {
        let Some(key) = lookup_key(id_or_height) else {
            return Ok(None);
        };
        self.cached(format!("block:{key}"), format!("/block/{key}")).await
    }

    /// Raw transaction by hash, `None` when unknown upstream
    pub async fn transaction(&self, hash: &str) -> FetchResult {
        let Some(key) = lookup_key(hash) else {
            return Ok(None);
        };
        self.cached(format!("tx:{key}"), format!("/tx/{key}")).await
    }

    /// Raw account by address, `None` when unknown upstream
    pub async fn account(&self, address: &str) -> FetchResult {
        let Some(key) = lookup_key(address) else {
            return Ok(None);
        };
        self.cached(format!("account:{key}"), format!("/account/{key}")).await
    }

    /// Raw node status document
    pub async fn network_status(&self) -> FetchResult {
        self.cached("network:health".to_string(), self.health_path.clone()).await
    }

    /// Node status projection
    pub async fn network(&self) -> Result<Option<NetworkSummary>, UpstreamError> {
        Ok(self.network_status().await?.as_ref().and_then(to_network_summary))
    }

    /// Block summary by id or height
    pub async fn block_summary(
        &self,
        id_or_height: &str,
    ) -> Result<Option<BlockSummary>, UpstreamError> {
        Ok(self.block(id_or_height).await?.as_ref().and_then(to_block_summary))
    }

    /// Transaction summary and unwrapped document by hash
    pub async fn transaction_details(
        &self,
        hash: &str,
    ) -> Result<Option<(TransactionSummary, Value)>, UpstreamError> {
        let Some(raw) = self.transaction(hash).await? else {
            return Ok(None);
        };
        let context = envelope_context(&raw);
        Ok(to_transaction_summary(&raw, &context)
            .map(|summary| (summary, unwrap_envelope(&raw).clone())))
    }

    /// Unwrapped account document by address
    pub async fn account_details(&self, address: &str) -> Result<Option<Value>, UpstreamError> {
        Ok(self.account(address).await?.map(|raw| unwrap_envelope(&raw).clone()))
    }

    /// Recent blocks, newest first
    ///
    /// # Arguments
    /// * `limit` - Requested count, clamped to `[1, max_blocks]`
    /// * `start` - Highest height to consider; lowered to the node height when above it
    pub async fn recent_blocks(
        &self,
        limit: Option<usize>,
        start: Option<u64>,
    ) -> Result<BlockWalk, UpstreamError> {
        let count = clamp_count(limit, self.limits.default_blocks, self.limits.max_blocks);
        let latest_height = match self.network().await {
            Ok(network) => network.and_then(|n| n.latest_height),
            // An explicit start still lets the walk proceed
            Err(e) if start.is_some() => {
                warn!("Node status unavailable, walking from requested start: {}", e);
                None
            }
            Err(e) => return Err(e),
        };

        let blocks = self.walk_blocks(count, walk_start(start, latest_height)).await;
        Ok(BlockWalk { latest_height, blocks })
    }

    /// Walks downward from `start` until `count` blocks or the attempt budget
    ///
    /// Missing heights and failed lookups are skipped.
    async fn walk_blocks(&self, count: usize, start: Option<u64>) -> Vec<WalkedBlock> {
        let Some(mut height) = start else {
            return Vec::new();
        };

        let budget = count.saturating_mul(WALK_ATTEMPTS_PER_BLOCK);
        let mut blocks = Vec::with_capacity(count);
        let mut seen = HashSet::new();
        let mut attempts = 0;

        while blocks.len() < count && attempts < budget {
            attempts += 1;

            match self.block(&height.to_string()).await {
                Ok(Some(raw)) => {
                    if let Some(mut summary) = to_block_summary(&raw) {
                        summary.height = summary.height.or(Some(height));
                        let identity = summary.id.clone().unwrap_or_else(|| format!("#{height}"));
                        if seen.insert(identity) {
                            blocks.push(WalkedBlock { summary, raw });
                        }
                    }
                }
                Ok(None) => debug!("No block at height {}", height),
                Err(e) => warn!("Skipping height {}: {}", height, e),
            }

            if height == 0 {
                break;
            }
            height -= 1;
        }

        blocks.sort_by(|a, b| b.summary.height.cmp(&a.summary.height));
        debug!("Walk found {} of {} blocks in {} attempts", blocks.len(), count, attempts);
        blocks
    }

    /// Recent transactions, newest block first, block order within a block
    ///
    /// # Arguments
    /// * `limit` - Requested count, clamped to `[1, max_transactions]`
    /// * `blocks` - Already walked blocks to reuse instead of walking again
    pub async fn recent_transactions(
        &self,
        limit: Option<usize>,
        blocks: Option<&[WalkedBlock]>,
    ) -> Result<(Option<u64>, Vec<TransactionSummary>), UpstreamError> {
        let count =
            clamp_count(limit, self.limits.default_transactions, self.limits.max_transactions);

        match blocks {
            Some(blocks) => Ok((None, flatten_transactions(blocks, count))),
            None => {
                let walk_size =
                    count.saturating_mul(BLOCKS_PER_TRANSACTION).min(self.limits.max_blocks);
                let walk = self.recent_blocks(Some(walk_size), None).await?;
                Ok((walk.latest_height, flatten_transactions(&walk.blocks, count)))
            }
        }
    }

    /// Overview of the node and its most recent activity
    pub async fn summary(
        &self,
        blocks: Option<usize>,
        transactions: Option<usize>,
    ) -> ExplorerSummary {
        let block_count = clamp_count(blocks, self.limits.default_blocks, self.limits.max_blocks);
        let tx_count = clamp_count(
            transactions,
            self.limits.default_transactions,
            self.limits.max_transactions,
        );

        let (status, network) = match self.network().await {
            Ok(network) => ("ok", network),
            Err(e) => {
                warn!("Node status unavailable for summary: {}", e);
                ("degraded", None)
            }
        };
        let latest_height = network.as_ref().and_then(|n| n.latest_height);

        let walked = self.walk_blocks(block_count, latest_height).await;
        let transactions = flatten_transactions(&walked, tx_count);

        ExplorerSummary {
            status,
            fetched_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            latest_height,
            network,
            blocks: walked.into_iter().map(|b| b.summary).collect(),
            transactions,
        }
    }

    /// Resolves free-form input to blocks, transactions and accounts
    ///
    /// Digits look up a block height. A 64-digit hex string is tried as a
    /// block id, a transaction hash and an account address concurrently.
    /// Anything else has no matches.
    pub async fn search(&self, query: &str) -> SearchResult {
        let query = query.trim().to_string();
        let mut matches = Vec::new();

        if query.is_empty() {
            return SearchResult { query, matches };
        }

        if query.bytes().all(|b| b.is_ascii_digit()) && query.parse::<u64>().is_ok() {
            match self.block_summary(&query).await {
                Ok(Some(summary)) => matches.push(SearchMatch::Block { lookup: "height", summary }),
                Ok(None) => {}
                Err(e) => warn!("Search block-by-height failed for {}: {}", query, e),
            }
            return SearchResult { query, matches };
        }

        let Some(key) = normalize_hex_key(&query) else {
            return SearchResult { query, matches };
        };

        let (block, transaction, account) = tokio::join!(
            self.block_summary(&key),
            self.transaction_details(&key),
            self.account_details(&key),
        );

        match block {
            Ok(Some(summary)) => matches.push(SearchMatch::Block { lookup: "id", summary }),
            Ok(None) => {}
            Err(e) => warn!("Search block-by-id failed for {}: {}", key, e),
        }
        match transaction {
            Ok(Some((summary, _))) => {
                matches.push(SearchMatch::Transaction { lookup: "hash", summary })
            }
            Ok(None) => {}
            Err(e) => warn!("Search transaction-by-hash failed for {}: {}", key, e),
        }
        match account {
            Ok(Some(account)) => matches.push(SearchMatch::Account { lookup: "address", account }),
            Ok(None) => {}
            Err(e) => warn!("Search account-by-address failed for {}: {}", key, e),
        }

        SearchResult { query, matches }
    }
}

/// Clamps a requested count to `[1, max]`, `default` when absent
pub fn clamp_count(requested: Option<usize>, default: usize, max: usize) -> usize {
    requested.unwrap_or(default).clamp(1, max.max(1))
}

/// Starting height of a walk: the lower of the override and the node height
pub fn walk_start(start: Option<u64>, latest: Option<u64>) -> Option<u64> {
    match (start, latest) {
        (Some(start), Some(latest)) => Some(start.min(latest)),
        (start, latest) => start.or(latest),
    }
}

/// Canonical upstream key of an id, hash, height or address
///
/// 64-digit hex is lowercased without `0x`; other alphanumeric keys pass
/// through. Anything that could escape the upstream path is refused.
pub fn lookup_key(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Some(key) = normalize_hex_key(raw) {
        return Some(key);
    }
    (!raw.is_empty() && raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-'))
        .then(|| raw.to_string())
}

fn flatten_transactions(blocks: &[WalkedBlock], count: usize) -> Vec<TransactionSummary> {
    let mut out = Vec::with_capacity(count);
    for block in blocks {
        for (index, raw) in block_transactions(&block.raw).iter().enumerate() {
            if out.len() >= count {
                return out;
            }
            if let Some(summary) =
                to_transaction_summary(raw, &TxContext::in_block(&block.summary, index))
            {
                out.push(summary);
            }
        }
    }
    out
}

/// Block placement carried next to a transaction envelope, if any
fn envelope_context(raw: &Value) -> TxContext {
    let height = raw.get("block_height").or_else(|| raw.get("blockHeight"));
    TxContext {
        block_id: raw.get("block_id").or_else(|| raw.get("blockId")).and_then(to_hex),
        block_height: height.and_then(as_u64_lenient),
        index_in_block: raw
            .get("index")
            .or_else(|| raw.get("index_in_block"))
            .and_then(Value::as_u64)
            .and_then(|i| usize::try_from(i).ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_common::logging::ensure_test_logging;
    use serde_json::json;
    use tracing::info;
    use wiremock::{
        matchers::{method, path, path_regex},
        Mock, MockServer, ResponseTemplate,
    };

    fn block_at(height: u64, tx_count: usize) -> Value {
        let transactions: Vec<Value> = (0..tx_count)
            .map(|i| json!({"id": format!("{height:02}{i:062}"), "amount": i, "nonce": i}))
            .collect();
        json!({
            "header": {"id": vec![height as u8; 32], "round": height, "creator": vec![1u8; 32]},
            "transactions": transactions,
        })
    }

    async fn service(server: &MockServer) -> ExplorerService {
        let config =
            GatewayConfig { upstream_url: server.uri(), ..Default::default() }.normalized();
        let origin = OriginClient::new(&config.upstream_url, config.timeout).unwrap();
        ExplorerService::new(origin, Arc::new(ResponseCache::new(1000)), &config)
    }

    async fn mount_health(server: &MockServer, height: u64) {
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "peer_count": 2,
                "consensus": {"latest_block_height": height},
            })))
            .mount(server)
            .await;
    }

    async fn mount_block(server: &MockServer, height: u64, tx_count: usize) {
        Mock::given(method("GET"))
            .and(path(format!("/block/{height}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(block_at(height, tx_count)))
            .mount(server)
            .await;
    }

    #[test]
    fn test_clamp_and_start() {
        assert_eq!(clamp_count(None, 10, 100), 10);
        assert_eq!(clamp_count(Some(0), 10, 100), 1);
        assert_eq!(clamp_count(Some(500), 10, 100), 100);

        assert_eq!(walk_start(Some(50), Some(40)), Some(40));
        assert_eq!(walk_start(Some(30), Some(40)), Some(30));
        assert_eq!(walk_start(None, Some(40)), Some(40));
        assert_eq!(walk_start(Some(7), None), Some(7));
        assert_eq!(walk_start(None, None), None);
    }

    #[test]
    fn test_lookup_key() {
        assert_eq!(lookup_key("42").as_deref(), Some("42"));
        assert_eq!(lookup_key(&format!("0x{}", "AB".repeat(32))), Some("ab".repeat(32)));
        assert_eq!(lookup_key("iAbc_9-x").as_deref(), Some("iAbc_9-x"));
        assert_eq!(lookup_key("../admin"), None);
        assert_eq!(lookup_key("a b"), None);
        assert_eq!(lookup_key(""), None);
    }

    #[tokio::test]
    async fn test_recent_blocks_walk_descending() {
        ensure_test_logging(None);
        info!("Testing recent-blocks walk");

        let server = MockServer::start().await;
        mount_health(&server, 10).await;
        for height in [10, 9, 7] {
            mount_block(&server, height, 0).await;
        }
        Mock::given(path_regex(r"^/block/\d+$"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let explorer = service(&server).await;
        let walk = explorer.recent_blocks(Some(3), None).await.unwrap();

        assert_eq!(walk.latest_height, Some(10));
        let heights: Vec<_> = walk.blocks.iter().map(|b| b.summary.height).collect();
        assert_eq!(heights, vec![Some(10), Some(9), Some(7)]);
    }

    #[tokio::test]
    async fn test_walk_over_gap_stops_at_attempt_budget() {
        ensure_test_logging(None);

        let server = MockServer::start().await;
        mount_health(&server, 100).await;
        mount_block(&server, 100, 0).await;
        // Heights 99..=50 are missing, the budget of 50 attempts runs out first
        mount_block(&server, 49, 0).await;
        Mock::given(path_regex(r"^/block/\d+$"))
            .respond_with(ResponseTemplate::new(404))
            .expect(49)
            .mount(&server)
            .await;

        let explorer = service(&server).await;
        let walk = explorer.recent_blocks(Some(10), None).await.unwrap();

        assert_eq!(walk.blocks.len(), 1);
        assert!(walk.blocks.len() < 10);
    }

    #[tokio::test]
    async fn test_walk_respects_start_override_and_zero() {
        ensure_test_logging(None);

        let server = MockServer::start().await;
        mount_health(&server, 100).await;
        mount_block(&server, 1, 0).await;
        mount_block(&server, 0, 0).await;

        let explorer = service(&server).await;
        let walk = explorer.recent_blocks(Some(5), Some(1)).await.unwrap();

        let heights: Vec<_> = walk.blocks.iter().map(|b| b.summary.height).collect();
        assert_eq!(heights, vec![Some(1), Some(0)]);
    }

    #[tokio::test]
    async fn test_walk_without_height_is_empty() {
        ensure_test_logging(None);

        let server = MockServer::start().await;
        Mock::given(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let explorer = service(&server).await;
        let walk = explorer.recent_blocks(None, None).await.unwrap();
        assert!(walk.blocks.is_empty());
        assert_eq!(walk.latest_height, None);
    }

    #[tokio::test]
    async fn test_recent_transactions_flatten_in_block_order() {
        ensure_test_logging(None);

        let server = MockServer::start().await;
        mount_health(&server, 5).await;
        mount_block(&server, 5, 2).await;
        mount_block(&server, 4, 0).await;
        mount_block(&server, 3, 3).await;

        let explorer = service(&server).await;
        let (latest, txs) = explorer.recent_transactions(Some(4), None).await.unwrap();

        assert_eq!(latest, Some(5));
        assert_eq!(txs.len(), 4);
        let placement: Vec<_> = txs.iter().map(|t| (t.block_height, t.index_in_block)).collect();
        assert_eq!(
            placement,
            vec![(Some(5), Some(0)), (Some(5), Some(1)), (Some(3), Some(0)), (Some(3), Some(1))]
        );
    }

    #[tokio::test]
    async fn test_search_by_height() {
        ensure_test_logging(None);

        let server = MockServer::start().await;
        mount_block(&server, 123, 0).await;

        let explorer = service(&server).await;
        let result = explorer.search(" 123 ").await;

        assert_eq!(result.query, "123");
        assert_eq!(result.matches.len(), 1);
        assert!(matches!(&result.matches[0], SearchMatch::Block { lookup: "height", .. }));
    }

    #[tokio::test]
    async fn test_search_hex_fans_out() {
        ensure_test_logging(None);

        let server = MockServer::start().await;
        let key = "ab".repeat(32);
        Mock::given(path(format!("/block/{key}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(block_at(8, 0)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path(format!("/tx/{key}")))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path(format!("/account/{key}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"account": {"address": key, "balance": 5, "nonce": 1}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let explorer = service(&server).await;
        let result = explorer.search(&format!("0x{}", key.to_uppercase())).await;

        assert_eq!(result.matches.len(), 2);
        assert!(matches!(&result.matches[0], SearchMatch::Block { lookup: "id", .. }));
        match &result.matches[1] {
            SearchMatch::Account { account, .. } => assert_eq!(account["balance"], 5),
            other => panic!("unexpected match: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_search_failures_and_garbage() {
        ensure_test_logging(None);

        let server = MockServer::start().await;
        Mock::given(path_regex(r"^/(block|tx|account)/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let explorer = service(&server).await;
        assert!(explorer.search(&"cd".repeat(32)).await.matches.is_empty());
        assert!(explorer.search("").await.matches.is_empty());
        assert!(explorer.search("not a key").await.matches.is_empty());
    }

    #[tokio::test]
    async fn test_lookups_are_cached() {
        ensure_test_logging(None);

        let server = MockServer::start().await;
        Mock::given(path("/block/3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(block_at(3, 0)))
            .expect(1)
            .mount(&server)
            .await;

        let explorer = service(&server).await;
        for _ in 0..3 {
            assert!(explorer.block_summary("3").await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_summary_degrades_without_node_status() {
        ensure_test_logging(None);

        let server = MockServer::start().await;
        Mock::given(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let explorer = service(&server).await;
        let summary = explorer.summary(None, None).await;

        assert_eq!(summary.status, "degraded");
        assert!(summary.blocks.is_empty());
        assert!(summary.network.is_none());
    }
}
