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

//! Conversion of upstream node payloads into the public explorer schema
//!
//! Everything here is a pure function over [`serde_json::Value`]. Missing or
//! malformed fields become `None`/null instead of errors, so a partially
//! understood block still renders.

pub mod bytes;
pub mod time;

pub use bytes::{bytes_from_hex, bytes_from_value, normalize_hex_key, to_hex};
pub use time::{decode_hash_timer, decode_timestamp, HashTimerView, TimestampView};

use serde::Serialize;
use serde_json::Value;

/// Keys under which the node (or a proxy in front of it) wraps single entities
const ENVELOPE_KEYS: &[&str] = &["block", "transaction", "tx", "account"];

/// Public view of a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    /// Block id, lowercase hex
    pub id: Option<String>,
    /// Height, falling back to the consensus round
    pub height: Option<u64>,
    /// Consensus round the block was created in
    pub round: Option<u64>,
    /// Validator that produced the block
    pub creator_id: Option<String>,
    /// Number of transactions carried or referenced
    pub transaction_count: usize,
    /// Decoded block HashTimer
    pub hash_timer: HashTimerView,
    /// Block signature, lowercase hex
    pub signature: Option<String>,
    /// Parent block ids
    pub parent_ids: Vec<String>,
    /// Payload (transaction) ids
    pub payload_ids: Vec<String>,
}

/// Public view of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    /// Transaction hash
    pub id: Option<String>,
    /// Sender address
    pub from: Option<String>,
    /// Recipient address
    pub to: Option<String>,
    /// Amount in atomic units, as a decimal string
    pub amount: Option<String>,
    /// Sender nonce
    pub nonce: Option<u64>,
    /// `public` or `confidential`
    pub visibility: String,
    /// Decoded transaction HashTimer
    pub hash_timer: HashTimerView,
    /// Submission timestamp
    pub timestamp: TimestampView,
    /// Containing block, when known
    pub block_id: Option<String>,
    /// Height of the containing block, when known
    pub block_height: Option<u64>,
    /// Position inside the containing block, when known
    pub index_in_block: Option<usize>,
}

/// Where a transaction was found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxContext {
    /// Containing block id
    pub block_id: Option<String>,
    /// Containing block height
    pub block_height: Option<u64>,
    /// Index in the block's transaction list
    pub index_in_block: Option<usize>,
}

impl TxContext {
    /// Context of the `index`-th transaction of a summarized block
    pub fn in_block(block: &BlockSummary, index: usize) -> Self {
        Self { block_id: block.id.clone(), block_height: block.height, index_in_block: Some(index) }
    }
}

/// Public view of the node health payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSummary {
    /// Node-reported status string
    pub status: Option<String>,
    /// Node identifier
    pub node_id: Option<String>,
    /// Node uptime
    pub uptime_seconds: Option<u64>,
    /// Connected peers
    pub peer_count: Option<u64>,
    /// Pending transactions
    pub mempool_size: Option<u64>,
    /// Raw consensus section
    pub consensus: Option<Value>,
    /// Raw L2 configuration section
    pub l2: Option<Value>,
    /// Latest known block height
    pub latest_height: Option<u64>,
}

/// Strips a single-entity envelope such as `{"block": {..}}`
pub fn unwrap_envelope(raw: &Value) -> &Value {
    if let Value::Object(map) = raw {
        if let Some(inner) = ENVELOPE_KEYS.iter().find_map(|key| map.get(*key)) {
            if inner.is_object() {
                return inner;
            }
        }
    }
    raw
}

/// Summarizes an upstream block, `None` without a `header` object
pub fn to_block_summary(raw: &Value) -> Option<BlockSummary> {
    let block = unwrap_envelope(raw);
    let header = block.get("header").filter(|h| h.is_object())?;

    let round = header.get("round").and_then(as_u64_lenient);
    let height = header
        .get("height")
        .and_then(as_u64_lenient)
        .or_else(|| block.get("height").and_then(as_u64_lenient))
        .or(round);

    let payload_ids = hex_list(header.get("payload_ids"));
    let transaction_count = match block.get("transactions").and_then(Value::as_array) {
        Some(txs) if !txs.is_empty() => txs.len(),
        _ => payload_ids.len(),
    };

    Some(BlockSummary {
        id: header
            .get("id")
            .or_else(|| block.get("id"))
            .or_else(|| block.get("hash"))
            .and_then(identifier),
        height,
        round,
        creator_id: header.get("creator").or_else(|| header.get("creator_id")).and_then(identifier),
        transaction_count,
        hash_timer: header
            .get("hashtimer")
            .or_else(|| header.get("hash_timer"))
            .map(decode_hash_timer)
            .unwrap_or_default(),
        signature: block.get("signature").and_then(to_hex),
        parent_ids: hex_list(header.get("parent_ids")),
        payload_ids,
    })
}

/// Transactions embedded in an upstream block
pub fn block_transactions(raw: &Value) -> &[Value] {
    unwrap_envelope(raw)
        .get("transactions")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Summarizes an upstream transaction, `None` unless it is an object
pub fn to_transaction_summary(raw: &Value, context: &TxContext) -> Option<TransactionSummary> {
    let tx = unwrap_envelope(raw);
    if !tx.is_object() {
        return None;
    }

    let visibility = tx
        .get("visibility")
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "public".to_string());

    Some(TransactionSummary {
        id: tx.get("id").or_else(|| tx.get("hash")).and_then(identifier),
        from: tx.get("from").and_then(identifier),
        to: tx.get("to").and_then(identifier),
        amount: tx.get("amount").and_then(amount_string),
        nonce: tx.get("nonce").and_then(as_u64_lenient),
        visibility,
        hash_timer: tx
            .get("hashtimer")
            .or_else(|| tx.get("hash_timer"))
            .map(decode_hash_timer)
            .unwrap_or_default(),
        timestamp: tx.get("timestamp").map(decode_timestamp).unwrap_or_default(),
        block_id: context.block_id.clone(),
        block_height: context.block_height,
        index_in_block: context.index_in_block,
    })
}

/// Summarizes the node health payload, `None` unless it is an object
pub fn to_network_summary(raw: &Value) -> Option<NetworkSummary> {
    if !raw.is_object() {
        return None;
    }
    let consensus = raw.get("consensus").filter(|c| c.is_object()).cloned();

    let latest_height = consensus
        .as_ref()
        .and_then(|c| c.get("latest_block_height"))
        .or_else(|| raw.get("latest_block_height"))
        .or_else(|| raw.get("last_finalized_round"))
        .or_else(|| consensus.as_ref().and_then(|c| c.get("current_round")))
        .and_then(as_u64_lenient);

    Some(NetworkSummary {
        status: raw.get("status").and_then(Value::as_str).map(str::to_string),
        node_id: raw.get("node_id").and_then(identifier),
        uptime_seconds: raw.get("uptime_secs").and_then(as_u64_lenient),
        peer_count: raw.get("peer_count").and_then(as_u64_lenient),
        mempool_size: raw.get("mempool_size").and_then(as_u64_lenient),
        consensus,
        l2: raw.get("l2_config").or_else(|| raw.get("l2")).filter(|v| !v.is_null()).cloned(),
        latest_height,
    })
}

/// Unsigned integer from a number or a numeric string
pub fn as_u64_lenient(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Byte-like values as hex, other non-empty strings verbatim
fn identifier(value: &Value) -> Option<String> {
    to_hex(value).or_else(|| {
        value.as_str().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
    })
}

fn hex_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map_or_else(Vec::new, |ids| ids.iter().filter_map(to_hex).collect())
}

fn amount_string(value: &Value) -> Option<String> {
    match value {
        // Exact digits are preserved for amounts beyond u64
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let digits: String = s.trim().chars().filter(|c| *c != '_').collect();
            (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then_some(digits)
        }
        _ => None,
    }
}
