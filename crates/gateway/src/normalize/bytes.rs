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

//! Byte-like JSON decoding
//!
//! The node serializes fixed-size arrays (ids, creators, hash timers) as JSON
//! arrays of numbers, while intermediaries may re-encode them as hex strings,
//! Node.js `Buffer` dumps or index-keyed objects. All of them decode here.

use serde_json::{Map, Value};

/// Length of a hex-encoded 32-byte identifier
pub const HEX_ID_LEN: usize = 64;

/// Decodes any byte-like JSON value
///
/// Accepted shapes:
/// - `[1, 2, 3]` with every element in `0..=255`
/// - `"0a0b"` or `"0x0a0b"`
/// - `{"type": "Buffer", "data": [..]}`
/// - `{"bytes": [..]}`
/// - `{"0": 1, "1": 2}` with contiguous indices
///
/// Anything else, including partially valid input, yields `None`.
pub fn bytes_from_value(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Array(items) => items.iter().map(byte_from_value).collect(),
        Value::String(s) => bytes_from_hex(s),
        Value::Object(map) => bytes_from_object(map),
        _ => None,
    }
}

fn byte_from_value(value: &Value) -> Option<u8> {
    value.as_u64().and_then(|n| u8::try_from(n).ok())
}

fn bytes_from_object(map: &Map<String, Value>) -> Option<Vec<u8>> {
    if map.get("type").and_then(Value::as_str) == Some("Buffer") {
        return map.get("data").filter(|data| data.is_array()).and_then(bytes_from_value);
    }
    if let Some(inner) = map.get("bytes") {
        return if map.len() == 1 { bytes_from_value(inner) } else { None };
    }
    if map.is_empty() {
        return None;
    }

    // Index-keyed: {"0": .., "1": .., ..}
    let mut bytes = vec![None; map.len()];
    for (key, value) in map {
        let index: usize = key.parse().ok()?;
        let slot = bytes.get_mut(index)?;
        *slot = Some(byte_from_value(value)?);
    }
    bytes.into_iter().collect()
}

/// Decodes a hex string, with or without `0x`
///
/// Empty input and odd lengths yield `None`.
pub fn bytes_from_hex(raw: &str) -> Option<Vec<u8>> {
    let digits = strip_hex_prefix(raw.trim());
    if digits.is_empty() {
        return None;
    }
    hex::decode(digits).ok()
}

/// Lowercase hex of a byte-like value
pub fn to_hex(value: &Value) -> Option<String> {
    bytes_from_value(value).filter(|bytes| !bytes.is_empty()).map(hex::encode)
}

/// Canonical form of a 32-byte hex key: lowercase, no `0x`
///
/// Returns `None` unless the input is exactly 64 hex digits.
pub fn normalize_hex_key(raw: &str) -> Option<String> {
    let digits = strip_hex_prefix(raw.trim());
    (digits.len() == HEX_ID_LEN && digits.bytes().all(|b| b.is_ascii_hexdigit()))
        .then(|| digits.to_ascii_lowercase())
}

fn strip_hex_prefix(raw: &str) -> &str {
    raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")).unwrap_or(raw)
}
