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

//! HashTimer and timestamp decoding

use super::bytes::{bytes_from_hex, bytes_from_value};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

/// Bytes of the big-endian microsecond prefix
pub const TIME_PREFIX_LEN: usize = 7;
/// Bytes of the hash suffix
pub const HASH_SUFFIX_LEN: usize = 25;
const HASH_TIMER_LEN: usize = TIME_PREFIX_LEN + HASH_SUFFIX_LEN;

/// Keys under which wrapped timestamps are found
const TIMESTAMP_KEYS: &[&str] = &["0", "micros", "microseconds", "timestamp_us", "us"];

/// Display form of a HashTimer; every field is null when undecodable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HashTimerView {
    /// 64 lowercase hex digits, prefix then suffix
    pub hex: Option<String>,
    /// Microseconds encoded in the time prefix
    pub microseconds: Option<u64>,
    /// The prefix rendered as ISO-8601
    pub iso8601: Option<String>,
}

/// Display form of a microsecond timestamp
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampView {
    /// Microseconds since the Unix epoch
    pub microseconds: Option<u64>,
    /// ISO-8601 rendering with microsecond precision
    pub iso8601: Option<String>,
}

impl TimestampView {
    fn from_micros(micros: u64) -> Self {
        Self { microseconds: Some(micros), iso8601: micros_to_iso8601(micros) }
    }
}

/// Decodes a HashTimer
///
/// Accepts `{time_prefix, hash_suffix}` (or camelCase) byte-like pairs of
/// 7 and 25 bytes, or a 64-digit hex string.
pub fn decode_hash_timer(raw: &Value) -> HashTimerView {
    let bytes = match raw {
        Value::String(s) => bytes_from_hex(s),
        Value::Object(map) => {
            let prefix = map.get("time_prefix").or_else(|| map.get("timePrefix"));
            let suffix = map.get("hash_suffix").or_else(|| map.get("hashSuffix"));
            match (prefix.and_then(bytes_from_value), suffix.and_then(bytes_from_value)) {
                (Some(prefix), Some(suffix))
                    if prefix.len() == TIME_PREFIX_LEN && suffix.len() == HASH_SUFFIX_LEN =>
                {
                    Some([prefix, suffix].concat())
                }
                _ => None,
            }
        }
        _ => None,
    };

    match bytes {
        Some(bytes) if bytes.len() == HASH_TIMER_LEN => {
            let mut be = [0u8; 8];
            be[1..].copy_from_slice(&bytes[..TIME_PREFIX_LEN]);
            let micros = u64::from_be_bytes(be);
            HashTimerView {
                hex: Some(hex::encode(&bytes)),
                microseconds: Some(micros),
                iso8601: micros_to_iso8601(micros),
            }
        }
        _ => HashTimerView::default(),
    }
}

/// Decodes a microsecond timestamp
///
/// Accepts an integer, a numeric string, a single-element array, or an
/// object wrapping the value under `0`, `micros`, `microseconds`,
/// `timestamp_us` or `us`.
pub fn decode_timestamp(raw: &Value) -> TimestampView {
    timestamp_micros(raw).map(TimestampView::from_micros).unwrap_or_default()
}

fn timestamp_micros(raw: &Value) -> Option<u64> {
    match raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(items) if items.len() == 1 => timestamp_micros(&items[0]),
        Value::Object(map) => {
            TIMESTAMP_KEYS.iter().find_map(|key| map.get(*key)).and_then(timestamp_micros)
        }
        _ => None,
    }
}

/// ISO-8601 rendering of microseconds since the epoch
pub fn micros_to_iso8601(micros: u64) -> Option<String> {
    let micros = i64::try_from(micros).ok()?;
    DateTime::<Utc>::from_timestamp_micros(micros)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Micros, true))
}
