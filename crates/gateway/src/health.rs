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

//! Gateway health check backed by an upstream probe

use crate::{cache::ResponseCache, origin::OriginClient};
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::warn;

/// Service name reported in health payloads
pub const SERVICE_NAME: &str = "ippan-gateway";

/// Longest upstream body echoed back in a degraded report
const MAX_DETAIL_BODY: usize = 256;

/// Upstream condition as seen by the probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// 2xx with a JSON body
    Healthy,
    /// Answered, but not with a 2xx JSON body
    Degraded,
    /// Timed out or could not be reached
    Unreachable,
}

impl HealthStatus {
    /// HTTP status the gateway answers with
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::Healthy => StatusCode::OK,
            Self::Degraded => StatusCode::BAD_GATEWAY,
            Self::Unreachable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unreachable => "unreachable",
        }
    }
}

/// Health check service
///
/// Probes the upstream health path under its own timeout budget and reports
/// the outcome together with gateway uptime and cache statistics.
pub struct HealthService {
    origin: OriginClient,
    path: String,
    timeout: Duration,
    cache: Arc<ResponseCache>,
    started_at: Instant,
}

impl HealthService {
    /// Creates a new health service instance
    ///
    /// Records the current time as the service start time for uptime calculations.
    ///
    /// # Arguments
    /// * `origin` - Client for the upstream node
    /// * `path` - Upstream health path
    /// * `timeout` - Budget of a single probe
    /// * `cache` - Shared cache, reported in the payload
    pub fn new(
        origin: OriginClient,
        path: String,
        timeout: Duration,
        cache: Arc<ResponseCache>,
    ) -> Self {
        Self { origin, path, timeout, cache, started_at: Instant::now() }
    }

    /// Probes the upstream and classifies the answer
    ///
    /// # Returns
    /// The classification and probe details: the upstream JSON when healthy,
    /// the reason otherwise
    pub async fn probe(&self) -> (HealthStatus, Value) {
        match self.origin.fetch_text_within(&self.path, self.timeout).await {
            Ok((status, body)) if status.is_success() => {
                match serde_json::from_str::<Value>(&body) {
                    Ok(details) => (HealthStatus::Healthy, details),
                    Err(e) => {
                        warn!("Upstream health answered with non-JSON body: {}", e);
                        (
                            HealthStatus::Degraded,
                            json!({
                                "httpStatus": status.as_u16(),
                                "error": format!("invalid JSON: {e}"),
                            }),
                        )
                    }
                }
            }
            Ok((status, body)) => {
                warn!("Upstream health answered with HTTP {}", status);
                (
                    HealthStatus::Degraded,
                    json!({
                        "httpStatus": status.as_u16(),
                        "body": body.chars().take(MAX_DETAIL_BODY).collect::<String>(),
                    }),
                )
            }
            Err(e) => {
                warn!("Upstream health probe failed: {}", e);
                (HealthStatus::Unreachable, json!({ "error": e.to_string(), "kind": e.kind() }))
            }
        }
    }

    /// Full health report
    ///
    /// # Returns
    /// HTTP status and the JSON payload served by the health endpoints
    pub async fn report(&self) -> (StatusCode, Value) {
        let (status, details) = self.probe().await;

        let body = json!({
            "status": status,
            "upstream": self.origin.url_for(&self.path),
            "details": details,
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "uptimeSeconds": self.started_at.elapsed().as_secs(),
            "cache": self.cache.detailed_stats().await,
        });

        (status.status_code(), body)
    }
}
