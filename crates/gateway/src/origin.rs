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

//! HTTP client for the upstream IPPAN node
//!
//! Every call runs under its own timer. When the timer fires the request
//! future is dropped, which also drops the underlying connection.

use crate::error::UpstreamError;
use axum::{
    body::Bytes,
    http::{header, HeaderMap, HeaderName, Method, StatusCode},
};
use eyre::Result;
use serde_json::Value;
use std::{future::Future, time::Duration};
use tracing::debug;

/// Longest upstream error body kept in [`UpstreamError::HttpStatus`]
const MAX_ERROR_BODY: usize = 512;

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Response of a raw passthrough call
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// Upstream status, passed to the client as is
    pub status: StatusCode,
    /// Upstream headers minus hop-by-hop ones
    pub headers: HeaderMap,
    /// Full upstream body
    pub body: Bytes,
}

/// Timeout-bounded client for a single upstream origin
#[derive(Debug, Clone)]
pub struct OriginClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OriginClient {
    /// Creates a client for the given origin
    ///
    /// # Arguments
    /// * `base_url` - Upstream base URL, e.g. `http://127.0.0.1:8080`
    /// * `timeout` - Budget of every call that does not pass its own
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), timeout })
    }

    /// Upstream base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Default per-call budget
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Absolute upstream URL of a path
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// WebSocket URL of a path on the upstream, `http` mapped to `ws`
    pub fn websocket_url(&self, path_and_query: &str) -> String {
        let url = self.url_for(path_and_query);
        if let Some(rest) = url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            url
        }
    }

    /// GETs a JSON document
    ///
    /// # Arguments
    /// * `path` - Upstream path, e.g. `/block/42`
    /// * `allow_not_found` - Report a 404 as `Ok(None)` instead of an error
    ///
    /// # Returns
    /// The decoded body, or `None` for an allowed 404
    pub async fn fetch_json(
        &self,
        path: &str,
        allow_not_found: bool,
    ) -> Result<Option<Value>, UpstreamError> {
        let url = self.url_for(path);
        debug!("Fetching upstream JSON: {}", url);

        self.bounded(&url, self.timeout, async {
            let response = self.client.get(&url).send().await.map_err(|e| transport(&url, e))?;
            let status = response.status();

            if status == StatusCode::NOT_FOUND {
                return if allow_not_found {
                    Ok(None)
                } else {
                    Err(UpstreamError::NotFound { url: url.clone() })
                };
            }

            let text = response.text().await.map_err(|e| transport(&url, e))?;
            if !status.is_success() {
                return Err(http_status(&url, status, &text));
            }

            serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| UpstreamError::Decode { url: url.clone(), message: e.to_string() })
        })
        .await
    }

    /// GETs a body as text, failing on non-success statuses
    pub async fn fetch_text(&self, path: &str) -> Result<String, UpstreamError> {
        let url = self.url_for(path);
        let (status, text) = self.fetch_text_within(path, self.timeout).await?;
        if status.is_success() {
            Ok(text)
        } else {
            Err(http_status(&url, status, &text))
        }
    }

    /// GETs a body as text under a custom budget, whatever its status
    ///
    /// Used by the health probe, which classifies the status itself.
    pub async fn fetch_text_within(
        &self,
        path: &str,
        budget: Duration,
    ) -> Result<(StatusCode, String), UpstreamError> {
        let url = self.url_for(path);
        debug!("Probing upstream: {}", url);

        self.bounded(&url, budget, async {
            let response = self.client.get(&url).send().await.map_err(|e| transport(&url, e))?;
            let status = response.status();
            let text = response.text().await.map_err(|e| transport(&url, e))?;
            Ok((status, text))
        })
        .await
    }

    /// Forwards a raw request and returns the upstream answer unchanged
    ///
    /// Non-success statuses are not errors here: they are part of the
    /// response the client receives.
    ///
    /// # Arguments
    /// * `method` - Client request method
    /// * `path_and_query` - Upstream path with the mount prefix already stripped
    /// * `headers` - Client request headers
    /// * `body` - Client request body
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.url_for(path_and_query);
        debug!("Forwarding {} {}", method, url);

        let mut outgoing = strip_hop_by_hop(headers);
        outgoing.remove(header::HOST);
        outgoing.remove(header::CONTENT_LENGTH);

        self.bounded(&url, self.timeout, async {
            let response = self
                .client
                .request(method, &url)
                .headers(outgoing)
                .body(body)
                .send()
                .await
                .map_err(|e| transport(&url, e))?;

            let status = response.status();
            let mut headers = strip_hop_by_hop(response.headers());
            headers.remove(header::CONTENT_LENGTH);
            let body = response.bytes().await.map_err(|e| transport(&url, e))?;

            Ok(UpstreamResponse { status, headers, body })
        })
        .await
    }

    async fn bounded<T, F>(&self, url: &str, budget: Duration, fut: F) -> Result<T, UpstreamError>
    where
        F: Future<Output = Result<T, UpstreamError>>,
    {
        match tokio::time::timeout(budget, fut).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout { url: url.to_string(), timeout: budget }),
        }
    }
}

/// Copies a header map without connection-scoped headers
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP {
        out.remove(name);
    }
    out.remove("keep-alive");
    out
}

fn transport(url: &str, err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        // Only reachable if a client-level timeout is ever configured
        return UpstreamError::Timeout { url: url.to_string(), timeout: Duration::ZERO };
    }
    UpstreamError::NetworkFailure { url: url.to_string(), message: err.to_string() }
}

fn http_status(url: &str, status: StatusCode, body: &str) -> UpstreamError {
    let body = body.chars().take(MAX_ERROR_BODY).collect();
    UpstreamError::HttpStatus { url: url.to_string(), status: status.as_u16(), body }
}
