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

//! Upstream failure taxonomy and its HTTP rendering

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Failure of a single upstream call
///
/// Cloneable so that one in-flight fetch can hand the same outcome to every
/// waiter sharing it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// The call did not complete within its budget
    #[error("upstream request to {url} timed out after {timeout:?}")]
    Timeout {
        /// Requested upstream URL
        url: String,
        /// Budget that expired
        timeout: Duration,
    },

    /// The upstream answered with a non-success status
    #[error("upstream {url} responded with HTTP {status}")]
    HttpStatus {
        /// Requested upstream URL
        url: String,
        /// Status code returned by the upstream
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// DNS, connect or transport failure
    #[error("upstream {url} unreachable: {message}")]
    NetworkFailure {
        /// Requested upstream URL
        url: String,
        /// Transport error rendering
        message: String,
    },

    /// The requested entity does not exist upstream
    #[error("upstream {url} has no such entity")]
    NotFound {
        /// Requested upstream URL
        url: String,
    },

    /// A success response whose body is not the expected JSON
    #[error("upstream {url} returned an undecodable body: {message}")]
    Decode {
        /// Requested upstream URL
        url: String,
        /// Decoder error rendering
        message: String,
    },
}

impl UpstreamError {
    /// Short machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::HttpStatus { .. } => "http_status",
            Self::NetworkFailure { .. } => "network_failure",
            Self::NotFound { .. } => "not_found",
            Self::Decode { .. } => "decode",
        }
    }

    /// The upstream URL the failed call targeted
    pub fn upstream_url(&self) -> &str {
        match self {
            Self::Timeout { url, .. }
            | Self::HttpStatus { url, .. }
            | Self::NetworkFailure { url, .. }
            | Self::NotFound { url }
            | Self::Decode { url, .. } => url,
        }
    }

    /// HTTP status the gateway answers with for this failure
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::HttpStatus { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|code| code.is_client_error() || code.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::NetworkFailure { .. } | Self::Decode { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Whether the upstream could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::NetworkFailure { .. })
    }
}

/// JSON error response returned by gateway handlers
#[derive(Debug, Clone)]
pub struct ApiError {
    /// Response status
    pub status: StatusCode,
    /// JSON body
    pub body: Value,
}

impl ApiError {
    /// Builds a response for a failed upstream call
    ///
    /// # Arguments
    /// * `err` - The upstream failure
    /// * `expose_details` - Include the debug rendering of the failure, off in production
    pub fn from_upstream(err: &UpstreamError, expose_details: bool) -> Self {
        let mut body = json!({
            "error": err.to_string(),
            "kind": err.kind(),
            "upstream": err.upstream_url(),
        });
        if expose_details {
            body["details"] = Value::String(format!("{err:?}"));
        }
        Self { status: err.status_code(), body }
    }

    /// 404 for an entity the upstream does not know, keyed by the lookup field
    pub fn not_found(error: &str, field: &str, value: &str) -> Self {
        Self { status: StatusCode::NOT_FOUND, body: json!({ "error": error, field: value }) }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
