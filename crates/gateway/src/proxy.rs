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

//! Raw HTTP passthrough to the upstream node

use crate::{
    config::strip_mount_prefix, error::ApiError, routes::not_found_response, server::AppState,
};
use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, warn};

/// Largest request body forwarded upstream
pub const MAX_FORWARD_BODY: usize = 10 * 1024 * 1024;

/// Forwards a request under `prefix` with the prefix stripped
///
/// The upstream status, headers and body reach the client unchanged, error
/// statuses included. Only transport failures are turned into gateway errors.
///
/// # Arguments
/// * `state` - Shared gateway state
/// * `prefix` - Normalized mount prefix the request was routed under
/// * `request` - The client request
pub async fn forward_request(state: AppState, prefix: &str, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let Some(path) = strip_mount_prefix(parts.uri.path(), prefix) else {
        return not_found_response(parts.uri.path());
    };
    let path_and_query = with_query(&path, parts.uri.query());

    let body = match to_bytes(body, MAX_FORWARD_BODY).await {
        Ok(body) => body,
        Err(e) => {
            warn!("Rejecting request body for {}: {}", parts.uri.path(), e);
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({ "error": "Request body rejected", "path": parts.uri.path() })),
            )
                .into_response();
        }
    };

    debug!("Proxying {} {} -> {}", parts.method, parts.uri.path(), path_and_query);
    match state.origin.forward(parts.method, &path_and_query, &parts.headers, body).await {
        Ok(upstream) => {
            let mut response = Response::new(Body::from(upstream.body));
            *response.status_mut() = upstream.status;
            *response.headers_mut() = upstream.headers;
            response
        }
        Err(e) => {
            warn!("Proxy request failed: {}", e);
            ApiError::from_upstream(&e, !state.config.production).into_response()
        }
    }
}

/// Re-attaches a query string to a rewritten path
pub fn with_query(path: &str, query: Option<&str>) -> String {
    match query {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path.to_string(),
    }
}
