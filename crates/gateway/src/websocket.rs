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

//! WebSocket upgrade dispatch and upstream bridging

use crate::{config::strip_mount_prefix, proxy::with_query, server::AppState};
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        FromRequestParts, Request, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame as UpstreamCloseFrame},
        Message as UpstreamMessage,
    },
};
use tracing::{debug, info, warn};

/// Whether a request asks for a WebSocket upgrade
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|p| p.trim().eq_ignore_ascii_case("websocket")))
}

/// Middleware intercepting upgrade requests before routing
///
/// Upgrades under the WS prefix are accepted and bridged to the upstream
/// with the prefix stripped. Upgrades anywhere else are answered without
/// switching protocols and with `Connection: close`.
pub async fn upgrade_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !is_websocket_upgrade(request.headers()) {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let Some(stripped) = strip_mount_prefix(&path, &state.config.ws_prefix) else {
        warn!("Rejecting WebSocket upgrade outside {}: {}", state.config.ws_prefix, path);
        return reject_upgrade(&path, &state.config.ws_prefix);
    };
    let target = state.origin.websocket_url(&with_query(&stripped, request.uri().query()));

    let (mut parts, _body) = request.into_parts();
    match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(upgrade) => {
            info!("Bridging WebSocket {} -> {}", path, target);
            upgrade.on_upgrade(move |socket| bridge(socket, target))
        }
        Err(rejection) => rejection.into_response(),
    }
}

fn reject_upgrade(path: &str, ws_prefix: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONNECTION, "close")],
        Json(json!({
            "error": format!("WebSocket upgrades are only accepted under {ws_prefix}"),
            "path": path,
        })),
    )
        .into_response()
}

/// Relays frames between an upgraded client and the upstream until either side ends
///
/// A failed upstream dial drops the client socket.
pub async fn bridge(client: WebSocket, target: String) {
    let upstream = match connect_async(target.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!("Upstream WebSocket dial to {} failed: {}", target, e);
            return;
        }
    };

    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let inbound = async {
        while let Some(Ok(message)) = client_rx.next().await {
            let closing = matches!(message, Message::Close(_));
            if upstream_tx.send(to_upstream(message)).await.is_err() || closing {
                break;
            }
        }
    };

    let outbound = async {
        while let Some(Ok(message)) = upstream_rx.next().await {
            let Some(message) = to_client(message) else {
                continue;
            };
            let closing = matches!(message, Message::Close(_));
            if client_tx.send(message).await.is_err() || closing {
                break;
            }
        }
    };

    tokio::select! {
        _ = inbound => debug!("Client side of {} finished", target),
        _ = outbound => debug!("Upstream side of {} finished", target),
    }
}

fn to_upstream(message: Message) -> UpstreamMessage {
    match message {
        Message::Text(text) => UpstreamMessage::Text(text.as_str().to_string().into()),
        Message::Binary(data) => UpstreamMessage::Binary(data),
        Message::Ping(data) => UpstreamMessage::Ping(data),
        Message::Pong(data) => UpstreamMessage::Pong(data),
        Message::Close(frame) => UpstreamMessage::Close(frame.map(|f| UpstreamCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().to_string().into(),
        })),
    }
}

fn to_client(message: UpstreamMessage) -> Option<Message> {
    Some(match message {
        UpstreamMessage::Text(text) => Message::Text(text.as_str().to_string().into()),
        UpstreamMessage::Binary(data) => Message::Binary(data),
        UpstreamMessage::Ping(data) => Message::Ping(data),
        UpstreamMessage::Pong(data) => Message::Pong(data),
        UpstreamMessage::Close(frame) => Message::Close(frame.map(|f| CloseFrame {
            code: u16::from(f.code),
            reason: f.reason.as_str().to_string().into(),
        })),
        // Raw frames never surface from a read
        UpstreamMessage::Frame(_) => return None,
    })
}
