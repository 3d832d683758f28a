//! Integration tests for the gateway server

use futures::{SinkExt, StreamExt};
use gateway_common::logging::ensure_test_logging;
use ippan_gateway::{GatewayConfig, GatewayServer, GatewayServerBuilder};
use reqwest::Client;
use serde_json::{json, Value};
use std::{net::SocketAddr, time::Duration};
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, connect_async, tungstenite::Message};
use wiremock::{
    matchers::{body_string, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

/// Start the gateway on a random port and return the address
async fn start_gateway(server: GatewayServer) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        server.serve_on(listener, std::future::pending()).await.unwrap();
    });

    addr
}

async fn gateway_for(upstream: &str) -> SocketAddr {
    let server = GatewayServerBuilder::new().upstream_url(upstream).build().unwrap();
    start_gateway(server).await
}

fn block_at(height: u64) -> Value {
    json!({
        "header": {"id": vec![height as u8; 32], "round": height, "creator": vec![7u8; 32]},
        "transactions": [{"id": format!("{height:064}"), "amount": 5, "nonce": 1}],
    })
}

async fn mount_chain(server: &MockServer, height: u64) {
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "consensus": {"latest_block_height": height},
        })))
        .mount(server)
        .await;

    for h in 1..=height {
        Mock::given(method("GET"))
            .and(path(format!("/block/{h}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(block_at(h)))
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_health_reports_healthy_upstream() {
    ensure_test_logging(None);
    let upstream = MockServer::start().await;
    mount_chain(&upstream, 0).await;

    let addr = gateway_for(&upstream.uri()).await;
    let client = Client::new();

    for route in ["/health", "/api/health"] {
        let response = client.get(format!("http://{addr}{route}")).send().await.unwrap();
        assert_eq!(response.status(), 200);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "ippan-gateway");
        assert_eq!(body["details"]["status"], "ok");
        assert!(body["cache"]["maxEntries"].is_number());
    }
}

#[tokio::test]
async fn test_health_reports_unreachable_upstream() {
    ensure_test_logging(None);
    let upstream = MockServer::start().await;
    Mock::given(path("/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "ok"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&upstream)
        .await;

    let server = GatewayServerBuilder::new()
        .upstream_url(upstream.uri())
        .health_timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let addr = start_gateway(server).await;

    let response = Client::new().get(format!("http://{addr}/health")).send().await.unwrap();
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "unreachable");
    assert_eq!(body["details"]["kind"], "timeout");
}

#[tokio::test]
async fn test_api_proxy_strips_prefix() {
    ensure_test_logging(None);
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accounts/42"))
        .and(query_param("verbose", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-node", "alpha")
                .set_body_json(json!({"address": "42"})),
        )
        .expect(1)
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("root"))
        .expect(2)
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/tx/submit"))
        .and(body_string("{\"to\":\"x\"}"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({"error": "bad nonce"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let addr = gateway_for(&upstream.uri()).await;
    let client = Client::new();

    let response =
        client.get(format!("http://{addr}/api/accounts/42?verbose=1")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-node"], "alpha");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["address"], "42");

    for route in ["/api", "/api/"] {
        let response = client.get(format!("http://{addr}{route}")).send().await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "root");
    }

    // Upstream error statuses pass through untouched
    let response = client
        .post(format!("http://{addr}/api/tx/submit"))
        .header("content-type", "application/json")
        .body("{\"to\":\"x\"}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "bad nonce");
}

#[tokio::test]
async fn test_gateway_routes_pass_other_methods_upstream() {
    ensure_test_logging(None);
    let upstream = MockServer::start().await;
    mount_chain(&upstream, 0).await;
    Mock::given(method("POST"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"posted": true})))
        .expect(1)
        .mount(&upstream)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/explorer/summary"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&upstream)
        .await;

    let addr = gateway_for(&upstream.uri()).await;
    let client = Client::new();

    // GET still reaches the gateway's own handler
    let response = client.get(format!("http://{addr}/api/health")).send().await.unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["service"], "ippan-gateway");

    let response = client.post(format!("http://{addr}/api/health")).send().await.unwrap();
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["posted"], true);

    let response =
        client.delete(format!("http://{addr}/api/explorer/summary")).send().await.unwrap();
    assert_eq!(response.status(), 204);

    // Outside the API prefix there is no proxy to fall back to
    let response = client.post(format!("http://{addr}/explorer/summary")).send().await.unwrap();
    assert_eq!(response.status(), 405);
}

#[tokio::test]
async fn test_proxy_reports_unreachable_upstream() {
    ensure_test_logging(None);
    let addr = gateway_for("http://127.0.0.1:1").await;

    let response = Client::new().get(format!("http://{addr}/api/status")).send().await.unwrap();
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "network_failure");
}

#[tokio::test]
async fn test_unmatched_path_is_json_404() {
    ensure_test_logging(None);
    let upstream = MockServer::start().await;
    let addr = gateway_for(&upstream.uri()).await;

    let response = Client::new().get(format!("http://{addr}/nowhere")).send().await.unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "Not found", "path": "/nowhere"}));

    // Prefix match must be on a segment boundary
    let response = Client::new().get(format!("http://{addr}/apix/1")).send().await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_explorer_blocks_and_block_lookup() {
    ensure_test_logging(None);
    let upstream = MockServer::start().await;
    mount_chain(&upstream, 3).await;
    Mock::given(path("/block/99"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&upstream)
        .await;

    let addr = gateway_for(&upstream.uri()).await;
    let client = Client::new();

    for base in ["/explorer", "/api/explorer"] {
        let response =
            client.get(format!("http://{addr}{base}/blocks?limit=5")).send().await.unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["latestHeight"], 3);
        let heights: Vec<u64> = body["blocks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["height"].as_u64().unwrap())
            .collect();
        assert_eq!(heights, vec![3, 2, 1]);
    }

    let response = client.get(format!("http://{addr}/explorer/blocks/2")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["summary"]["height"], 2);
    assert_eq!(body["summary"]["transactionCount"], 1);

    let response = client.get(format!("http://{addr}/explorer/blocks/99")).send().await.unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "Block not found", "id": "99"}));
}

#[tokio::test]
async fn test_explorer_summary_and_search() {
    ensure_test_logging(None);
    let upstream = MockServer::start().await;
    mount_chain(&upstream, 2).await;

    let addr = gateway_for(&upstream.uri()).await;
    let client = Client::new();

    let response = client
        .get(format!("http://{addr}/explorer/summary?blocks=2&transactions=5"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["latestHeight"], 2);
    assert_eq!(body["blocks"].as_array().unwrap().len(), 2);
    assert_eq!(body["transactions"].as_array().unwrap().len(), 2);

    let response = client.get(format!("http://{addr}/explorer/search?q=2")).send().await.unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["query"], "2");
    assert_eq!(body["matches"][0]["type"], "block");
    assert_eq!(body["matches"][0]["summary"]["height"], 2);

    let response = client.get(format!("http://{addr}/explorer/search?q=")).send().await.unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["matches"], json!([]));
}

#[tokio::test]
async fn test_explorer_disabled() {
    ensure_test_logging(None);
    let upstream = MockServer::start().await;
    let server =
        GatewayServerBuilder::new().upstream_url(upstream.uri()).enable_explorer(false).build();
    let addr = start_gateway(server.unwrap()).await;

    let response = Client::new().get(format!("http://{addr}/explorer/summary")).send().await;
    assert_eq!(response.unwrap().status(), 404);
}

#[tokio::test]
async fn test_production_mode_hides_details() {
    ensure_test_logging(None);
    let upstream = MockServer::start().await;
    Mock::given(path("/block/1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&upstream)
        .await;

    let dev = gateway_for(&upstream.uri()).await;
    let prod = start_gateway(
        GatewayServer::new(GatewayConfig {
            upstream_url: upstream.uri(),
            production: true,
            ..Default::default()
        })
        .unwrap(),
    )
    .await;
    let client = Client::new();

    let response = client.get(format!("http://{dev}/explorer/blocks/1")).send().await.unwrap();
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "http_status");
    assert!(body["details"].is_string());

    let response = client.get(format!("http://{prod}/explorer/blocks/1")).send().await.unwrap();
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "http_status");
    assert!(body.get("details").is_none());
}

#[tokio::test]
async fn test_cors_allowlist() {
    ensure_test_logging(None);
    let upstream = MockServer::start().await;
    mount_chain(&upstream, 0).await;

    let server = GatewayServerBuilder::new()
        .upstream_url(upstream.uri())
        .allowed_origins(vec!["https://explorer.ippan.org".to_string(), "*.ippan.net".to_string()])
        .build()
        .unwrap();
    let addr = start_gateway(server).await;
    let client = Client::new();

    for origin in ["https://explorer.ippan.org", "https://app.ippan.net"] {
        let response = client
            .get(format!("http://{addr}/health"))
            .header("origin", origin)
            .send()
            .await
            .unwrap();
        assert_eq!(response.headers()["access-control-allow-origin"], origin);
    }

    let response = client
        .get(format!("http://{addr}/health"))
        .header("origin", "https://evil.example")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().get("access-control-allow-origin").is_none());
}

/// Echo server standing in for the node's WebSocket endpoint
async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut socket) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = socket.next().await {
                    let echoed = message.is_text() || message.is_binary();
                    if echoed && socket.send(message).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    addr
}

#[tokio::test]
async fn test_websocket_bridge_echoes() {
    ensure_test_logging(None);
    let echo = start_echo_server().await;
    let addr = gateway_for(&format!("http://{echo}")).await;

    let (mut socket, response) = connect_async(format!("ws://{addr}/ws/stream")).await.unwrap();
    assert_eq!(response.status(), 101);

    socket.send(Message::Text("ping-1".to_string().into())).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("echo reply")
        .unwrap()
        .unwrap();
    assert_eq!(reply.into_text().unwrap().as_str(), "ping-1");

    socket.close(None).await.unwrap();
}

#[tokio::test]
async fn test_websocket_upgrade_outside_ws_prefix_is_rejected() {
    ensure_test_logging(None);
    let echo = start_echo_server().await;
    let addr = gateway_for(&format!("http://{echo}")).await;

    for route in ["/api/stream", "/explorer/summary", "/elsewhere"] {
        let result = connect_async(format!("ws://{addr}{route}")).await;
        assert!(result.is_err(), "upgrade on {route} should be refused");
    }
}
