// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
// SPDX-License-Identifier: AGPL-3.0
//! IPPAN Gateway Library
//!
//! A caching gateway that sits between browsers or API clients and a single IPPAN node.
//! Proxies API calls and WebSocket streams, and serves a derived explorer API built from
//! cached, normalized block, transaction and account reads.

pub mod cache;
pub mod config;
pub mod error;
pub mod explorer;
pub mod health;
pub mod normalize;
pub mod origin;
pub mod proxy;
pub mod routes;
pub mod server;
pub mod websocket;

pub use cache::{CacheEntry, ResponseCache};
pub use config::GatewayConfig;
pub use error::{ApiError, UpstreamError};
pub use explorer::ExplorerService;
pub use origin::OriginClient;
pub use server::{GatewayServer, GatewayServerBuilder};
