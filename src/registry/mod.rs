// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The `Registry` HTTP endpoint (spec.md §4.6) tracking alive server
//! addresses via heartbeats, plus the client-side heartbeat helper servers
//! use to keep themselves registered.
//!
//! Router shape (shared `Arc<State>` behind an `axum::Router`) follows
//! `tobert-hootenanny`'s `holler` crate; the heartbeat client reuses
//! `reqwest`, the pack's common HTTP client.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};
use dashmap::DashMap;
use tracing::warn;

use crate::{
    error::Result,
    option::{DEFAULT_REGISTRY_PATH, DEFAULT_REGISTRY_TIMEOUT},
};

struct RegistryState {
    servers: DashMap<String, Instant>,
    timeout: Duration,
}

/// A central process tracking which servers have POSTed a heartbeat
/// recently enough to still count as alive (spec.md §3/§4.6).
pub struct Registry {
    state: Arc<RegistryState>,
    path: String,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REGISTRY_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_path_and_timeout(DEFAULT_REGISTRY_PATH, timeout)
    }

    pub fn with_path_and_timeout(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            state: Arc::new(RegistryState { servers: DashMap::new(), timeout }),
            path: path.into(),
        }
    }

    /// Builds the `axum::Router` exposing GET/POST on this registry's path.
    /// `axum` answers any other method on that path with 405 automatically
    /// (spec.md §4.6's "other: 405").
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.path, get(get_handler).post(post_handler))
            .with_state(Arc::clone(&self.state))
    }
}

async fn get_handler(State(state): State<Arc<RegistryState>>) -> impl IntoResponse {
    let now = Instant::now();
    let mut alive = Vec::new();

    // GC happens in the same pass that builds the listing (spec.md §4.6:
    // "expired entries are evicted atomically during the listing").
    state.servers.retain(|addr, last_seen| {
        let is_alive = state.timeout.is_zero() || *last_seen + state.timeout > now;
        if is_alive {
            alive.push(addr.clone());
        }
        is_alive
    });
    alive.sort();

    ([("X-Zrpc-Servers", alive.join(","))], StatusCode::OK)
}

async fn post_handler(State(state): State<Arc<RegistryState>>, headers: HeaderMap) -> StatusCode {
    match headers.get("X-Zrpc-Server").and_then(|v| v.to_str().ok()) {
        Some(addr) if !addr.is_empty() => {
            state.servers.insert(addr.to_string(), Instant::now());
            StatusCode::OK
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Clamps the default heartbeat period so it's never zero or negative, per
/// spec.md §9's open question: a registry `timeout` of a minute or less
/// would otherwise yield `timeout - 1 min <= 0`.
pub fn default_heartbeat_period(registry_timeout: Duration) -> Duration {
    let one_minute = Duration::from_secs(60);
    if registry_timeout > one_minute {
        registry_timeout - one_minute
    } else {
        (registry_timeout / 2).max(Duration::from_secs(1))
    }
}

/// POSTs one heartbeat immediately, then spawns a background task that
/// POSTs every `period` (defaulted via [`default_heartbeat_period`]) until a
/// POST fails, at which point the task exits without retrying (spec.md
/// §4.6, §7's "servers never retry across connections").
pub async fn heartbeat(registry_url: impl Into<String>, addr: impl Into<String>, period: Option<Duration>) -> Result<()> {
    let registry_url = registry_url.into();
    let addr = addr.into();
    let client = reqwest::Client::new();

    send_heartbeat(&client, &registry_url, &addr).await?;

    let period = period.unwrap_or_else(|| default_heartbeat_period(DEFAULT_REGISTRY_TIMEOUT));
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(period).await;
            if let Err(e) = send_heartbeat(&client, &registry_url, &addr).await {
                warn!("heartbeat to {registry_url} stopped: {e}");
                break;
            }
        }
    });

    Ok(())
}

async fn send_heartbeat(client: &reqwest::Client, registry_url: &str, addr: &str) -> Result<()> {
    client
        .post(registry_url)
        .header("X-Zrpc-Server", addr)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| crate::error::RpcError::Registry(format!("heartbeat failed: {e}")))?;
    Ok(())
}
