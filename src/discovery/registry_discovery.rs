// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! [`Discovery`] backed by a [`crate::registry::Registry`] HTTP endpoint,
//! refreshed no more often than `refresh_interval` (spec.md §4.6).

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use async_trait::async_trait;

use super::{Discovery, MultiServersDiscovery, SelectMode};
use crate::error::{Result, RpcError};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

pub struct RegistryDiscovery {
    inner: MultiServersDiscovery,
    registry_url: String,
    refresh_interval: Duration,
    last_update: Mutex<Instant>,
    http: reqwest::Client,
}

impl RegistryDiscovery {
    pub fn new(registry_url: impl Into<String>) -> Self {
        Self::with_refresh_interval(registry_url, DEFAULT_REFRESH_INTERVAL)
    }

    pub fn with_refresh_interval(registry_url: impl Into<String>, refresh_interval: Duration) -> Self {
        Self {
            inner: MultiServersDiscovery::default(),
            registry_url: registry_url.into(),
            refresh_interval,
            // Forces the first `refresh()` call to actually hit the network
            // instead of treating a brand-new discovery as already fresh.
            last_update: Mutex::new(Instant::now() - refresh_interval - Duration::from_secs(1)),
            http: reqwest::Client::new(),
        }
    }

    fn needs_refresh(&self) -> bool {
        let last = *self.last_update.lock().expect("last_update lock poisoned");
        last.elapsed() >= self.refresh_interval
    }

    fn mark_refreshed(&self) {
        *self.last_update.lock().expect("last_update lock poisoned") = Instant::now();
    }
}

#[async_trait]
impl Discovery for RegistryDiscovery {
    /// No-op when the local copy is younger than `refresh_interval` (spec.md
    /// §8 law 6: "two `get` calls within `refresh_interval` cause at most
    /// one GET to the registry").
    async fn refresh(&self) -> Result<()> {
        if !self.needs_refresh() {
            return Ok(());
        }

        let response = self
            .http
            .get(&self.registry_url)
            .send()
            .await
            .map_err(|e| RpcError::Registry(format!("registry refresh failed: {e}")))?;

        let header = response
            .headers()
            .get("X-Zrpc-Servers")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let servers: Vec<String> = header
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        self.inner.update(servers).await?;
        self.mark_refreshed();
        Ok(())
    }

    async fn update(&self, addrs: Vec<String>) -> Result<()> {
        self.inner.update(addrs).await?;
        self.mark_refreshed();
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String> {
        self.refresh().await?;
        self.inner.get(mode).await
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        self.refresh().await?;
        self.inner.get_all().await
    }
}
