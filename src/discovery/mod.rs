// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! An abstract enumerator of backend addresses with a selection policy
//! (spec.md §4.5). Locking discipline mirrors the teacher's
//! `client::pool_sessions::Pool`: one lock guards the address list and the
//! round-robin cursor together, so concurrent callers observe a consistent
//! snapshot per call (spec.md §8 law 7).

pub mod registry_discovery;

use std::sync::Mutex;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub use registry_discovery::RegistryDiscovery;

use crate::error::{Result, RpcError};

/// Selection policy for [`Discovery::get`]. Marked non-exhaustive: any
/// future variant a particular `Discovery` impl doesn't recognize falls
/// through to `RpcError::SelectModeUnknown` (spec.md §4.5). `Serialize`/
/// `Deserialize` let this be set directly from a YAML config file.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectMode {
    Random,
    RoundRobin,
}

#[async_trait]
pub trait Discovery: Send + Sync {
    async fn refresh(&self) -> Result<()>;
    async fn update(&self, addrs: Vec<String>) -> Result<()>;
    async fn get(&self, mode: SelectMode) -> Result<String>;
    async fn get_all(&self) -> Result<Vec<String>>;
}

struct DiscoveryState {
    servers: Vec<String>,
    round_robin_index: usize,
}

/// A static (or explicitly-updated) address list with `Random`/`RoundRobin`
/// selection. `RegistryDiscovery` wraps one of these and keeps it fresh from
/// a `Registry` HTTP endpoint.
pub struct MultiServersDiscovery {
    state: Mutex<DiscoveryState>,
}

impl MultiServersDiscovery {
    pub fn new(servers: Vec<String>) -> Self {
        Self {
            state: Mutex::new(DiscoveryState { servers, round_robin_index: 0 }),
        }
    }
}

impl Default for MultiServersDiscovery {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl Discovery for MultiServersDiscovery {
    /// A static list has nothing to refresh from; `RegistryDiscovery`
    /// overrides this with the actual network refresh.
    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    async fn update(&self, addrs: Vec<String>) -> Result<()> {
        let mut state = self.state.lock().expect("discovery lock poisoned");
        state.servers = addrs;
        state.round_robin_index = 0;
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String> {
        let mut state = self.state.lock().expect("discovery lock poisoned");
        if state.servers.is_empty() {
            return Err(RpcError::DiscoveryEmpty);
        }
        match mode {
            SelectMode::Random => {
                let idx = rand::rng().random_range(0..state.servers.len());
                Ok(state.servers[idx].clone())
            }
            SelectMode::RoundRobin => {
                let n = state.servers.len();
                let idx = state.round_robin_index % n;
                state.round_robin_index = (state.round_robin_index + 1) % n;
                Ok(state.servers[idx].clone())
            }
            #[allow(unreachable_patterns)]
            _ => Err(RpcError::SelectModeUnknown),
        }
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        let state = self.state.lock().expect("discovery lock poisoned");
        Ok(state.servers.clone())
    }
}
