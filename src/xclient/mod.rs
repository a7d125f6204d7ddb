// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Load-balancing front client (spec.md §4.7): resolves an address via
//! [`Discovery`], lazily opens/reuses a [`Client`] per address, and fans
//! calls out one-shot or broadcast. The lazy-cache-then-evict-on-failure
//! shape mirrors `client::pool_sessions::Pool::execute_with` from the
//! teacher.

use std::{collections::HashMap, time::Duration};

use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::{
    client::Client,
    dial,
    discovery::{Discovery, SelectMode},
    error::{Result, RpcError},
    option::ConnectOption,
};

pub struct XClient {
    discovery: std::sync::Arc<dyn Discovery>,
    select_mode: SelectMode,
    opt: ConnectOption,
    clients: AsyncMutex<HashMap<String, Client>>,
}

impl XClient {
    pub fn new(discovery: std::sync::Arc<dyn Discovery>, select_mode: SelectMode, opt: ConnectOption) -> Self {
        Self {
            discovery,
            select_mode,
            opt,
            clients: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Returns a cached, live `Client` for `addr`, dialing a fresh one if
    /// there is none or the cached one is unavailable (spec.md §4.7: "If the
    /// cached client reports unavailable, evict and close it before
    /// constructing a replacement").
    async fn client_for(&self, addr: &str) -> Result<Client> {
        let mut cache = self.clients.lock().await;

        if let Some(existing) = cache.get(addr).cloned() {
            if !existing.is_shutdown() {
                return Ok(existing);
            }
            cache.remove(addr);
        }

        let client = dial::dial("tcp", addr, self.opt.clone()).await?;
        cache.insert(addr.to_string(), client.clone());
        Ok(client)
    }

    /// Resolves one address via `discovery`, obtains a client for it, and
    /// delegates the call (spec.md §4.7).
    pub async fn call(
        &self,
        service_method: &str,
        args: Value,
        deadline: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let addr = self.discovery.get(self.select_mode).await?;
        let client = self.client_for(&addr).await?;
        client.call(service_method, args, deadline, cancel).await
    }

    /// Fans one call out to every address from `discovery.get_all()`.
    /// Success requires every call to succeed; the first error encountered
    /// cancels every sibling still in flight through a child of `cancel`
    /// (spec.md §4.7/§5).
    pub async fn broadcast(
        &self,
        service_method: &str,
        args: Value,
        deadline: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>> {
        let addrs = self.discovery.get_all().await?;
        if addrs.is_empty() {
            return Err(RpcError::DiscoveryEmpty);
        }

        let group_cancel = cancel.child_token();
        let results = futures::future::join_all(addrs.iter().map(|addr| {
            let group_cancel = group_cancel.clone();
            let args = args.clone();
            async move {
                let client = self.client_for(addr).await?;
                client.call(service_method, args, deadline, &group_cancel).await
            }
        }))
        .await;

        let mut first_reply = None;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(reply) => {
                    if first_reply.is_none() {
                        first_reply = Some(reply);
                    }
                }
                Err(e) => {
                    if first_error.is_none() {
                        group_cancel.cancel();
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(first_reply),
        }
    }

    /// Closes and drops every cached client. Idempotent per address: a
    /// second call simply finds nothing left to close.
    pub async fn close(&self) -> Result<()> {
        let mut cache = self.clients.lock().await;
        for (_, client) in cache.drain() {
            let _ = client.close().await;
        }
        Ok(())
    }
}
