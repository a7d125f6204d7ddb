// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Accepts connections, reads the handshake, dispatches concurrent requests
//! to handlers, and honours the per-connection handle-timeout (spec.md
//! §4.2). Generalizes the teacher's `client::client::ClientConnection`
//! spawn-a-background-task-per-connection shape to the listening side.

pub mod conn;
pub mod http_upgrade;
pub mod service;

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

pub use service::Handler;

use crate::{
    dial::BoxedStream,
    error::Result,
    option::DEFAULT_RPC_PATH,
};
use service::ServiceMap;

struct ServerInner {
    service_map: Arc<ServiceMap>,
    rpc_path: String,
}

/// A registry of services bound to zero or more listeners. Cheap to clone
/// (`Arc`-backed); every clone shares the same `service_map`, mirroring the
/// teacher's `Arc<Pool>`/`Arc<ClientConnection>` handle pattern.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    pub fn new() -> Self {
        Self::with_rpc_path(DEFAULT_RPC_PATH)
    }

    pub fn with_rpc_path(rpc_path: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                service_map: Arc::new(ServiceMap::new()),
                rpc_path: rpc_path.into(),
            }),
        }
    }

    /// Registers `handler` as `"service.method"`. Insert-or-fail: see
    /// [`ServiceMap::register`].
    pub fn register(&self, service: &str, method: &str, handler: Arc<dyn Handler>) -> Result<()> {
        self.inner.service_map.register(service, method, handler)
    }

    /// Serves a single already-established connection to completion.
    pub async fn serve_connection(&self, stream: BoxedStream) -> Result<()> {
        conn::serve_connection(self.service_map(), stream).await
    }

    fn service_map(&self) -> Arc<ServiceMap> {
        Arc::clone(&self.inner.service_map)
    }

    /// Accepts raw TCP connections on `listener`, spawning one
    /// `serve_connection` per accepted socket.
    pub async fn accept(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            info!(%peer, "accepted connection");
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.serve_connection(Box::new(stream)).await {
                    warn!(%peer, "connection ended: {e}");
                }
            });
        }
    }

    /// Accepts raw TCP connections on `listener`, treating each one as an
    /// HTTP-CONNECT upgrade request at this server's configured RPC path
    /// (spec.md §4.2/§6).
    pub async fn accept_http(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            info!(%peer, "accepted HTTP-CONNECT candidate");
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_http_connect(stream).await {
                    warn!(%peer, "HTTP-CONNECT connection ended: {e}");
                }
            });
        }
    }

    async fn handle_http_connect(&self, stream: TcpStream) -> Result<()> {
        http_upgrade::handle_connection(self.service_map(), stream, &self.inner.rpc_path).await
    }
}
