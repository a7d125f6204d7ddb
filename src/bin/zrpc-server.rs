// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Demo RPC server: registers `Arith.Mul` and serves it on a raw TCP
//! listener, optionally also accepting HTTP-CONNECT upgrades and
//! heartbeating itself into a registry.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use zrpc::{cfg::config::ServerConfig, registry};

#[derive(Parser, Debug)]
#[command(name = "zrpc-server", about = "Serves the demo Arith service over zRPC")]
struct Args {
    /// Path to the server's YAML configuration file.
    #[arg(long, default_value = "config/server.yaml")]
    config: String,

    /// Path to the logger's YAML configuration file.
    #[arg(long, default_value = "config/logger.yaml")]
    log_config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = zrpc::cfg::logger::init_logger(&args.log_config).context("init logger")?;

    let cfg = ServerConfig::load_from_file(&args.config).context("load server config")?;

    let server = zrpc::server::Server::with_rpc_path(cfg.rpc_path.clone());
    zrpc::arith::register(&server).context("register Arith service")?;

    if let Some(registry_cfg) = &cfg.registry {
        registry::heartbeat(
            registry_cfg.url.clone(),
            registry_cfg.advertise_addr.clone(),
            registry_cfg.heartbeat_period,
        )
        .await
        .context("start registry heartbeat")?;
        info!(url = %registry_cfg.url, addr = %registry_cfg.advertise_addr, "heartbeating into registry");
    }

    let bind_addr: SocketAddr = cfg.bind_addr.parse().context("parse bind_addr")?;
    let listener = TcpListener::bind(bind_addr).await.context("bind TCP listener")?;
    info!(%bind_addr, "zrpc-server listening");

    if let Some(http_addr) = &cfg.http_connect_addr {
        let http_addr: SocketAddr = http_addr.parse().context("parse http_connect_addr")?;
        let http_listener = TcpListener::bind(http_addr).await.context("bind HTTP-CONNECT listener")?;
        info!(%http_addr, "zrpc-server accepting HTTP-CONNECT upgrades");

        let http_server = server.clone();
        tokio::spawn(async move {
            if let Err(e) = http_server.accept_http(http_listener).await {
                tracing::error!("HTTP-CONNECT accept loop stopped: {e}");
            }
        });
    }

    server.accept(listener).await.context("TCP accept loop stopped")
}
