// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Demo registry process: exposes the GET/POST liveness endpoint that
//! servers heartbeat into and clients discover through.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use zrpc::{cfg::config::RegistryServerConfig, registry::Registry};

#[derive(Parser, Debug)]
#[command(name = "zrpc-registry", about = "Runs the zRPC server registry")]
struct Args {
    #[arg(long, default_value = "config/registry.yaml")]
    config: String,

    #[arg(long, default_value = "config/logger.yaml")]
    log_config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = zrpc::cfg::logger::init_logger(&args.log_config).context("init logger")?;

    let cfg = RegistryServerConfig::load_from_file(&args.config).context("load registry config")?;

    let registry = Registry::with_path_and_timeout(cfg.path.clone(), cfg.timeout);
    let listener = TcpListener::bind(&cfg.bind_addr).await.context("bind TCP listener")?;
    info!(bind_addr = %cfg.bind_addr, path = %cfg.path, "zrpc-registry listening");

    axum::serve(listener, registry.router()).await.context("registry HTTP server stopped")
}
