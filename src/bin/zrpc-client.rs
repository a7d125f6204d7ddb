// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Demo client: discovers `Arith` backends through a registry and calls
//! `Arith.Mul` against whichever one `select_mode` picks.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use zrpc::{
    cfg::config::ClientConfig,
    discovery::RegistryDiscovery,
    option::ConnectOption,
    xclient::XClient,
};

#[derive(Parser, Debug)]
#[command(name = "zrpc-client", about = "Calls the demo Arith service through zRPC")]
struct Args {
    #[arg(long, default_value = "config/client.yaml")]
    config: String,

    #[arg(long, default_value = "config/logger.yaml")]
    log_config: String,

    /// First operand.
    #[arg(long, default_value_t = 6)]
    a: i64,

    /// Second operand.
    #[arg(long, default_value_t = 7)]
    b: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = zrpc::cfg::logger::init_logger(&args.log_config).context("init logger")?;

    let cfg = ClientConfig::load_from_file(&args.config).context("load client config")?;

    let discovery = Arc::new(RegistryDiscovery::with_refresh_interval(cfg.registry_url.clone(), cfg.refresh_interval));

    let opt = ConnectOption {
        codec_tag: cfg.codec_tag.clone(),
        connect_timeout: cfg.connect_timeout,
        ..ConnectOption::default()
    };
    let xclient = XClient::new(discovery, cfg.select_mode, opt);

    let cancel = CancellationToken::new();
    let reply = xclient
        .call("Arith.Mul", serde_json::json!([args.a, args.b]), None, &cancel)
        .await
        .context("Arith.Mul call failed")?;

    info!(a = args.a, b = args.b, reply = %reply, "Arith.Mul succeeded");
    println!("{} * {} = {reply}", args.a, args.b);

    xclient.close().await.context("close xclient")?;
    Ok(())
}
