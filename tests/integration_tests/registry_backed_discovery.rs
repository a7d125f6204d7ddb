// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! spec.md §4.6/§4.7, §8 S5/S6: a server heartbeats into a registry, an
//! `XClient` discovers it through `RegistryDiscovery`, and calls succeed
//! through the discovered address. Also covers registry entry expiry
//! removing a server from future discovery.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use zrpc::{
    discovery::RegistryDiscovery,
    option::ConnectOption,
    registry::{self, Registry},
    server::{Handler, Server},
    xclient::XClient,
};

struct Tag(&'static str);

#[async_trait]
impl Handler for Tag {
    async fn call(&self, _args: Value) -> Result<Value, String> {
        Ok(json!(self.0))
    }
}

async fn spawn_tagged_server(tag: &'static str) -> String {
    let server = Server::new();
    server.register("Echo", "Say", Arc::new(Tag(tag))).expect("register");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = server.accept(listener).await;
    });
    addr.to_string()
}

struct Echo;

#[async_trait]
impl Handler for Echo {
    async fn call(&self, args: Value) -> Result<Value, String> {
        Ok(args)
    }
}

async fn spawn_registry(timeout: Duration) -> String {
    let reg = Registry::with_timeout(timeout);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    let router = reg.router();
    tokio::spawn(async move { axum::serve(listener, router).await });
    format!("http://{addr}/_zrpc_/registry")
}

async fn spawn_echo_server() -> String {
    let server = Server::new();
    server.register("Echo", "Say", Arc::new(Echo)).expect("register");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = server.accept(listener).await;
    });
    addr.to_string()
}

#[tokio::test]
async fn xclient_discovers_and_calls_a_heartbeating_server() {
    let registry_url = spawn_registry(Duration::from_secs(300)).await;
    let server_addr = spawn_echo_server().await;

    registry::heartbeat(registry_url.clone(), server_addr.clone(), Some(Duration::from_secs(60)))
        .await
        .expect("start heartbeat");

    // Give the immediate heartbeat POST a moment to land.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let discovery = Arc::new(RegistryDiscovery::with_refresh_interval(registry_url, Duration::from_millis(10)));
    let xclient = XClient::new(discovery, zrpc::discovery::SelectMode::RoundRobin, ConnectOption::default());
    let cancel = CancellationToken::new();

    let reply = xclient.call("Echo.Say", json!("hi"), None, &cancel).await.expect("call");
    assert_eq!(reply, json!("hi"));
}

#[tokio::test]
async fn expired_registry_entries_stop_being_discovered() {
    let registry_url = spawn_registry(Duration::from_millis(100)).await;
    let server_addr = spawn_echo_server().await;

    registry::heartbeat(registry_url.clone(), server_addr, None).await.expect("start heartbeat");
    tokio::time::sleep(Duration::from_millis(30)).await;

    let discovery = RegistryDiscovery::with_refresh_interval(registry_url, Duration::from_millis(5));
    let before = discovery.get_all().await.expect("get_all before expiry");
    assert_eq!(before.len(), 1);

    // Outlive the registry's liveness window without another heartbeat
    // landing in between (the heartbeat default period is far longer than
    // this timeout, so no fresh POST rescues the entry).
    tokio::time::sleep(Duration::from_millis(200)).await;

    let after = discovery.get_all().await.expect("get_all after expiry");
    assert!(after.is_empty());
}

#[tokio::test]
async fn xclient_fails_over_once_a_backends_heartbeats_stop() {
    let registry_url = spawn_registry(Duration::from_millis(200)).await;

    let s1_addr = spawn_tagged_server("s1").await;
    let s2_addr = spawn_tagged_server("s2").await;

    // `s1`'s heartbeat is a single POST with no ongoing task, modeling "s1
    // stops heartbeating" without needing to stop a spawned loop.
    let client = reqwest::Client::new();
    client.post(&registry_url).header("X-Zrpc-Server", &s1_addr).send().await.expect("post s1");

    registry::heartbeat(registry_url.clone(), s2_addr, Some(Duration::from_millis(20)))
        .await
        .expect("start s2 heartbeat");

    let discovery = Arc::new(RegistryDiscovery::with_refresh_interval(registry_url, Duration::from_millis(50)));
    let xclient = XClient::new(discovery, zrpc::discovery::SelectMode::RoundRobin, ConnectOption::default());
    let cancel = CancellationToken::new();

    // s1's single heartbeat keeps it alive for up to 200ms; outlive that
    // window (plus a refresh interval) without ever POSTing for it again.
    tokio::time::sleep(Duration::from_millis(260)).await;

    for _ in 0..6 {
        let reply = xclient.call("Echo.Say", json!(null), None, &cancel).await.expect("call");
        assert_eq!(reply, json!("s2"));
    }
}
