// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! spec.md §5, §8 law 8/9: cancelling a caller's token aborts an in-flight
//! call promptly, and `XClient::broadcast` cancels every sibling call as
//! soon as one backend fails.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use zrpc::{
    discovery::{MultiServersDiscovery, SelectMode},
    error::RpcError,
    option::ConnectOption,
    server::{Handler, Server},
    xclient::XClient,
};

struct NeverReplies;

#[async_trait]
impl Handler for NeverReplies {
    async fn call(&self, _args: Value) -> Result<Value, String> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(json!("too late"))
    }
}

async fn spawn_server(service: &str, method: &str, handler: Arc<dyn Handler>) -> String {
    let server = Server::new();
    server.register(service, method, handler).expect("register");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = server.accept(listener).await;
    });
    addr.to_string()
}

#[tokio::test]
async fn cancelling_the_token_aborts_the_call_promptly() {
    let addr = spawn_server("Stuck", "Wait", Arc::new(NeverReplies)).await;
    let discovery = Arc::new(MultiServersDiscovery::new(vec![addr]));
    let xclient = XClient::new(discovery, SelectMode::RoundRobin, ConnectOption::default());

    let cancel = CancellationToken::new();
    let cancel_for_task = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_for_task.cancel();
    });

    let start = tokio::time::Instant::now();
    let err = xclient.call("Stuck.Wait", json!(null), None, &cancel).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, RpcError::CallCancelled(_)));
    assert!(elapsed < Duration::from_millis(500));
}

#[tokio::test]
async fn a_deadline_aborts_the_call_without_an_explicit_cancel() {
    let addr = spawn_server("Stuck", "Wait", Arc::new(NeverReplies)).await;
    let discovery = Arc::new(MultiServersDiscovery::new(vec![addr]));
    let xclient = XClient::new(discovery, SelectMode::RoundRobin, ConnectOption::default());
    let cancel = CancellationToken::new();

    let start = tokio::time::Instant::now();
    let err = xclient
        .call("Stuck.Wait", json!(null), Some(Duration::from_millis(50)), &cancel)
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, RpcError::CallCancelled(_)));
    assert!(elapsed < Duration::from_millis(500));
}

#[tokio::test]
async fn broadcast_cancels_siblings_once_one_backend_fails() {
    let slow_addr = spawn_server("Stuck", "Wait", Arc::new(NeverReplies)).await;

    struct Fails;
    #[async_trait]
    impl Handler for Fails {
        async fn call(&self, _args: Value) -> Result<Value, String> {
            Err("boom".to_string())
        }
    }
    let fail_addr = spawn_server("Stuck", "Wait", Arc::new(Fails)).await;

    let discovery = Arc::new(MultiServersDiscovery::new(vec![slow_addr, fail_addr]));
    let xclient = XClient::new(discovery, SelectMode::RoundRobin, ConnectOption::default());
    let cancel = CancellationToken::new();

    let start = tokio::time::Instant::now();
    let err = xclient.broadcast("Stuck.Wait", json!(null), None, &cancel).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, RpcError::Handler(_)));
    // Must not wait anywhere near the 30s the slow backend would otherwise
    // block for; the failing sibling's cancellation should cut it short.
    assert!(elapsed < Duration::from_millis(500));
}
