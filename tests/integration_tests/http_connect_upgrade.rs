// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! spec.md §4.3/§6, S3: a client dials through the HTTP-CONNECT upgrade path
//! and ends up multiplexing calls exactly like a raw TCP connection would.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use zrpc::{dial, option::{ConnectOption, DEFAULT_RPC_PATH}, server::{Handler, Server}};

struct Echo;

#[async_trait]
impl Handler for Echo {
    async fn call(&self, args: Value) -> Result<Value, String> {
        Ok(args)
    }
}

#[tokio::test]
async fn dial_http_connect_reaches_the_registered_handler() {
    let server = Server::new();
    server.register("Echo", "Say", Arc::new(Echo)).expect("register");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = server.accept_http(listener).await;
    });

    let client = dial::dial_http_connect(&addr.to_string(), DEFAULT_RPC_PATH, ConnectOption::default())
        .await
        .expect("dial_http_connect");
    let cancel = CancellationToken::new();

    let reply = client.call("Echo.Say", json!("through CONNECT"), None, &cancel).await.expect("call");
    assert_eq!(reply, json!("through CONNECT"));
}

#[tokio::test]
async fn x_dial_parses_the_http_prefixed_address() {
    let server = Server::new();
    server.register("Echo", "Say", Arc::new(Echo)).expect("register");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = server.accept_http(listener).await;
    });

    let client = dial::x_dial(&format!("http@{addr}"), ConnectOption::default()).await.expect("x_dial");
    let cancel = CancellationToken::new();

    let reply = client.call("Echo.Say", json!(7), None, &cancel).await.expect("call");
    assert_eq!(reply, json!(7));
}

#[tokio::test]
async fn connect_on_the_wrong_path_is_rejected() {
    let server = Server::new();
    server.register("Echo", "Say", Arc::new(Echo)).expect("register");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = server.accept_http(listener).await;
    });

    let err = dial::dial_http_connect(&addr.to_string(), "/wrong/path", ConnectOption::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unexpected CONNECT response"));
}
