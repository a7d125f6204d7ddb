// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! S1: a client dials a raw TCP server, calls a registered method, and gets
//! back the correct reply.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use zrpc::{dial, option::ConnectOption, server::{Handler, Server}};

struct Echo;

#[async_trait]
impl Handler for Echo {
    async fn call(&self, args: Value) -> Result<Value, String> {
        Ok(args)
    }
}

struct Fails;

#[async_trait]
impl Handler for Fails {
    async fn call(&self, _args: Value) -> Result<Value, String> {
        Err("deliberate failure".to_string())
    }
}

async fn spawn_server() -> String {
    let server = Server::new();
    server.register("Echo", "Say", Arc::new(Echo)).expect("register Echo.Say");
    server.register("Broken", "Fail", Arc::new(Fails)).expect("register Broken.Fail");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = server.accept(listener).await;
    });
    addr.to_string()
}

#[tokio::test]
async fn client_calls_registered_method_over_tcp() {
    let addr = spawn_server().await;
    let client = dial::dial("tcp", &addr, ConnectOption::default()).await.expect("dial");
    let cancel = CancellationToken::new();

    let reply = client.call("Echo.Say", json!({"greeting": "hello"}), None, &cancel).await.expect("call");
    assert_eq!(reply, json!({"greeting": "hello"}));
}

#[tokio::test]
async fn handler_error_surfaces_as_rpc_error_and_connection_survives() {
    let addr = spawn_server().await;
    let client = dial::dial("tcp", &addr, ConnectOption::default()).await.expect("dial");
    let cancel = CancellationToken::new();

    let err = client.call("Broken.Fail", json!(null), None, &cancel).await.unwrap_err();
    assert!(err.to_string().contains("deliberate failure"));

    // The connection must still be usable after an application-level error.
    let reply = client.call("Echo.Say", json!(42), None, &cancel).await.expect("call after error");
    assert_eq!(reply, json!(42));
}

#[tokio::test]
async fn unknown_service_method_does_not_kill_the_connection() {
    let addr = spawn_server().await;
    let client = dial::dial("tcp", &addr, ConnectOption::default()).await.expect("dial");
    let cancel = CancellationToken::new();

    let err = client.call("Nope.Missing", json!(null), None, &cancel).await.unwrap_err();
    assert!(err.to_string().contains("can't find service"));

    let reply = client.call("Echo.Say", json!(1), None, &cancel).await.expect("call after dispatch error");
    assert_eq!(reply, json!(1));
}
