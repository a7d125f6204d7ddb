// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! spec.md §4.2/§8 S4: a connection carrying a bad magic or an unknown
//! codec tag is rejected before any request is ever dispatched.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::{io::AsyncWriteExt, net::TcpListener};
use zrpc::{
    option::ConnectOption,
    server::{Handler, Server},
};

struct Noop;

#[async_trait]
impl Handler for Noop {
    async fn call(&self, args: Value) -> Result<Value, String> {
        Ok(args)
    }
}

async fn spawn_server() -> String {
    let server = Server::new();
    server.register("Svc", "Noop", Arc::new(Noop)).expect("register");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = server.accept(listener).await;
    });
    addr.to_string()
}

#[tokio::test]
async fn bad_magic_is_rejected_without_a_reply() {
    let addr = spawn_server().await;
    let mut opt = ConnectOption::default();
    opt.magic = 0xdead_beef;

    let mut stream = tokio::net::TcpStream::connect(&addr).await.expect("connect");
    let bytes = serde_json::to_vec(&opt).expect("encode");
    zrpc::codec::frame::write_frame(&mut stream, &bytes).await.expect("write frame");
    stream.flush().await.expect("flush");

    // The server closes the stream without ever framing a response.
    let mut buf = [0u8; 1];
    let n = tokio::io::AsyncReadExt::read(&mut stream, &mut buf).await.expect("read");
    assert_eq!(n, 0, "server should have closed the connection");
}

#[tokio::test]
async fn unknown_codec_tag_is_rejected() {
    let addr = spawn_server().await;
    let opt = ConnectOption { codec_tag: "application/does-not-exist".to_string(), ..ConnectOption::default() };

    let mut stream = tokio::net::TcpStream::connect(&addr).await.expect("connect");
    let bytes = serde_json::to_vec(&opt).expect("encode");
    zrpc::codec::frame::write_frame(&mut stream, &bytes).await.expect("write frame");
    stream.flush().await.expect("flush");

    let mut buf = [0u8; 1];
    let n = tokio::io::AsyncReadExt::read(&mut stream, &mut buf).await.expect("read");
    assert_eq!(n, 0, "server should have closed the connection");
}
