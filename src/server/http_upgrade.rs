// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The HTTP-CONNECT upgrade path (spec.md §4.2/§6).
//!
//! Go's `net/rpc` mounts this on `net/http` via the `Hijacker` interface: it
//! reads one `CONNECT` request line, writes a literal status line back, then
//! hands the raw, now-unbuffered socket to the ordinary serve path. The
//! wire text this runtime must produce (`"HTTP/1.0 200 Connected to
//! zRPC\n\n"`) and accept (`"CONNECT <path> HTTP/1.0\n\n"`) is a fixed,
//! three-line legacy preamble, not a real HTTP/1.1 request/response — axum's
//! typed `Response` and hyper's `Upgrade` mechanism assume the latter, so
//! this is a small hand-rolled parse over the raw stream, symmetric with
//! [`crate::dial::dial_http_connect`] on the client side and in the same
//! spirit as the teacher's hand-rolled PDU parsing.

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tracing::warn;

use super::service::ServiceMap;
use std::sync::Arc;

use crate::error::{Result, RpcError};

const MAX_PREAMBLE_LEN: usize = 8 * 1024;

struct Preamble {
    method: String,
    path: String,
}

async fn read_line(stream: &mut TcpStream) -> Result<String> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(RpcError::Handshake("connection closed before CONNECT preamble".into()));
        }
        if byte[0] == b'\n' {
            break;
        }
        if byte[0] != b'\r' {
            buf.push(byte[0]);
        }
        if buf.len() > MAX_PREAMBLE_LEN {
            return Err(RpcError::Handshake("CONNECT preamble too long".into()));
        }
    }
    String::from_utf8(buf).map_err(|e| RpcError::Handshake(e.to_string()))
}

/// Reads the request line plus the blank line that terminates it. This
/// protocol's preamble never carries headers, so the second line is
/// expected to be empty.
async fn read_preamble(stream: &mut TcpStream) -> Result<Preamble> {
    let line = read_line(stream).await?;
    let _blank = read_line(stream).await?;

    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();
    Ok(Preamble { method, path })
}

/// Accepts one raw TCP connection, performs the CONNECT handshake, and on
/// success serves it through the normal framed RPC loop. Any method other
/// than `CONNECT`, or a path other than `rpc_path`, gets a 405 and the
/// connection is closed (spec.md §4.2).
pub async fn handle_connection(service_map: Arc<ServiceMap>, mut stream: TcpStream, rpc_path: &str) -> Result<()> {
    let preamble = read_preamble(&mut stream).await?;

    if preamble.method != "CONNECT" || preamble.path != rpc_path {
        warn!(method = %preamble.method, path = %preamble.path, "rejecting non-CONNECT request on rpc path");
        let _ = stream.write_all(b"HTTP/1.0 405 Method Not Allowed\r\n\r\n").await;
        return Err(RpcError::Handshake(format!(
            "unexpected request {} {}",
            preamble.method, preamble.path
        )));
    }

    stream.write_all(b"HTTP/1.0 200 Connected to zRPC\n\n").await?;
    super::conn::serve_connection(service_map, Box::new(stream)).await
}
