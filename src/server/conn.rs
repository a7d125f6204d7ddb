// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Per-connection handshake, serve loop, and handle-timeout state machine
//! (spec.md §4.2). Generalizes `client::client::ClientConnection`'s
//! read-loop/send-lock shape from the teacher to the server side of the
//! protocol.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use serde_json::Value;
use tokio::{
    sync::{Mutex, Notify},
    task::JoinSet,
};
use tracing::{debug, warn};

use super::service::ServiceMap;
use crate::{
    codec::{CodecWriter, Header, registry as codec_registry},
    dial::BoxedStream,
    error::{Result, RpcError},
    option::{ConnectOption, MAGIC_NUMBER},
};

/// Reads the length-delimited JSON handshake and validates it per spec.md
/// §4.2: malformed JSON, a bad magic, or an unknown codec tag all reject the
/// stream by closing it without a reply.
async fn read_handshake(stream: &mut BoxedStream) -> Result<ConnectOption> {
    let bytes = crate::codec::frame::read_frame(stream).await?;
    let opt: ConnectOption = serde_json::from_slice(&bytes)
        .map_err(|e| RpcError::Handshake(format!("malformed option: {e}")))?;

    if opt.magic != MAGIC_NUMBER {
        return Err(RpcError::Handshake(format!("bad magic {:#x}", opt.magic)));
    }
    if !codec_registry::is_known(&opt.codec_tag) {
        return Err(RpcError::CodecUnknown(opt.codec_tag));
    }
    Ok(opt)
}

/// Serves one already-accepted connection end to end: handshake, then the
/// request/response multiplex loop, until the peer disconnects or sends an
/// unparseable header. Shared by the raw TCP listener and the HTTP-CONNECT
/// upgrade path (spec.md §4.2's "hands the raw stream to the standard serve
/// path").
pub async fn serve_connection(service_map: Arc<ServiceMap>, mut stream: BoxedStream) -> Result<()> {
    let opt = match read_handshake(&mut stream).await {
        Ok(opt) => opt,
        Err(e) => {
            debug!("rejecting connection during handshake: {e}");
            return Err(e);
        }
    };

    let (mut reader, writer) = codec_registry::construct(&opt.codec_tag, stream)?;
    let writer = Arc::new(Mutex::new(writer));
    let mut in_flight = JoinSet::new();

    loop {
        let header = match reader.read_header().await {
            Ok(h) => h,
            Err(e) => {
                debug!("serve loop terminating: {e}");
                break;
            }
        };

        let body = match reader.read_body().await {
            Ok(v) => v,
            Err(e) => {
                send_error(&writer, &header, format!("reading body {e}")).await;
                continue;
            }
        };

        let handler = match service_map.find(&header.service_method) {
            Ok(h) => h,
            Err(e) => {
                send_error(&writer, &header, e.to_string()).await;
                continue;
            }
        };

        spawn_handled_request(&mut in_flight, Arc::clone(&writer), header, body, handler, opt.handle_timeout);
    }

    // Wait group: every non-detached handler finishes before the codec
    // closes (spec.md §4.2/§5). Handlers abandoned by handle-timeout are not
    // tracked here — see `spawn_handled_request`.
    while in_flight.join_next().await.is_some() {}

    let mut writer = writer.lock().await;
    writer.close().await
}

fn spawn_handled_request(
    in_flight: &mut JoinSet<()>,
    writer: Arc<Mutex<Box<dyn CodecWriter>>>,
    header: Header,
    args: Value,
    handler: Arc<dyn super::service::Handler>,
    handle_timeout: std::time::Duration,
) {
    let sent = Arc::new(AtomicBool::new(false));
    let called = Arc::new(Notify::new());
    let outcome: Arc<Mutex<Option<std::result::Result<Value, String>>>> = Arc::new(Mutex::new(None));

    // The handler itself always runs to completion in its own task, detached
    // from the wait group: a late arrival after handle-timeout is silently
    // discarded (spec.md §4.2's state machine, §9's "detached handlers").
    let outcome_for_handler = Arc::clone(&outcome);
    let called_for_handler = Arc::clone(&called);
    tokio::spawn(async move {
        let result = handler.call(args).await;
        *outcome_for_handler.lock().await = Some(result);
        called_for_handler.notify_one();
    });

    in_flight.spawn(async move {
        if handle_timeout.is_zero() {
            called.notified().await;
            let result = outcome.lock().await.take().expect("handler signalled completion");
            respond(&writer, &sent, header, result).await;
            return;
        }

        tokio::select! {
            _ = called.notified() => {
                let result = outcome.lock().await.take().expect("handler signalled completion");
                respond(&writer, &sent, header, result).await;
            }
            _ = tokio::time::sleep(handle_timeout) => {
                warn!(seq = header.seq, "request handle timeout after {handle_timeout:?}");
                let timeout_err = RpcError::HandleTimeout(handle_timeout).to_string();
                respond(&writer, &sent, header, Err(timeout_err)).await;
                // the detached handler task above keeps running; its eventual
                // `notify_one` has no listener left and is a no-op.
            }
        }
    });
}

/// Writes exactly one response, gated by `sent` so a late write after
/// handle-timeout has already answered is silently dropped (spec.md §9).
async fn respond(
    writer: &Mutex<Box<dyn CodecWriter>>,
    sent: &AtomicBool,
    header: Header,
    result: std::result::Result<Value, String>,
) {
    if sent.swap(true, Ordering::SeqCst) {
        return;
    }
    let (response_header, body) = match result {
        Ok(v) => (header, v),
        Err(e) => {
            let seq = header.seq;
            let service_method = header.service_method;
            (Header { service_method, seq, error: e }, Value::Null)
        }
    };
    let mut w = writer.lock().await;
    if let Err(e) = w.write(&response_header, &body).await {
        warn!("failed writing response: {e}");
    }
}

async fn send_error(writer: &Arc<Mutex<Box<dyn CodecWriter>>>, header: &Header, error: String) {
    let response = Header {
        service_method: header.service_method.clone(),
        seq: header.seq,
        error,
    };
    let mut w = writer.lock().await;
    if let Err(e) = w.write(&response, &Value::Null).await {
        warn!("failed writing error response: {e}");
    }
}
