// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Owns one connection; multiplexes many outstanding calls by sequence
//! number; honours call cancellation (spec.md §4.3).
//!
//! Generalizes `client::client::ClientConnection` from the teacher: the same
//! split reader/writer halves, the same "spawn a background task that reads
//! until the stream dies, then drain everything outstanding" shape, but
//! keyed by RPC sequence number instead of iSCSI ITT.

pub mod call;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use call::{Call, CallResult};

use crate::{
    codec::{CodecReader, CodecWriter, Header, registry as codec_registry},
    dial::BoxedStream,
    error::{Result, RpcError},
    option::ConnectOption,
};

struct ClientInner {
    writer: Mutex<Box<dyn CodecWriter>>,
    opt: ConnectOption,
    seq_counter: AtomicU64,
    pending: DashMap<u64, Call>,
    closing: AtomicBool,
    shutdown: AtomicBool,
}

/// A handle to one multiplexed connection. Cheap to clone (internally
/// `Arc`-backed), matching the teacher's `Arc<ClientConnection>` handles.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Writes the JSON handshake, splits the stream into the negotiated
    /// codec's reader/writer halves, and spawns the background receive
    /// loop. This is the "constructor" spec.md §4.4 races against
    /// `connect_timeout`.
    pub async fn handshake(mut stream: BoxedStream, opt: ConnectOption) -> Result<Self> {
        use tokio::io::AsyncWriteExt;

        let opt_bytes = serde_json::to_vec(&opt)
            .map_err(|e| RpcError::Handshake(format!("failed to encode option: {e}")))?;
        crate::codec::frame::write_frame(&mut stream, &opt_bytes).await?;
        stream.flush().await?;

        if !codec_registry::is_known(&opt.codec_tag) {
            return Err(RpcError::CodecUnknown(opt.codec_tag.clone()));
        }
        let (reader, writer) = codec_registry::construct(&opt.codec_tag, stream)?;

        let inner = Arc::new(ClientInner {
            writer: Mutex::new(writer),
            opt,
            seq_counter: AtomicU64::new(1),
            pending: DashMap::new(),
            closing: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        });

        let loop_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            receive_loop(loop_inner, reader).await;
        });

        Ok(Self { inner })
    }

    /// Submits a call without blocking on its reply. Returns the assigned
    /// sequence number and a receiver that is signalled exactly once
    /// (spec.md §8 law 2).
    pub async fn go(
        &self,
        service_method: impl Into<String>,
        args: Value,
    ) -> Result<(u64, tokio::sync::mpsc::Receiver<CallResult>)> {
        if self.inner.shutdown.load(Ordering::SeqCst) || self.inner.closing.load(Ordering::SeqCst) {
            return Err(RpcError::Shutdown);
        }

        let seq = self.inner.seq_counter.fetch_add(1, Ordering::SeqCst);
        let service_method = service_method.into();
        let (call, done_rx) = Call::new(seq, service_method.clone(), args.clone());
        self.inner.pending.insert(seq, call);

        let header = Header::request(service_method, seq);
        let write_result = {
            let mut writer = self.inner.writer.lock().await;
            writer.write(&header, &args).await
        };

        if let Err(e) = write_result {
            if let Some((_, call)) = self.inner.pending.remove(&seq) {
                call.finish(CallResult {
                    seq,
                    reply: None,
                    error: Some(e.to_string()),
                })
                .await;
            }
            return Err(e);
        }

        Ok((seq, done_rx))
    }

    /// Issues a call and awaits either the reply, cancellation of `cancel`,
    /// or `deadline` elapsing — Rust's stand-in for spec.md's Go-flavored
    /// `ctx` (deadline + cancellation bundled into one value; DESIGN.md
    /// decision 5). `deadline` of `None` means no deadline, matching
    /// spec.md §4.3's "zero means unbounded". A late response for an
    /// abandoned call is silently discarded by the receive loop (spec.md
    /// §5's cancellation semantics) because the call is removed from
    /// `pending` here before either error is returned.
    pub async fn call(
        &self,
        service_method: impl Into<String>,
        args: Value,
        deadline: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let service_method = service_method.into();
        let (seq, done_rx) = self.go(service_method, args).await?;
        self.await_reply(seq, done_rx, deadline, cancel).await
    }

    async fn await_reply(
        &self,
        seq: u64,
        mut done_rx: tokio::sync::mpsc::Receiver<CallResult>,
        deadline: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let deadline_elapsed = async {
            match deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                self.inner.pending.remove(&seq);
                Err(RpcError::CallCancelled("context cancelled".to_string()))
            }
            _ = deadline_elapsed => {
                self.inner.pending.remove(&seq);
                Err(RpcError::CallCancelled(format!("deadline of {deadline:?} elapsed")))
            }
            res = done_rx.recv() => {
                let result = res.ok_or(RpcError::Shutdown)?;
                match result.error {
                    Some(e) => Err(RpcError::Handler(e)),
                    None => Ok(result.reply.unwrap_or(Value::Null)),
                }
            }
        }
    }

    /// Idempotent close. A second call observes `shutdown` already set and
    /// returns `ErrShutdown` (spec.md §4.3).
    pub async fn close(&self) -> Result<()> {
        if self.inner.closing.swap(true, Ordering::SeqCst) {
            return Err(RpcError::Shutdown);
        }
        let mut writer = self.inner.writer.lock().await;
        writer.close().await
    }

    pub fn codec_tag(&self) -> &str {
        &self.inner.opt.codec_tag
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }
}

/// Drains every pending call with `err`, in the fixed `send_lock` →
/// `pending` order spec.md §4.3/§5 mandates, so a write in flight inside
/// `go()` never races a concurrent drain of the same entry.
async fn terminate_calls(inner: &Arc<ClientInner>, err: RpcError) {
    inner.shutdown.store(true, Ordering::SeqCst);
    let _writer_guard = inner.writer.lock().await;

    let seqs: Vec<u64> = inner.pending.iter().map(|e| *e.key()).collect();
    for seq in seqs {
        if let Some((_, call)) = inner.pending.remove(&seq) {
            call.finish(CallResult {
                seq,
                reply: None,
                error: Some(err.to_string()),
            })
            .await;
        }
    }
}

async fn receive_loop(inner: Arc<ClientInner>, mut reader: Box<dyn CodecReader>) {
    loop {
        let header = match reader.read_header().await {
            Ok(h) => h,
            Err(e) => {
                warn!("client receive loop terminating: {e}");
                terminate_calls(&inner, e).await;
                return;
            }
        };

        let Some((_, call)) = inner.pending.remove(&header.seq) else {
            debug!("no pending call for seq={}; draining body", header.seq);
            if let Err(e) = reader.drain_body().await {
                terminate_calls(&inner, e).await;
                return;
            }
            continue;
        };

        if header.is_error() {
            if let Err(e) = reader.drain_body().await {
                terminate_calls(&inner, e).await;
                return;
            }
            call.finish(CallResult {
                seq: header.seq,
                reply: None,
                error: Some(header.error),
            })
            .await;
            continue;
        }

        match reader.read_body().await {
            Ok(value) => {
                call.finish(CallResult {
                    seq: header.seq,
                    reply: Some(value),
                    error: None,
                })
                .await;
            }
            Err(e) => {
                call.finish(CallResult {
                    seq: header.seq,
                    reply: None,
                    error: Some(format!("reading body {e}")),
                })
                .await;
            }
        }
    }
}
