// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A single outstanding request/response exchange, identified by `seq`
//! within one client connection (spec.md §3 "Call").

use serde_json::Value;
use tokio::sync::mpsc;

/// Channel capacity `done` must be constructed with. Spec.md §4.3 treats an
/// unbuffered `done` channel as a programming error; modeling the minimum
/// capacity as a constant keeps that contract explicit at the call site.
pub const DONE_CHANNEL_CAPACITY: usize = 1;

/// The outcome delivered on `Call::done` exactly once.
#[derive(Debug, Clone)]
pub struct CallResult {
    pub seq: u64,
    pub reply: Option<Value>,
    pub error: Option<String>,
}

/// One outstanding call. `done` is signalled exactly once across every code
/// path: success, server-reported error, body decode failure, shutdown, or
/// cancellation (spec.md §8 law 2).
pub struct Call {
    pub seq: u64,
    pub service_method: String,
    pub args: Value,
    pub done: mpsc::Sender<CallResult>,
}

impl Call {
    pub fn new(seq: u64, service_method: impl Into<String>, args: Value) -> (Self, mpsc::Receiver<CallResult>) {
        let (tx, rx) = mpsc::channel(DONE_CHANNEL_CAPACITY);
        (
            Self {
                seq,
                service_method: service_method.into(),
                args,
                done: tx,
            },
            rx,
        )
    }

    /// Signals completion. Errors (receiver dropped) are swallowed: a
    /// cancelled caller has already stopped listening, which is not itself
    /// a failure of the call machinery.
    pub async fn finish(&self, result: CallResult) {
        let _ = self.done.send(result).await;
    }
}
