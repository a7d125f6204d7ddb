// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The framing + encoding layer every RPC stream negotiates during its
//! handshake.
//!
//! A codec reads and writes exactly one `(header, body)` pair per message,
//! self-delimited on the wire via a length-prefixed frame (see [`frame`]).
//! The reader and writer halves are split into separate trait objects —
//! [`CodecReader`] and [`CodecWriter`] — so a connection's background
//! receive loop can own the reader exclusively while callers serialize
//! writes through the client's send-lock, the same split the teacher keeps
//! between `ClientConnection::reader` and `ClientConnection::writer`.
//!
//! Arguments and replies are carried as [`serde_json::Value`] rather than as
//! a generic type parameter: this keeps the codec traits object-safe so the
//! codec registry ([`registry`]) can hand back a boxed reader/writer pair
//! chosen at handshake time from a runtime tag string, with no reflection
//! involved (spec.md §9 Design Notes).

pub mod bincode_codec;
pub mod frame;
pub mod json_codec;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Header carried by every message, independent of the negotiated codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// `"<service>.<method>"`.
    pub service_method: String,
    /// Assigned by the client, echoed by the server.
    pub seq: u64,
    /// Empty on success; a non-empty string is a failure reported by the
    /// server.
    pub error: String,
}

impl Header {
    pub fn request(service_method: impl Into<String>, seq: u64) -> Self {
        Self {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// The read half of a framed connection. Owned exclusively by one task at a
/// time (the server's serve loop, or the client's receive loop).
#[async_trait]
pub trait CodecReader: Send {
    /// Reads the next header frame. End-of-stream or a malformed frame is a
    /// terminal error for the connection.
    async fn read_header(&mut self) -> Result<Header>;

    /// Reads the body frame following a just-read header. A decode failure
    /// here is non-terminal: the header was already valid and the frame
    /// boundary is intact.
    async fn read_body(&mut self) -> Result<Value>;

    /// Reads and discards the next body frame without decoding it, used when
    /// a response has no matching call or a request targets an unknown
    /// method.
    async fn drain_body(&mut self) -> Result<()>;
}

/// The write half of a framed connection. Callers MUST serialize writes
/// through a single send-lock per connection so that no two responses
/// interleave on the wire (spec.md §4.2/§4.3, law 3).
#[async_trait]
pub trait CodecWriter: Send {
    /// Writes one complete `(header, body)` pair.
    async fn write(&mut self, header: &Header, body: &Value) -> Result<()>;

    /// Releases the underlying transport. Idempotent.
    async fn close(&mut self) -> Result<()>;
}

/// Convenience for callers that want a typed reply without threading
/// `serde_json::Value` conversions through every call site.
pub fn decode_value<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| crate::error::RpcError::DecodeBody(e.to_string()))
}

/// Convenience for callers turning a typed argument into the wire value.
pub fn encode_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| crate::error::RpcError::DecodeBody(e.to_string()))
}
