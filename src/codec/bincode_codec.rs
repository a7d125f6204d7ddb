// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The mandatory `"application/gob"` codec.
//!
//! Go's `encoding/gob` has no meaningful Rust equivalent, so this codec
//! substitutes `bincode` as the binary encoding while keeping the wire tag
//! name for handshake compatibility (DESIGN.md decision 3). Framing is the
//! shared length-delimited scheme in [`super::frame`].
//!
//! The header is a concrete struct, so `bincode` encodes it directly. The
//! body is a `serde_json::Value` with no fixed shape, and `Value`'s
//! `Deserialize` impl goes through `deserialize_any`, which `bincode`
//! rejects outright (`DeserializeAnyNotSupported`). So the body travels as
//! an opaque JSON blob inside its own length-delimited frame instead of
//! being handed to `bincode` directly — still a binary frame on the wire,
//! just one whose payload is self-describing where `bincode`'s isn't.

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{ReadHalf, WriteHalf};

use super::{CodecReader, CodecWriter, Header, frame};
use crate::{
    dial::BoxedStream,
    error::{Result, RpcError},
};

pub struct BincodeReader {
    read_half: ReadHalf<BoxedStream>,
}

pub struct BincodeWriter {
    write_half: WriteHalf<BoxedStream>,
}

pub fn split(stream: BoxedStream) -> (BincodeReader, BincodeWriter) {
    let (read_half, write_half) = tokio::io::split(stream);
    (BincodeReader { read_half }, BincodeWriter { write_half })
}

#[async_trait]
impl CodecReader for BincodeReader {
    async fn read_header(&mut self) -> Result<Header> {
        let buf = frame::read_frame(&mut self.read_half).await?;
        bincode::deserialize(&buf).map_err(|e| RpcError::Handshake(format!("bad header: {e}")))
    }

    async fn read_body(&mut self) -> Result<Value> {
        let buf = frame::read_frame(&mut self.read_half).await?;
        serde_json::from_slice(&buf).map_err(|e| RpcError::DecodeBody(e.to_string()))
    }

    async fn drain_body(&mut self) -> Result<()> {
        frame::read_frame(&mut self.read_half).await?;
        Ok(())
    }
}

#[async_trait]
impl CodecWriter for BincodeWriter {
    async fn write(&mut self, header: &Header, body: &Value) -> Result<()> {
        let header_bytes =
            bincode::serialize(header).map_err(|e| RpcError::DecodeBody(e.to_string()))?;
        let body_bytes =
            serde_json::to_vec(body).map_err(|e| RpcError::DecodeBody(e.to_string()))?;
        frame::write_frame(&mut self.write_half, &header_bytes).await?;
        frame::write_frame(&mut self.write_half, &body_bytes).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        let _ = self.write_half.shutdown().await;
        Ok(())
    }
}
