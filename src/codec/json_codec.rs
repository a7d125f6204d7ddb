// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! An optional `"application/json"` codec, useful for debugging a stream
//! with a plain text capture. Framing is the same length-delimited scheme
//! used by [`super::bincode_codec`]; only the payload encoding differs.

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{ReadHalf, WriteHalf};

use super::{CodecReader, CodecWriter, Header, frame};
use crate::{
    dial::BoxedStream,
    error::{Result, RpcError},
};

pub struct JsonReader {
    read_half: ReadHalf<BoxedStream>,
}

pub struct JsonWriter {
    write_half: WriteHalf<BoxedStream>,
}

pub fn split(stream: BoxedStream) -> (JsonReader, JsonWriter) {
    let (read_half, write_half) = tokio::io::split(stream);
    (JsonReader { read_half }, JsonWriter { write_half })
}

#[async_trait]
impl CodecReader for JsonReader {
    async fn read_header(&mut self) -> Result<Header> {
        let buf = frame::read_frame(&mut self.read_half).await?;
        serde_json::from_slice(&buf).map_err(|e| RpcError::Handshake(format!("bad header: {e}")))
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
impl CodecWriter for JsonWriter {
    async fn write(&mut self, header: &Header, body: &Value) -> Result<()> {
        let header_bytes =
            serde_json::to_vec(header).map_err(|e| RpcError::DecodeBody(e.to_string()))?;
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
