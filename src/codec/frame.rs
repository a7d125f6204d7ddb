// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Length-delimited framing shared by every [`super::Codec`] implementation.
//!
//! Each frame on the wire is a big-endian `u32` byte length followed by
//! exactly that many payload bytes. This is what makes an otherwise
//! non-self-delimiting serialization (`bincode`) self-delimited per
//! spec.md §4.1, the same way the teacher's iSCSI read loop reconstructs one
//! complete PDU per read by trusting a length field in the header.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, RpcError};

/// Largest single frame this runtime will allocate for. Guards against a
/// corrupt or hostile length prefix turning into an unbounded allocation.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

pub async fn write_frame<W: AsyncWrite + Unpin + Send>(
    w: &mut W,
    payload: &[u8],
) -> Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| RpcError::Handshake("frame too large".into()))?;
    w.write_all(&len.to_be_bytes()).await?;
    w.write_all(payload).await?;
    Ok(())
}

pub async fn read_frame<R: AsyncRead + Unpin + Send>(r: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(RpcError::Handshake(format!(
            "frame length {len} exceeds max {MAX_FRAME_LEN}"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf).await?;
    Ok(buf)
}
