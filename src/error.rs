// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Error kinds surfaced by the runtime, one variant per failure mode in the
//! wire protocol, the client's call lifecycle, and the registry/discovery
//! HTTP surface.

use std::time::Duration;

use thiserror::Error;

/// Errors produced anywhere in the RPC runtime.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The handshake `ConnectOption` JSON was malformed, had a bad magic, or
    /// named an unknown codec tag. The connection is closed without a reply.
    #[error("rpc server: bad handshake: {0}")]
    Handshake(String),

    /// A codec tag has no registered constructor.
    #[error("rpc: unknown codec tag {0:?}")]
    CodecUnknown(String),

    /// A call was submitted after the client started shutting down.
    #[error("connection is shut down")]
    Shutdown,

    /// The underlying transport failed; terminal for the connection.
    #[error("rpc network failure: {0}")]
    Network(#[from] std::io::Error),

    /// The response body failed to decode into the call's reply type.
    #[error("reading body {0}")]
    DecodeBody(String),

    /// `service_method` named an unregistered service or method.
    #[error("rpc server: {0}")]
    Dispatch(String),

    /// A registry heartbeat POST or a `RegistryDiscovery` refresh GET
    /// failed at the HTTP layer. Distinct from `Dispatch`, which names a
    /// server-side "no such service/method" failure, not a network one.
    #[error("rpc registry: {0}")]
    Registry(String),

    /// The registered handler itself returned an error.
    #[error("{0}")]
    Handler(String),

    /// The server's `handle_timeout` elapsed before the handler completed.
    #[error("rpc server: request handle timeout: expect within {0:?}")]
    HandleTimeout(Duration),

    /// The dialer's `connect_timeout` elapsed before the connection was
    /// established.
    #[error("rpc client: connect timeout: expect within {0:?}")]
    ConnectTimeout(Duration),

    /// The caller's context was cancelled or its deadline elapsed before a
    /// reply arrived.
    #[error("rpc client: call failed: {0}")]
    CallCancelled(String),

    /// `Discovery::get`/`get_all` was asked for a server but the address
    /// list was empty.
    #[error("rpc discovery: no available servers")]
    DiscoveryEmpty,

    /// `Discovery::get` was asked for a `SelectMode` it doesn't implement.
    #[error("rpc discovery: not supported select mode")]
    SelectModeUnknown,

    /// The registry received a heartbeat POST without the required header.
    #[error("missing X-Zrpc-Server header")]
    RegistryMissingHeader,
}

/// Convenience alias used throughout the library surface.
pub type Result<T> = std::result::Result<T, RpcError>;
