// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A minimal example service used by the demo binaries and by spec.md §8's
//! S1 end-to-end scenario: `Arith.Mul(a, b) -> a * b`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{error::Result, server::Server};

#[derive(Deserialize)]
#[serde(untagged)]
enum MulArgs {
    Pair(i64, i64),
    Named { a: i64, b: i64 },
}

pub struct Arith;

#[async_trait]
impl crate::server::Handler for Arith {
    async fn call(&self, args: Value) -> std::result::Result<Value, String> {
        let args: MulArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let (a, b) = match args {
            MulArgs::Pair(a, b) => (a, b),
            MulArgs::Named { a, b } => (a, b),
        };
        Ok(serde_json::json!(a * b))
    }
}

/// Registers `Arith.Mul` on `server`. Convenience used by the demo binaries
/// and integration tests rather than exercising `Server::register` by hand
/// each time.
pub fn register(server: &Server) -> Result<()> {
    server.register("Arith", "Mul", Arc::new(Arith))
}
