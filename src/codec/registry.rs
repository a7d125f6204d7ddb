// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Maps a handshake codec tag to a constructor that splits a raw stream
//! into a matching reader/writer pair. Mirrors the teacher's
//! `DashMap`-backed shared-state pattern (`client::pool_sessions::Pool`).

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use super::{CodecReader, CodecWriter, bincode_codec, json_codec};
use crate::{
    dial::BoxedStream,
    error::{Result, RpcError},
    option::DEFAULT_CODEC_TAG,
};

/// A constructor that takes ownership of a raw duplex stream and returns a
/// boxed reader/writer pair ready to frame messages.
pub type CodecConstructor =
    Arc<dyn Fn(BoxedStream) -> (Box<dyn CodecReader>, Box<dyn CodecWriter>) + Send + Sync>;

static REGISTRY: Lazy<DashMap<String, CodecConstructor>> = Lazy::new(|| {
    let map = DashMap::new();
    map.insert(
        DEFAULT_CODEC_TAG.to_string(),
        Arc::new(|s: BoxedStream| {
            let (r, w) = bincode_codec::split(s);
            (Box::new(r) as Box<dyn CodecReader>, Box::new(w) as Box<dyn CodecWriter>)
        }) as CodecConstructor,
    );
    map.insert(
        "application/json".to_string(),
        Arc::new(|s: BoxedStream| {
            let (r, w) = json_codec::split(s);
            (Box::new(r) as Box<dyn CodecReader>, Box::new(w) as Box<dyn CodecWriter>)
        }) as CodecConstructor,
    );
    map
});

/// Registers (or replaces) the constructor for a codec tag.
pub fn register_codec(tag: impl Into<String>, ctor: CodecConstructor) {
    REGISTRY.insert(tag.into(), ctor);
}

/// Looks up a codec tag and splits `stream` into a reader/writer pair.
pub fn construct(
    tag: &str,
    stream: BoxedStream,
) -> Result<(Box<dyn CodecReader>, Box<dyn CodecWriter>)> {
    let ctor = REGISTRY
        .get(tag)
        .ok_or_else(|| RpcError::CodecUnknown(tag.to_string()))?;
    Ok(ctor(stream))
}

/// Whether a tag currently has a registered constructor.
pub fn is_known(tag: &str) -> bool {
    REGISTRY.contains_key(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tags_are_registered() {
        assert!(is_known("application/gob"));
        assert!(is_known("application/json"));
        assert!(!is_known("application/does-not-exist"));
    }
}
