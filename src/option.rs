// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The per-connection handshake record that precedes every framed RPC
//! stream, and the path/timing constants that go with it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Magic number every handshake must carry. Chosen to match spec.md §3.
pub const MAGIC_NUMBER: u32 = 0x3bef_5c;

/// Codec tag mandated by the spec; must always be constructible.
pub const DEFAULT_CODEC_TAG: &str = "application/gob";

/// Canonical HTTP-CONNECT upgrade path. The historical source this protocol
/// is modeled on has a `/_zprc_` typo; we don't perpetuate it (spec.md §9).
pub const DEFAULT_RPC_PATH: &str = "/_zrpc_";

/// Default registry HTTP endpoint path.
pub const DEFAULT_REGISTRY_PATH: &str = "/_zrpc_/registry";

/// Default registry server-liveness window.
pub const DEFAULT_REGISTRY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_codec_tag() -> String {
    DEFAULT_CODEC_TAG.to_string()
}

/// The handshake sent by every client before any (header, body) frame.
///
/// Encoded as a self-delimited JSON object, independent of whatever codec
/// `codec_tag` subsequently negotiates for the header/body stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectOption {
    /// Must equal [`MAGIC_NUMBER`] or the server closes the stream.
    #[serde(default = "default_magic")]
    pub magic: u32,

    /// Selects the codec constructor used for the rest of the stream.
    #[serde(default = "default_codec_tag")]
    pub codec_tag: String,

    /// Upper bound on establishing the transport connection. Zero means
    /// unlimited.
    #[serde(default = "default_connect_timeout", with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Upper bound on a single handler invocation on the server side. Zero
    /// means unbounded.
    #[serde(default, with = "duration_secs")]
    pub handle_timeout: Duration,
}

fn default_magic() -> u32 {
    MAGIC_NUMBER
}

impl Default for ConnectOption {
    fn default() -> Self {
        Self {
            magic: MAGIC_NUMBER,
            codec_tag: default_codec_tag(),
            connect_timeout: default_connect_timeout(),
            handle_timeout: Duration::ZERO,
        }
    }
}

impl ConnectOption {
    /// Merges `self` over `base`, keeping `base`'s values where `self`
    /// leaves a field at its zero-ish default. Mirrors spec.md §4.4 step 1:
    /// "merge provided options with defaults; magic is forced to the
    /// canonical value".
    pub fn merged_with_default(mut self) -> Self {
        self.magic = MAGIC_NUMBER;
        if self.codec_tag.is_empty() {
            self.codec_tag = default_codec_tag();
        }
        self
    }
}

/// Serde helper: represent a `Duration` as a number of seconds, matching the
/// teacher's `cfg::config::serde_secs` convention.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_option_matches_spec() {
        let opt = ConnectOption::default();
        assert_eq!(opt.magic, MAGIC_NUMBER);
        assert_eq!(opt.codec_tag, "application/gob");
        assert_eq!(opt.connect_timeout, Duration::from_secs(10));
        assert_eq!(opt.handle_timeout, Duration::ZERO);
    }

    #[test]
    fn merge_forces_canonical_magic() {
        let mut opt = ConnectOption::default();
        opt.magic = 0xdead_beef;
        let merged = opt.merged_with_default();
        assert_eq!(merged.magic, MAGIC_NUMBER);
    }

    #[test]
    fn roundtrips_through_json() {
        let opt = ConnectOption::default();
        let encoded = serde_json::to_vec(&opt).expect("encode");
        let decoded: ConnectOption = serde_json::from_slice(&encoded).expect("decode");
        assert_eq!(decoded.magic, opt.magic);
        assert_eq!(decoded.codec_tag, opt.codec_tag);
    }
}
