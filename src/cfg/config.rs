// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! YAML-backed configuration for the three demo binaries, validated and
//! normalized the same way the teacher's `Config::validate_and_normalize`
//! does for its iSCSI session parameters.

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{discovery::SelectMode, option::{DEFAULT_CODEC_TAG, DEFAULT_REGISTRY_PATH, DEFAULT_REGISTRY_TIMEOUT, DEFAULT_RPC_PATH}};

fn default_bind_addr() -> String {
    "127.0.0.1:9000".to_string()
}

fn default_codec_tag() -> String {
    DEFAULT_CODEC_TAG.to_string()
}

fn default_rpc_path() -> String {
    DEFAULT_RPC_PATH.to_string()
}

fn default_registry_path() -> String {
    DEFAULT_REGISTRY_PATH.to_string()
}

fn default_registry_timeout() -> Duration {
    DEFAULT_REGISTRY_TIMEOUT
}

fn default_refresh_interval() -> Duration {
    crate::discovery::registry_discovery::DEFAULT_REFRESH_INTERVAL
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

/// `zrpc-server` configuration: what to bind, which codec/handle-timeout to
/// hand out during the handshake, and (optionally) a registry to heartbeat
/// against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_codec_tag")]
    pub codec_tag: String,

    #[serde(default, with = "duration_secs")]
    pub handle_timeout: Duration,

    #[serde(default = "default_rpc_path")]
    pub rpc_path: String,

    /// Also accept HTTP-CONNECT upgrades on `rpc_path` using a second
    /// listener, in addition to the raw TCP listener on `bind_addr`.
    #[serde(default)]
    pub http_connect_addr: Option<String>,

    #[serde(default)]
    pub registry: Option<RegistryClientConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            codec_tag: default_codec_tag(),
            handle_timeout: Duration::ZERO,
            rpc_path: default_rpc_path(),
            http_connect_addr: None,
            registry: None,
        }
    }
}

impl ServerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Self = serde_yaml::from_str(&s).context("failed to parse server config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(!self.bind_addr.is_empty(), "bind_addr must not be empty");
        ensure!(
            crate::codec::registry::is_known(&self.codec_tag),
            "codec_tag {:?} has no registered constructor",
            self.codec_tag
        );
        if let Some(registry) = &self.registry {
            ensure!(!registry.url.is_empty(), "registry.url must not be empty");
            ensure!(!registry.advertise_addr.is_empty(), "registry.advertise_addr must not be empty");
        }
        Ok(())
    }
}

/// The address/URL a server heartbeats to, and the address it advertises to
/// other peers as its own (which may differ from `bind_addr`, e.g. behind
/// NAT or a load balancer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryClientConfig {
    pub url: String,
    pub advertise_addr: String,
    #[serde(default, with = "opt_duration_secs")]
    pub heartbeat_period: Option<Duration>,
}

/// `zrpc-registry` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_registry_path")]
    pub path: String,

    #[serde(default = "default_registry_timeout", with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for RegistryServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            path: default_registry_path(),
            timeout: default_registry_timeout(),
        }
    }
}

impl RegistryServerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let cfg: Self = serde_yaml::from_str(&s).context("failed to parse registry config YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.bind_addr.is_empty(), "bind_addr must not be empty");
        ensure!(!self.path.is_empty(), "path must not be empty");
        Ok(())
    }
}

/// `zrpc-client` configuration: which registry to discover backends
/// through, how to pick among them, and the handshake option to dial with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub registry_url: String,

    #[serde(default = "default_refresh_interval", with = "duration_secs")]
    pub refresh_interval: Duration,

    #[serde(default = "default_select_mode")]
    pub select_mode: SelectMode,

    #[serde(default = "default_connect_timeout", with = "duration_secs")]
    pub connect_timeout: Duration,

    #[serde(default = "default_codec_tag")]
    pub codec_tag: String,
}

fn default_select_mode() -> SelectMode {
    SelectMode::RoundRobin
}

impl ClientConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let cfg: Self = serde_yaml::from_str(&s).context("failed to parse client config YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.registry_url.is_empty(), "registry_url must not be empty");
        ensure!(
            crate::codec::registry::is_known(&self.codec_tag),
            "codec_tag {:?} has no registered constructor",
            self.codec_tag
        );
        Ok(())
    }
}

/// Serde helper: represent a `Duration` as a number of seconds, matching the
/// teacher's `serde_secs` convention.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

mod opt_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> std::result::Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<Duration>, D::Error> {
        let secs: Option<f64> = Option::deserialize(d)?;
        Ok(secs.map(Duration::from_secs_f64))
    }
}
