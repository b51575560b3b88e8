// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Configuration for the pushprox broker
//!
//! Each setting is resolved in order from a command-line flag, its
//! `PUSHPROX_BROKER_*` environment variable, the optional JSON config file,
//! and finally the built-in default.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Deserialize;

const DEFAULT_LISTEN: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 8080));
const DEFAULT_RETENTION_SECS: u64 = 300;
const DEFAULT_PULSE_MILLIS: u64 = 1000;
const DEFAULT_BODY_MAX_BYTES: usize = 16 * 1024 * 1024;

/// Command-line arguments (each also readable from the environment)
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "pushprox-broker", about = "Pushprox scrape broker", disable_version_flag = true)]
pub struct BrokerArgs {
    /// Display the program's version number
    #[arg(short = 'V', long)]
    pub version: bool,

    /// JSON configuration file
    #[arg(long, env = "PUSHPROX_BROKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "PUSHPROX_BROKER_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Seconds an unclaimed or unanswered scrape is kept
    #[arg(long, env = "PUSHPROX_BROKER_RETENTION_SECS")]
    pub retention_secs: Option<u64>,

    /// Milliseconds between wake-ups of blocked requests
    #[arg(long, env = "PUSHPROX_BROKER_PULSE_MILLIS")]
    pub pulse_millis: Option<u64>,

    /// Largest accepted request body, in bytes
    #[arg(long, env = "PUSHPROX_BROKER_BODY_MAX_BYTES")]
    pub body_max_bytes: Option<usize>,
}

/// Settings accepted in the JSON config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub listen: Option<SocketAddr>,
    pub retention_secs: Option<u64>,
    pub pulse_millis: Option<u64>,
    pub body_max_bytes: Option<usize>,
}

impl FileConfig {
    /// Load configuration from a JSON file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

/// Resolved broker configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub bind_address: SocketAddr,
    /// Age after which a scrape is discarded; also the sweep period
    pub retention: Duration,
    pub pulse_interval: Duration,
    pub body_max_bytes: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_LISTEN,
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            pulse_interval: Duration::from_millis(DEFAULT_PULSE_MILLIS),
            body_max_bytes: DEFAULT_BODY_MAX_BYTES,
        }
    }
}

impl BrokerConfig {
    /// Resolve arguments, reading the config file they name if any.
    pub async fn load(args: &BrokerArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::from_file(path).await?,
            None => FileConfig::default(),
        };
        Self::resolve(args, &file)
    }

    /// Merge arguments over file settings over defaults and validate.
    pub fn resolve(args: &BrokerArgs, file: &FileConfig) -> Result<Self> {
        let bind_address = args.listen.or(file.listen).unwrap_or(DEFAULT_LISTEN);
        let retention_secs = args
            .retention_secs
            .or(file.retention_secs)
            .unwrap_or(DEFAULT_RETENTION_SECS);
        let pulse_millis = args
            .pulse_millis
            .or(file.pulse_millis)
            .unwrap_or(DEFAULT_PULSE_MILLIS);
        let body_max_bytes = args
            .body_max_bytes
            .or(file.body_max_bytes)
            .unwrap_or(DEFAULT_BODY_MAX_BYTES);

        if retention_secs == 0 {
            bail!("retention_secs must be greater than zero");
        }
        if pulse_millis == 0 {
            bail!("pulse_millis must be greater than zero");
        }
        if body_max_bytes == 0 {
            bail!("body_max_bytes must be greater than zero");
        }

        Ok(Self {
            bind_address,
            retention: Duration::from_secs(retention_secs),
            pulse_interval: Duration::from_millis(pulse_millis),
            body_max_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BrokerConfig::resolve(&BrokerArgs::default(), &FileConfig::default()).unwrap();
        assert_eq!(config, BrokerConfig::default());
    }

    #[test]
    fn test_flag_beats_file() {
        let args = BrokerArgs::try_parse_from([
            "pushprox-broker",
            "--listen",
            "127.0.0.1:9999",
            "--retention-secs",
            "10",
        ])
        .unwrap();
        let file = FileConfig {
            listen: Some("10.0.0.1:1".parse().unwrap()),
            retention_secs: Some(99),
            pulse_millis: Some(250),
            body_max_bytes: None,
        };

        let config = BrokerConfig::resolve(&args, &file).unwrap();

        assert_eq!(config.bind_address, "127.0.0.1:9999".parse().unwrap());
        assert_eq!(config.retention, Duration::from_secs(10));
        assert_eq!(config.pulse_interval, Duration::from_millis(250));
        assert_eq!(config.body_max_bytes, DEFAULT_BODY_MAX_BYTES);
    }

    #[test]
    fn test_zero_retention_rejected() {
        let args = BrokerArgs {
            retention_secs: Some(0),
            ..Default::default()
        };
        let err = BrokerConfig::resolve(&args, &FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("retention_secs"));
    }

    #[test]
    fn test_zero_pulse_rejected() {
        let file = FileConfig {
            pulse_millis: Some(0),
            ..Default::default()
        };
        assert!(BrokerConfig::resolve(&BrokerArgs::default(), &file).is_err());
    }

    #[test]
    fn test_bad_listen_flag_rejected() {
        assert!(BrokerArgs::try_parse_from(["pushprox-broker", "--listen", "nope"]).is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"listen": "127.0.0.1:7000", "retention_secs": 42}}"#).unwrap();
        let args = BrokerArgs {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };

        let config = BrokerConfig::load(&args).await.unwrap();

        assert_eq!(config.bind_address, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(config.retention, Duration::from_secs(42));
    }

    #[tokio::test]
    async fn test_unknown_file_key_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"retention": 42}}"#).unwrap();
        let args = BrokerArgs {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };

        assert!(BrokerConfig::load(&args).await.is_err());
    }
}
