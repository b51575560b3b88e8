// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Configuration for the pushprox agent

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use serde::Deserialize;

const DEFAULT_RETRY_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Command-line arguments (each also readable from the environment)
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "pushprox-agent", about = "Pushprox polling agent", disable_version_flag = true)]
pub struct AgentArgs {
    /// Display the program's version number
    #[arg(short = 'V', long)]
    pub version: bool,

    /// JSON configuration file
    #[arg(long, env = "PUSHPROX_AGENT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Broker address as host:port
    #[arg(long, env = "PUSHPROX_AGENT_PROXY")]
    pub proxy: Option<String>,

    /// Identity to poll as (defaults to the local hostname)
    #[arg(long, env = "PUSHPROX_AGENT_FQDN")]
    pub fqdn: Option<String>,

    /// Local target address as host:port
    #[arg(long, env = "PUSHPROX_AGENT_TARGET")]
    pub target: Option<String>,

    /// Seconds to pause after a failed cycle
    #[arg(long, env = "PUSHPROX_AGENT_RETRY_SECS")]
    pub retry_secs: Option<u64>,

    /// Seconds before a request to the target is abandoned
    #[arg(long, env = "PUSHPROX_AGENT_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,
}

/// Settings accepted in the JSON config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub proxy: Option<String>,
    pub fqdn: Option<String>,
    pub target: Option<String>,
    pub retry_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
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

/// Resolved agent configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Broker address as host:port
    pub proxy: String,
    pub fqdn: String,
    /// Local target address as host:port
    pub target: String,
    pub retry: Duration,
    pub request_timeout: Duration,
}

impl AgentConfig {
    /// Resolve arguments, reading the config file they name if any.
    pub async fn load(args: &AgentArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::from_file(path).await?,
            None => FileConfig::default(),
        };
        Self::resolve(args, &file)
    }

    /// Merge arguments over file settings over defaults and validate.
    pub fn resolve(args: &AgentArgs, file: &FileConfig) -> Result<Self> {
        let proxy = args
            .proxy
            .clone()
            .or_else(|| file.proxy.clone())
            .context("proxy is required (--proxy or PUSHPROX_AGENT_PROXY)")?;
        let target = args
            .target
            .clone()
            .or_else(|| file.target.clone())
            .context("target is required (--target or PUSHPROX_AGENT_TARGET)")?;
        let fqdn = match args.fqdn.clone().or_else(|| file.fqdn.clone()) {
            Some(fqdn) => fqdn,
            None => local_hostname()?,
        };
        let retry_secs = args
            .retry_secs
            .or(file.retry_secs)
            .unwrap_or(DEFAULT_RETRY_SECS);
        let request_timeout_secs = args
            .request_timeout_secs
            .or(file.request_timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        validate_address("proxy", &proxy)?;
        validate_address("target", &target)?;
        if fqdn.is_empty() {
            bail!("fqdn must not be empty");
        }
        if request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }

        Ok(Self {
            proxy,
            fqdn,
            target,
            retry: Duration::from_secs(retry_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }
}

fn local_hostname() -> Result<String> {
    hostname::get()
        .context("Failed to read local hostname")?
        .into_string()
        .map_err(|raw| anyhow!("Local hostname is not valid UTF-8: {:?}", raw))
}

/// Addresses are `host:port` authorities, without scheme or path.
fn validate_address(what: &str, value: &str) -> Result<()> {
    let authority: http::uri::Authority = value
        .parse()
        .with_context(|| format!("Invalid {} address: {}", what, value))?;
    if authority.host().is_empty() || authority.as_str().contains('@') {
        bail!("Invalid {} address: {}", what, value);
    }
    Ok(())
}
