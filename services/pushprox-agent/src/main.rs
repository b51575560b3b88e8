// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Pushprox Agent
//!
//! Runs next to a metrics target that cannot be reached from outside. It:
//!
//! - Long-polls the broker for pending scrapes
//! - Replays each scrape against the local target
//! - Pushes the raw response back to the broker

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use pushprox_agent::Agent;
use pushprox_agent::config::{AgentArgs, AgentConfig};
use pushprox_agent::target::HttpTarget;

fn print_version() {
    let version = env!("CARGO_PKG_VERSION");
    let name = env!("CARGO_PKG_NAME");
    let buildstamp = option_env!("STAMP").unwrap_or("no-STAMP");
    println!("{} {} ({})", name, version, buildstamp);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = AgentArgs::parse();
    if args.version {
        print_version();
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "pushprox_agent=info".to_string()),
        ))
        .init();

    print_version();

    let config = AgentConfig::load(&args)
        .await
        .context("Failed to load configuration")?;
    info!(
        fqdn = %config.fqdn,
        proxy = %config.proxy,
        target = %config.target,
        "Loaded configuration"
    );

    let target = HttpTarget::new(config.target.clone(), config.request_timeout)
        .context("Failed to create target client")?;
    let agent = Agent::new(&config, target);

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down");
            }
            shutdown.cancel();
        });
    }

    agent.run(shutdown).await.context("Agent loop failed")
}
