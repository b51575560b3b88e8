// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Pushprox Broker Service
//!
//! Lets a metrics collector scrape targets that cannot accept inbound
//! connections. It:
//!
//! - Queues collector scrapes per agent identity
//! - Hands queued scrapes to agents as they long-poll
//! - Relays the pushed responses back to the waiting collector
//! - Expires scrapes nobody answered within the retention window

use anyhow::{Context, Result};
use clap::Parser;
use dropshot::{ConfigDropshot, ConfigLogging, ConfigLoggingLevel, HttpServerStarter};
use tokio_util::sync::CancellationToken;
use tracing::info;

use pushprox_broker::PushproxBrokerImpl;
use pushprox_broker::config::{BrokerArgs, BrokerConfig};
use pushprox_broker::context::ApiContext;

fn print_version() {
    let version = env!("CARGO_PKG_VERSION");
    let name = env!("CARGO_PKG_NAME");
    let buildstamp = option_env!("STAMP").unwrap_or("no-STAMP");
    println!("{} {} ({})", name, version, buildstamp);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = BrokerArgs::parse();
    if args.version {
        print_version();
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "pushprox_broker=info,dropshot=info".to_string()),
        ))
        .init();

    print_version();

    let config = BrokerConfig::load(&args)
        .await
        .context("Failed to load configuration")?;
    info!(
        retention_secs = config.retention.as_secs(),
        pulse_millis = config.pulse_interval.as_millis() as u64,
        "Loaded configuration"
    );

    let shutdown = CancellationToken::new();
    let api_context = ApiContext::new(&config, shutdown.clone());

    // Get API description from the trait implementation
    let api = pushprox_api::pushprox_api_mod::api_description::<PushproxBrokerImpl>()
        .map_err(|e| anyhow::anyhow!("Failed to create API description: {}", e))?;

    // Blocked polls and scrapes are dropped along with their connection.
    let config_dropshot = ConfigDropshot {
        bind_address: config.bind_address,
        default_request_body_max_bytes: config.body_max_bytes,
        default_handler_task_mode: dropshot::HandlerTaskMode::CancelOnDisconnect,
        ..Default::default()
    };

    let config_logging = ConfigLogging::StderrTerminal {
        level: ConfigLoggingLevel::Info,
    };

    let log = config_logging
        .to_logger("pushprox-broker")
        .map_err(|error| anyhow::anyhow!("failed to create logger: {}", error))?;

    let server = HttpServerStarter::new(&config_dropshot, api, api_context, &log)
        .map_err(|error| anyhow::anyhow!("failed to create server: {}", error))?
        .start();

    info!("Pushprox broker running on http://{}", server.local_addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    shutdown.cancel();

    server
        .close()
        .await
        .map_err(|error| anyhow::anyhow!("server failed: {}", error))
}
