// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Pushprox Agent Library
//!
//! The agent runs next to a target that cannot accept inbound connections.
//! It long-polls the broker for scrapes, runs each one against the target and
//! pushes the raw response back.
//!
//! # Modules
//!
//! - [`config`] - Agent configuration (broker, identity, target, timings)
//! - [`target`] - Scrape execution against the local target

pub mod config;
pub mod target;

use std::time::Duration;

use http::StatusCode;
use http::header::CONTENT_TYPE;
use http_tunnel::{CodecError, RawRequest};
use pushprox_api::{PollReply, PollRequest, PushRequest};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AgentConfig;
use crate::target::{ScrapeTarget, TargetError};

const MIME_TYPE_JSON: &str = "application/json";

/// Errors from one poll/execute/push cycle
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("broker request failed: {0}")]
    Broker(#[from] reqwest::Error),

    #[error("broker rejected {endpoint} with status {status}")]
    Rejected {
        endpoint: &'static str,
        status: StatusCode,
    },

    #[error("failed to decode scrape: {0}")]
    Decode(#[from] CodecError),

    #[error(transparent)]
    Target(#[from] TargetError),

    /// An outbound envelope could not be serialized. Retrying cannot help.
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

impl AgentError {
    /// Whether the poll loop must stop instead of retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::Encode(_))
    }
}

/// Polling agent bound to one broker and one target
pub struct Agent<T> {
    client: reqwest::Client,
    broker_url: String,
    fqdn: String,
    launched: i64,
    retry: Duration,
    target: T,
}

impl<T: ScrapeTarget> Agent<T> {
    /// Create an agent whose epoch is the current time.
    pub fn new(config: &AgentConfig, target: T) -> Self {
        let launched = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        Self::with_launched(config, target, launched)
    }

    /// Create an agent with an explicit epoch.
    pub fn with_launched(config: &AgentConfig, target: T, launched: i64) -> Self {
        Self {
            client: reqwest::Client::new(),
            broker_url: format!("http://{}", config.proxy),
            fqdn: config.fqdn.clone(),
            launched,
            retry: config.retry,
            target,
        }
    }

    pub fn launched(&self) -> i64 {
        self.launched
    }

    /// Poll, execute and push until `shutdown` is cancelled.
    ///
    /// Every failure is logged and followed by the retry pause, except a
    /// failure to serialize an envelope which ends the loop.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), AgentError> {
        info!(
            fqdn = %self.fqdn,
            broker = %self.broker_url,
            launched = self.launched,
            "Agent started"
        );

        loop {
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => break,
                outcome = self.cycle() => outcome,
            };

            match outcome {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Agent stopping");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_secs = self.retry.as_secs(),
                        "Scrape cycle failed, pausing"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.retry) => {}
                    }
                }
            }
        }

        info!(fqdn = %self.fqdn, "Agent stopped");
        Ok(())
    }

    /// One poll/execute/push round trip.
    pub async fn cycle(&self) -> Result<(), AgentError> {
        let reply = self.poll().await?;

        let raw = http_tunnel::from_hex(&reply.request)?;
        let request = RawRequest::parse(&raw)?;
        debug!(scrape_id = %reply.uuid, target = %request.target, "Executing scrape");

        let response = self.target.execute(request).await?;
        let status = response.status;
        self.push(&reply.uuid, &response.encode()).await?;

        debug!(scrape_id = %reply.uuid, status = %status, "Scrape completed");
        Ok(())
    }

    async fn poll(&self) -> Result<PollReply, AgentError> {
        let envelope = PollRequest {
            fqdn: self.fqdn.clone(),
            launched: self.launched,
        };
        let response = self.post("poll", &envelope).await?;
        Ok(response.json().await?)
    }

    async fn push(&self, uuid: &str, response: &[u8]) -> Result<(), AgentError> {
        let envelope = PushRequest {
            fqdn: self.fqdn.clone(),
            uuid: uuid.to_string(),
            response: http_tunnel::to_hex(response),
        };
        self.post("push", &envelope).await?;
        Ok(())
    }

    async fn post<B: Serialize>(
        &self,
        endpoint: &'static str,
        envelope: &B,
    ) -> Result<reqwest::Response, AgentError> {
        let body = serde_json::to_vec(envelope)?;
        let response = self
            .client
            .post(format!("{}/{}", self.broker_url, endpoint))
            .header(CONTENT_TYPE, MIME_TYPE_JSON)
            .body(body)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(AgentError::Rejected {
                endpoint,
                status: response.status(),
            });
        }
        Ok(response)
    }
}
