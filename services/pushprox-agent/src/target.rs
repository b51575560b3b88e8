// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Scrape execution against the local target

use std::time::Duration;

use async_trait::async_trait;
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING};
use http::{HeaderValue, StatusCode};
use http_tunnel::{RawRequest, RawResponse};
use prometheus::{Encoder, Registry, TextEncoder};
use thiserror::Error;

/// Errors produced while running a scrape against a target
#[derive(Error, Debug)]
pub enum TargetError {
    #[error("target request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("target unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),
}

/// Something that can answer a tunneled request.
///
/// [`HttpTarget`] talks to a real HTTP endpoint. In-process implementations
/// let an application serve its own metrics without a listening socket.
#[async_trait]
pub trait ScrapeTarget: Send + Sync {
    async fn execute(&self, request: RawRequest) -> Result<RawResponse, TargetError>;
}

/// Executes requests against `http://{address}`.
pub struct HttpTarget {
    client: reqwest::Client,
    address: String,
}

impl HttpTarget {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Result<Self, TargetError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            address: address.into(),
        })
    }

    /// URL the request is rewritten to.
    pub fn url_for(&self, request: &RawRequest) -> String {
        format!("http://{}{}", self.address, request.target)
    }
}

#[async_trait]
impl ScrapeTarget for HttpTarget {
    async fn execute(&self, request: RawRequest) -> Result<RawResponse, TargetError> {
        let url = self.url_for(&request);
        let mut builder = self.client.request(request.method.clone(), &url);
        for (name, value) in &request.headers {
            if name == HOST || name == CONNECTION || name == CONTENT_LENGTH || name == TRANSFER_ENCODING
            {
                continue;
            }
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

/// Answers every request from an in-process Prometheus registry.
///
/// Lets an application tunnel its own metrics without running an HTTP
/// listener. The request path and method are not consulted.
pub struct RegistryTarget {
    registry: Registry,
    encoder: TextEncoder,
}

impl RegistryTarget {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            encoder: TextEncoder::new(),
        }
    }
}

#[async_trait]
impl ScrapeTarget for RegistryTarget {
    async fn execute(&self, request: RawRequest) -> Result<RawResponse, TargetError> {
        tracing::trace!(path = %request.target, "Gathering registry metrics");
        let families = self.registry.gather();
        let text = self.encoder.encode_to_string(&families)?;

        let mut response = RawResponse::new(StatusCode::OK, text);
        response.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(self.encoder.format_type())
                .map_err(|e| TargetError::Unavailable(e.to_string()))?,
        );
        Ok(response)
    }
}
