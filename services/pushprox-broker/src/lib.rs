// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Pushprox Broker Library
//!
//! The broker sits between a metrics collector and agents that can only make
//! outbound connections. Collector scrapes are queued per agent identity,
//! handed to the agent on its next poll, and answered once the agent pushes
//! the target's response back.
//!
//! # Modules
//!
//! - [`interlock`] - Mutate-or-wait primitive over the shared state
//! - [`store`] - Per-agent scrape queues and launch epochs
//! - [`broker`] - Coordination operations used by the handlers
//! - [`tasks`] - Retention sweeper and cancellation pulse
//! - [`tunnel`] - Collector request/response encapsulation
//! - [`config`] - Broker configuration
//! - [`context`] - API context for request handlers

pub mod broker;
pub mod config;
pub mod context;
pub mod interlock;
pub mod store;
pub mod tasks;
pub mod tunnel;

use bytes::Bytes;
use dropshot::{
    Body, ClientErrorStatusCode, HttpError, HttpResponseOk, RequestContext, TypedBody,
    UntypedBody,
};
use http::{Response, StatusCode};
use pushprox_api::{PollReply, PollRequest, PushRequest, PushproxApi};
use tokio::time::Instant;

use crate::context::ApiContext;
use crate::interlock::InterlockError;
use crate::store::{Claim, Delivery, Reply};
use crate::tunnel::TunnelError;

/// Body of the liveness probe
const PROBE_ACK: &str = "+OK";

/// Pushprox Broker API implementation
///
/// This enum serves as the implementation type for the `PushproxApi` trait.
/// It contains no data - all state is stored in the `ApiContext`.
pub enum PushproxBrokerImpl {}

fn shutting_down(e: InterlockError) -> HttpError {
    tracing::debug!(error = %e, "Abandoning wait");
    HttpError::for_unavail(None, "Broker is shutting down".to_string())
}

fn build_error(e: http::Error) -> HttpError {
    HttpError::for_internal_error(format!("Failed to build response: {}", e))
}

impl PushproxApi for PushproxBrokerImpl {
    type Context = ApiContext;

    async fn poll(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<PollRequest>,
    ) -> Result<HttpResponseOk<PollReply>, HttpError> {
        let ctx = rqctx.context();
        let PollRequest { fqdn, launched } = body.into_inner();
        let cancel = ctx.shutdown();

        tracing::debug!(fqdn = %fqdn, launched, "Agent polling");

        ctx.broker()
            .advance_epoch(cancel, &fqdn, launched)
            .await
            .map_err(shutting_down)?;

        match ctx
            .broker()
            .claim_next_scrape(cancel, &fqdn, launched)
            .await
            .map_err(shutting_down)?
        {
            Claim::Superseded => {
                tracing::info!(fqdn = %fqdn, launched, "Poll superseded by newer agent instance");
                Err(HttpError::for_client_error(
                    None,
                    ClientErrorStatusCode::LOCKED,
                    format!("Agent {} launched at {} has been superseded", fqdn, launched),
                ))
            }
            Claim::Scrape { id, request } => {
                tracing::debug!(fqdn = %fqdn, scrape_id = %id, "Handing scrape to agent");
                Ok(HttpResponseOk(PollReply {
                    uuid: id,
                    request: http_tunnel::to_hex(&request),
                }))
            }
        }
    }

    async fn push(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<PushRequest>,
    ) -> Result<Response<Body>, HttpError> {
        let ctx = rqctx.context();
        let PushRequest {
            fqdn,
            uuid,
            response,
        } = body.into_inner();

        let response = http_tunnel::from_hex(&response).map_err(|e| {
            tracing::warn!(fqdn = %fqdn, scrape_id = %uuid, error = %e, "Malformed push payload");
            HttpError::for_bad_request(None, format!("Invalid response payload: {}", e))
        })?;

        let delivery = ctx
            .broker()
            .deliver_result(ctx.shutdown(), &fqdn, &uuid, Bytes::from(response))
            .await
            .map_err(shutting_down)?;

        match delivery {
            Delivery::Recorded => {
                tracing::debug!(fqdn = %fqdn, scrape_id = %uuid, "Scrape answered")
            }
            Delivery::AlreadyAnswered => {
                tracing::debug!(fqdn = %fqdn, scrape_id = %uuid, "Duplicate push ignored")
            }
            Delivery::Unknown => {
                tracing::debug!(fqdn = %fqdn, scrape_id = %uuid, "Push for unknown scrape ignored")
            }
        }

        Response::builder()
            .status(StatusCode::OK)
            .body(Body::empty())
            .map_err(build_error)
    }

    async fn scrape(
        rqctx: RequestContext<Self::Context>,
        body: UntypedBody,
    ) -> Result<Response<Body>, HttpError> {
        let ctx = rqctx.context();
        let request = &rqctx.request;
        let cancel = ctx.shutdown();

        let outbound = tunnel::encapsulate(
            request.method(),
            request.uri(),
            request.headers(),
            Bytes::copy_from_slice(body.as_bytes()),
        )
        .map_err(|e| match e {
            TunnelError::MissingIdentity | TunnelError::InvalidAuthority(_) => {
                HttpError::for_bad_request(None, e.to_string())
            }
            _ => HttpError::for_internal_error(format!("Failed to encode scrape: {}", e)),
        })?;
        let fqdn = outbound.fqdn;
        let id = uuid::Uuid::new_v4().to_string();

        ctx.broker()
            .enqueue_scrape(cancel, &fqdn, &id, outbound.request, Instant::now())
            .await
            .map_err(shutting_down)?;
        tracing::debug!(fqdn = %fqdn, scrape_id = %id, "Scrape enqueued");

        let raw = match ctx
            .broker()
            .await_result(cancel, &fqdn, &id)
            .await
            .map_err(shutting_down)?
        {
            Reply::Lost => {
                tracing::info!(fqdn = %fqdn, scrape_id = %id, "Scrape expired before an answer arrived");
                return Err(HttpError::for_unavail(
                    None,
                    format!("No response from agent {} for scrape {}", fqdn, id),
                ));
            }
            Reply::Answered(raw) => raw,
        };

        let response = tunnel::decapsulate(&raw).map_err(|e| {
            tracing::warn!(fqdn = %fqdn, scrape_id = %id, error = %e, "Malformed tunneled response");
            HttpError::for_unavail(None, format!("Malformed response from agent {}", fqdn))
        })?;

        tracing::debug!(fqdn = %fqdn, scrape_id = %id, status = %response.status(), "Scrape completed");
        Ok(response.map(|body| Body::from(body.to_vec())))
    }

    async fn probe(_rqctx: RequestContext<Self::Context>) -> Result<Response<Body>, HttpError> {
        Response::builder()
            .status(StatusCode::OK)
            .header(http::header::CONTENT_TYPE, "text/plain")
            .body(PROBE_ACK.to_string().into())
            .map_err(build_error)
    }
}
