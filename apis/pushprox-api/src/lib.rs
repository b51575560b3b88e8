// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Dropshot API trait for the pushprox broker.
//!
//! The broker lets a metrics collector scrape targets that cannot accept
//! inbound connections. An agent next to each target polls the broker for
//! pending scrapes, runs them locally, and pushes the raw responses back.
//! Tunneled HTTP messages travel as hex text inside the JSON envelopes below.
//!
//! ## Endpoints
//!
//! - `POST /poll` - Agent long-polls for the next pending scrape
//! - `POST /push` - Agent returns the response for a scrape
//! - `GET /metrics` - Collector-facing scrape, answered through the tunnel
//! - `GET /probe` - Liveness check

use dropshot::{Body, HttpError, HttpResponseOk, RequestContext, TypedBody, UntypedBody};
use http::Response;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Agent identity (its fully-qualified domain name)
pub type Fqdn = String;

/// Broker-generated scrape correlation id (UUID string)
pub type ScrapeId = String;

/// Body of `POST /poll`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PollRequest {
    /// Identity of the polling agent
    pub fqdn: Fqdn,
    /// Launch marker of the agent process (Unix seconds at startup). A poll
    /// carrying a smaller value than the broker has seen is superseded.
    pub launched: i64,
}

/// Reply to `POST /poll` carrying one claimed scrape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PollReply {
    /// Correlation id to echo back in the push
    pub uuid: ScrapeId,
    /// Hex-encoded raw HTTP/1.1 request to execute
    pub request: String,
}

/// Body of `POST /push`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PushRequest {
    /// Identity of the pushing agent
    pub fqdn: Fqdn,
    /// Correlation id from the poll reply
    pub uuid: ScrapeId,
    /// Hex-encoded raw HTTP/1.1 response from the target
    pub response: String,
}

/// Pushprox Broker API
#[dropshot::api_description]
pub trait PushproxApi {
    /// Context type for request handlers
    type Context: Send + Sync + 'static;

    /// Claim the next pending scrape
    ///
    /// Blocks until a scrape is queued for `fqdn`. Returns 423 Locked when
    /// `launched` is older than the newest launch marker seen for the same
    /// identity, which means a newer agent instance has taken over.
    #[endpoint {
        method = POST,
        path = "/poll",
        tags = ["agent"],
    }]
    async fn poll(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<PollRequest>,
    ) -> Result<HttpResponseOk<PollReply>, HttpError>;

    /// Deliver a scrape response
    ///
    /// Succeeds whenever the envelope parses, including for correlation ids
    /// the broker no longer tracks. Returns 400 for malformed hex.
    #[endpoint {
        method = POST,
        path = "/push",
        tags = ["agent"],
    }]
    async fn push(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<PushRequest>,
    ) -> Result<Response<Body>, HttpError>;

    /// Scrape a target through its agent
    ///
    /// The request, body included, is forwarded verbatim (minus
    /// `Accept-Encoding`) to the agent named by the request-target authority
    /// or the `Host` header.
    /// Only `Content-Type` and `Content-Encoding` of the target's response
    /// are passed back. Returns 503 when the scrape expired unanswered.
    #[endpoint {
        method = GET,
        path = "/metrics",
        tags = ["collector"],
    }]
    async fn scrape(
        rqctx: RequestContext<Self::Context>,
        body: UntypedBody,
    ) -> Result<Response<Body>, HttpError>;

    /// Liveness probe
    #[endpoint {
        method = GET,
        path = "/probe",
        tags = ["health"],
    }]
    async fn probe(rqctx: RequestContext<Self::Context>) -> Result<Response<Body>, HttpError>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_poll_request_wire_names() {
        let parsed: PollRequest =
            serde_json::from_str(r#"{"fqdn":"host1","launched":1700000000}"#).unwrap();
        assert_eq!(
            parsed,
            PollRequest {
                fqdn: "host1".to_string(),
                launched: 1_700_000_000,
            }
        );
    }

    #[test]
    fn test_push_request_rejects_missing_fields() {
        let result = serde_json::from_str::<PushRequest>(r#"{"fqdn":"host1"}"#);
        assert!(result.is_err());
    }
}
