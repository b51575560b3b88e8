// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Translation between collector traffic and tunneled messages.

use bytes::Bytes;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE, HOST};
use http::uri::Authority;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Response, Uri};
use http_tunnel::{CodecError, RawRequest};
use pushprox_api::Fqdn;
use thiserror::Error;

/// Response headers that make it back to the collector.
const FORWARDED_RESPONSE_HEADERS: [HeaderName; 2] = [CONTENT_TYPE, CONTENT_ENCODING];

#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("request names no target: no authority in the request target and no Host header")]
    MissingIdentity,

    #[error("invalid target authority {0:?}")]
    InvalidAuthority(String),

    #[error("tunneled response has no header terminator")]
    Unframed,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("failed to build response: {0}")]
    Build(#[from] http::Error),
}

/// A collector request ready to be queued.
#[derive(Debug)]
pub struct Encapsulated {
    /// Agent the request is addressed to
    pub fqdn: Fqdn,
    /// Raw HTTP/1.1 request bytes
    pub request: Bytes,
}

/// Work out which agent a collector request is for.
///
/// A forward-proxy style request carries the target in its absolute-form
/// request target; otherwise the `Host` header names it. Any port is dropped.
pub fn target_authority(uri: &Uri, headers: &HeaderMap) -> Result<Authority, TunnelError> {
    if let Some(authority) = uri.authority() {
        return Ok(authority.clone());
    }
    let host = headers.get(HOST).ok_or(TunnelError::MissingIdentity)?;
    let host = host
        .to_str()
        .map_err(|_| TunnelError::InvalidAuthority(format!("{:?}", host)))?;
    host.parse::<Authority>()
        .map_err(|_| TunnelError::InvalidAuthority(host.to_string()))
}

/// Turn an inbound collector request into the raw request an agent runs.
///
/// All headers are kept except `Accept-Encoding`, so the target answers
/// uncompressed. The request target is rewritten to origin form and `Host`
/// is set to the target authority.
pub fn encapsulate(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Encapsulated, TunnelError> {
    let authority = target_authority(uri, headers)?;
    let fqdn = authority.host().to_string();
    if fqdn.is_empty() {
        return Err(TunnelError::MissingIdentity);
    }

    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .filter(|pq| !pq.is_empty())
        .unwrap_or("/");

    let mut raw = RawRequest::new(method.clone(), target);
    for (name, value) in headers {
        if name == ACCEPT_ENCODING || name == HOST {
            continue;
        }
        raw.headers.append(name.clone(), value.clone());
    }
    let host = HeaderValue::from_str(authority.as_str()).map_err(CodecError::from)?;
    raw.headers.insert(HOST, host);
    raw.body = body;

    Ok(Encapsulated {
        fqdn,
        request: Bytes::from(raw.encode()),
    })
}

/// Turn an agent's raw response into what the collector receives.
///
/// The body after the first blank line is framed the same way the codec
/// frames any message: cut to `Content-Length` when present, rejected when a
/// transfer coding such as `chunked` is declared. Of the headers only
/// `Content-Type` and `Content-Encoding` survive.
pub fn decapsulate(raw: &[u8]) -> Result<Response<Bytes>, TunnelError> {
    let (head, rest) = http_tunnel::split_message(raw).ok_or(TunnelError::Unframed)?;
    let (status, all_headers) = http_tunnel::parse_response_head(head)?;
    let body = http_tunnel::framed_body(&all_headers, rest)?;
    let headers = http_tunnel::forwarded_headers(head, &FORWARDED_RESPONSE_HEADERS)?;

    let mut response = Response::builder().status(status);
    for (name, value) in &headers {
        response = response.header(name, value);
    }
    Ok(response.body(body)?)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use http::StatusCode;
    use http::header::{ACCEPT, USER_AGENT};
    use http_tunnel::RawResponse;
    use test_case::test_case;

    fn collector_headers(host: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(host) = host {
            headers.insert(HOST, HeaderValue::from_static(host));
        }
        headers.insert(ACCEPT, HeaderValue::from_static("text/plain"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(USER_AGENT, HeaderValue::from_static("Prometheus/2.45.0"));
        headers
    }

    #[test_case("http://host1:9100/metrics", None, "host1" ; "absolute form with port")]
    #[test_case("http://host1/metrics", Some("other"), "host1" ; "absolute form beats host header")]
    #[test_case("/metrics", Some("host2:9100"), "host2" ; "host header with port")]
    #[test_case("/metrics", Some("host3"), "host3" ; "bare host header")]
    fn test_identity(uri: &str, host: Option<&'static str>, expected: &str) {
        let uri: Uri = uri.parse().unwrap();

        let encapsulated =
            encapsulate(&Method::GET, &uri, &collector_headers(host), Bytes::new()).unwrap();

        assert_eq!(encapsulated.fqdn, expected);
    }

    #[test]
    fn test_missing_identity() {
        let uri: Uri = "/metrics".parse().unwrap();

        let err = encapsulate(&Method::GET, &uri, &collector_headers(None), Bytes::new())
            .unwrap_err();

        assert!(matches!(err, TunnelError::MissingIdentity));
    }

    #[test]
    fn test_encapsulated_request_shape() {
        let uri: Uri = "http://host1:9100/metrics?x=1".parse().unwrap();

        let encapsulated =
            encapsulate(&Method::GET, &uri, &collector_headers(None), Bytes::new()).unwrap();
        let raw = RawRequest::parse(&encapsulated.request).unwrap();

        assert_eq!(raw.method, Method::GET);
        assert_eq!(raw.target, "/metrics?x=1");
        assert_eq!(raw.headers.get(HOST).unwrap(), "host1:9100");
        assert_eq!(raw.headers.get(USER_AGENT).unwrap(), "Prometheus/2.45.0");
        assert!(raw.headers.get(ACCEPT_ENCODING).is_none());
    }

    #[test]
    fn test_decapsulate_forwards_only_allowed_headers() {
        let mut upstream = RawResponse::new(StatusCode::OK, "foo");
        upstream
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        upstream
            .headers
            .insert("x-internal", HeaderValue::from_static("secret"));

        let response = decapsulate(&upstream.encode()).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().len(), 1);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/plain");
        assert_eq!(response.body(), &Bytes::from_static(b"foo"));
    }

    #[test]
    fn test_decapsulate_keeps_body_bytes_verbatim() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\n\r\n\x1f\x8b\x00\r\n\r\n\xff";

        let response = decapsulate(raw).unwrap();

        assert_eq!(response.headers().get(CONTENT_ENCODING).unwrap(), "gzip");
        assert_eq!(response.body().as_ref(), b"\x1f\x8b\x00\r\n\r\n\xff");
    }

    #[test]
    fn test_decapsulate_passes_status_through() {
        let raw = b"HTTP/1.1 500 Internal Server Error\r\n\r\noops";

        let response = decapsulate(raw).unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test_case(b"no blank line here" ; "unframed")]
    #[test_case(b"garbage\r\n\r\nbody" ; "bad status line")]
    #[test_case(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nfoo" ; "short body")]
    fn test_decapsulate_rejects_malformed(raw: &[u8]) {
        assert!(decapsulate(raw).is_err());
    }

    #[test_case(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nContent-Type: text/plain\r\n\r\n3\r\nfoo\r\n0\r\n\r\n" ; "chunked")]
    #[test_case(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip, chunked\r\n\r\n" ; "stacked codings")]
    fn test_decapsulate_rejects_transfer_coding(raw: &[u8]) {
        let err = decapsulate(raw).unwrap_err();

        assert!(
            matches!(err, TunnelError::Codec(CodecError::Unsupported(_))),
            "got {:?}",
            err
        );
    }

    #[test_case(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nfooGARBAGE", b"foo" ; "trailing bytes dropped")]
    #[test_case(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\nleftover", b"" ; "empty declared body")]
    #[test_case(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: identity\r\n\r\nfoo", b"foo" ; "identity coding")]
    fn test_decapsulate_frames_body(raw: &[u8], expected: &[u8]) {
        let response = decapsulate(raw).unwrap();

        assert_eq!(response.body().as_ref(), expected);
    }
}
