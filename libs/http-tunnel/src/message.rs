// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Raw HTTP/1.1 request and response messages
//!
//! Both message types encode with `Content-Length` framing only. Hop-by-hop
//! framing headers present on the source message are dropped on encode and
//! recomputed from the body.

use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

use crate::error::CodecError;

/// Upper bound on parsed headers per message.
const MAX_HEADERS: usize = 128;

/// Headers that describe the framing of a particular hop and are recomputed
/// whenever a message is re-encoded.
const FRAMING_HEADERS: [HeaderName; 3] = [CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING];

/// A complete HTTP/1.1 request as carried through the tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    pub method: Method,
    /// Origin-form request target (path and optional query)
    pub target: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawRequest {
    /// Create a body-less request with no headers.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Serialize to wire bytes. `Host` is written first when present.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.body.len());
        out.extend_from_slice(self.method.as_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.target.as_bytes());
        out.extend_from_slice(b" HTTP/1.1\r\n");

        if let Some(host) = self.headers.get(HOST) {
            write_header(&mut out, &HOST, host);
        }
        for (name, value) in &self.headers {
            if name == HOST || FRAMING_HEADERS.contains(name) {
                continue;
            }
            write_header(&mut out, name, value);
        }
        if !self.body.is_empty() {
            write_content_length(&mut out, self.body.len());
        }

        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }

    /// Parse a request from wire bytes.
    pub fn parse(buf: &[u8]) -> Result<Self, CodecError> {
        let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut slots);
        let head_len = match parsed.parse(buf)? {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => return Err(CodecError::IncompleteHead),
        };

        let method = parsed
            .method
            .ok_or(CodecError::MissingStartLine("method"))?;
        let target = parsed
            .path
            .ok_or(CodecError::MissingStartLine("request target"))?;
        let method = Method::from_bytes(method.as_bytes())?;
        let target = target.to_string();
        let headers = collect_headers(parsed.headers)?;
        let body = framed_body(&headers, &buf[head_len..])?;

        Ok(Self {
            method,
            target,
            headers,
            body,
        })
    }
}

/// A complete HTTP/1.1 response as carried through the tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    /// Create a response with the given status and body and no headers.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Serialize to wire bytes, always framed with `Content-Length`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.body.len());
        out.extend_from_slice(b"HTTP/1.1 ");
        out.extend_from_slice(self.status.as_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(
            self.status
                .canonical_reason()
                .unwrap_or_default()
                .as_bytes(),
        );
        out.extend_from_slice(b"\r\n");

        for (name, value) in &self.headers {
            if FRAMING_HEADERS.contains(name) {
                continue;
            }
            write_header(&mut out, name, value);
        }
        write_content_length(&mut out, self.body.len());

        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }

    /// Parse a response from wire bytes.
    pub fn parse(buf: &[u8]) -> Result<Self, CodecError> {
        let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Response::new(&mut slots);
        let head_len = match parsed.parse(buf)? {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => return Err(CodecError::IncompleteHead),
        };

        let code = parsed.code.ok_or(CodecError::MissingStartLine("status"))?;
        let status = StatusCode::from_u16(code)?;
        let headers = collect_headers(parsed.headers)?;
        let body = framed_body(&headers, &buf[head_len..])?;

        Ok(Self {
            status,
            headers,
            body,
        })
    }
}

/// Parse only the head of a response (status line and header block).
///
/// `head` must include the terminating blank line. Anything after it is
/// ignored, so no body framing is applied.
pub fn parse_response_head(head: &[u8]) -> Result<(StatusCode, HeaderMap), CodecError> {
    let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Response::new(&mut slots);
    match parsed.parse(head)? {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => return Err(CodecError::IncompleteHead),
    }
    let code = parsed.code.ok_or(CodecError::MissingStartLine("status"))?;
    Ok((StatusCode::from_u16(code)?, collect_headers(parsed.headers)?))
}

fn collect_headers(parsed: &[httparse::Header<'_>]) -> Result<HeaderMap, CodecError> {
    let mut headers = HeaderMap::with_capacity(parsed.len());
    for header in parsed {
        let name = HeaderName::from_bytes(header.name.as_bytes())?;
        let value = HeaderValue::from_bytes(header.value)?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// Apply the codec's body framing to the bytes after a message head.
///
/// A non-identity `Transfer-Encoding` is rejected. With `Content-Length` the
/// body is cut to that many bytes; without it the whole remainder is the body.
pub fn framed_body(headers: &HeaderMap, rest: &[u8]) -> Result<Bytes, CodecError> {
    if let Some(coding) = headers.get(TRANSFER_ENCODING) {
        let coding = coding.to_str().unwrap_or_default().trim();
        if !coding.eq_ignore_ascii_case("identity") {
            return Err(CodecError::Unsupported(format!(
                "transfer-encoding: {}",
                coding
            )));
        }
    }

    let Some(length) = headers.get(CONTENT_LENGTH) else {
        return Ok(Bytes::copy_from_slice(rest));
    };
    let expected: usize = length
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| CodecError::InvalidComponent(format!("content-length: {:?}", length)))?;

    if rest.len() < expected {
        return Err(CodecError::Truncated {
            expected,
            found: rest.len(),
        });
    }
    Ok(Bytes::copy_from_slice(&rest[..expected]))
}

fn write_header(out: &mut Vec<u8>, name: &HeaderName, value: &HeaderValue) {
    out.extend_from_slice(name.as_str().as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn write_content_length(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(b"content-length: ");
    out.extend_from_slice(len.to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
}
