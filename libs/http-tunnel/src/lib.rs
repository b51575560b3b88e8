// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Raw HTTP/1.1 message codec for the pushprox tunnel
//!
//! Scrapes travel between the broker and its agents as complete HTTP/1.1
//! messages (start line, header block, blank line, body) carried as hex text
//! inside JSON envelopes. This crate owns both halves of that encoding:
//!
//! - [`RawRequest`] / [`RawResponse`] - encode and parse whole messages
//! - [`split_message`] / [`forwarded_headers`] / [`framed_body`] - pull a
//!   tunneled response apart at the broker
//! - [`to_hex`] / [`from_hex`] - the textual envelope

pub mod error;
pub mod message;

use http::{HeaderMap, HeaderName};

pub use error::CodecError;
pub use message::{RawRequest, RawResponse, framed_body, parse_response_head};

const BLANK_LINE: &[u8] = b"\r\n\r\n";

/// Encode raw message bytes for a JSON envelope (lowercase hex).
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a hex envelope payload. Accepts either letter case.
pub fn from_hex(text: &str) -> Result<Vec<u8>, CodecError> {
    Ok(hex::decode(text)?)
}

/// Split a raw message at the first blank line.
///
/// The head keeps its terminating `\r\n\r\n`; the body is everything after.
/// Returns `None` when the message has no blank line at all.
pub fn split_message(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    let end = raw
        .windows(BLANK_LINE.len())
        .position(|window| window == BLANK_LINE)?
        + BLANK_LINE.len();
    Some(raw.split_at(end))
}

/// Re-parse a response head and keep only the named headers.
pub fn forwarded_headers(head: &[u8], keep: &[HeaderName]) -> Result<HeaderMap, CodecError> {
    let (_, headers) = parse_response_head(head)?;
    let mut forwarded = HeaderMap::new();
    for name in keep {
        for value in headers.get_all(name) {
            forwarded.append(name.clone(), value.clone());
        }
    }
    Ok(forwarded)
}
