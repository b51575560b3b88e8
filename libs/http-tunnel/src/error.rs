// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Error types for http-tunnel

use thiserror::Error;

/// Errors produced while encoding or parsing a tunneled HTTP message
#[derive(Error, Debug)]
pub enum CodecError {
    /// The message head could not be parsed as HTTP/1.x
    #[error("Malformed HTTP message: {0}")]
    Malformed(#[from] httparse::Error),

    /// The buffer ended before the header block was terminated
    #[error("Incomplete HTTP message head")]
    IncompleteHead,

    /// The start line was missing a required component
    #[error("Missing {0} in start line")]
    MissingStartLine(&'static str),

    /// A method, status code, header name or header value was rejected
    #[error("Invalid HTTP component: {0}")]
    InvalidComponent(String),

    /// Content-Length disagreed with the number of body bytes present
    #[error("Body truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    /// Framing the codec does not handle (e.g. chunked transfer coding)
    #[error("Unsupported framing: {0}")]
    Unsupported(String),

    /// The hex envelope was not valid hexadecimal
    #[error("Invalid hex payload: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl From<http::method::InvalidMethod> for CodecError {
    fn from(e: http::method::InvalidMethod) -> Self {
        CodecError::InvalidComponent(e.to_string())
    }
}

impl From<http::status::InvalidStatusCode> for CodecError {
    fn from(e: http::status::InvalidStatusCode) -> Self {
        CodecError::InvalidComponent(e.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for CodecError {
    fn from(e: http::header::InvalidHeaderName) -> Self {
        CodecError::InvalidComponent(e.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for CodecError {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        CodecError::InvalidComponent(e.to_string())
    }
}
