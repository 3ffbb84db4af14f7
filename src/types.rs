//! Data types describing one intercepted exchange.
//!
//! Views are built when the call enters the interceptor and dropped once the log line
//! has been emitted.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version};
use std::fmt;

/// Value of a body's `Content-Encoding` header, as far as previewing is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEncoding {
    /// No header, or `identity`.
    Identity,
    /// `gzip`, which can be decoded for display.
    Gzip,
    /// Anything else. The body is never inspected.
    Unknown(String),
}

impl ContentEncoding {
    /// Reads the encoding from every `Content-Encoding` value in a header map.
    ///
    /// Values may be repeated or comma-separated. `identity` codings are ignored; a
    /// single remaining `gzip` can be previewed, any other combination cannot.
    /// Matching is case-insensitive.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let codings: Vec<String> = headers
            .get_all(http::header::CONTENT_ENCODING)
            .iter()
            .flat_map(|value| {
                String::from_utf8_lossy(value.as_bytes())
                    .split(',')
                    .map(|token| token.trim().to_owned())
                    .collect::<Vec<_>>()
            })
            .filter(|token| !token.is_empty() && !token.eq_ignore_ascii_case("identity"))
            .collect();

        match codings.as_slice() {
            [] => Self::Identity,
            [only] if only.eq_ignore_ascii_case("gzip") => Self::Gzip,
            _ => Self::Unknown(codings.join(", ")),
        }
    }
}

/// Outcome of inspecting a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Plaintext,
    Binary,
    UnknownEncoding,
}

/// What the interceptor learned about a request or response body.
#[derive(Debug, Clone)]
pub struct BodyDescriptor {
    /// Declared `Content-Type`
    pub content_type: Option<String>,
    /// Declared or exactly known content length
    pub content_length: Option<u64>,
    pub encoding: ContentEncoding,
    /// Raw bytes exactly as sent or received. Empty when the body was not inspected.
    pub buffer: Bytes,
    /// Decoded copy used for display when the body is gzip encoded
    pub preview: Option<Bytes>,
    pub classification: Classification,
}

impl BodyDescriptor {
    /// Bytes the classification was computed over.
    pub fn classified_bytes(&self) -> &Bytes {
        self.preview.as_ref().unwrap_or(&self.buffer)
    }
}

/// Snapshot of an outgoing request.
#[derive(Debug, Clone)]
pub struct RequestView {
    pub method: Method,
    pub uri: Uri,
    /// Protocol, when it is known before the connection is made
    pub protocol: Option<Version>,
    /// Header pairs in iteration order, duplicates kept.
    ///
    /// `HeaderMap` groups repeated names, so values of one name stay in order but an
    /// interleaved sequence such as `A, B, A` comes out as `A, A, B`.
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub body: Option<BodyDescriptor>,
}

/// Snapshot of an incoming response.
#[derive(Debug, Clone)]
pub struct ResponseView {
    pub status: StatusCode,
    /// Reason phrase as received, empty when the transport did not record one
    pub message: String,
    /// URL of the request that produced this response
    pub uri: Uri,
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub body: Option<BodyDescriptor>,
    pub elapsed_ms: u128,
}

/// One rendered log line, kept as ordered segments until it is emitted.
///
/// # Examples
///
/// ```rust
/// use traffic_tap::types::ExchangeLine;
///
/// let mut line = ExchangeLine::default();
/// line.push("Request Summary: [ GET http://localhost/ ]");
/// line.push("requestbody:[ NONE ]");
/// assert_eq!(line.to_string(), "Request Summary: [ GET http://localhost/ ] requestbody:[ NONE ]");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeLine {
    segments: Vec<String>,
}

impl ExchangeLine {
    pub fn push(&mut self, segment: impl Into<String>) {
        self.segments.push(segment.into());
    }

    pub fn extend(&mut self, segments: impl IntoIterator<Item = String>) {
        self.segments.extend(segments);
    }
}

impl fmt::Display for ExchangeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

/// Collects header pairs from a map in iteration order.
pub(crate) fn header_pairs(headers: &HeaderMap) -> Vec<(HeaderName, HeaderValue)> {
    headers
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
