//! Request and response snapshots and their log segments.
//!
//! Snapshotting gathers everything the log line needs (and buffers response bodies);
//! rendering turns a snapshot into segments without touching any I/O.

use bytes::Bytes;
use encoding_rs::Encoding;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, Method, Response, StatusCode, Uri, Version};
use http_body::Body;
use std::future::Future;
use tracing::debug;

use crate::body_wrapper::{buffer_body, copy_body, InspectedBody};
use crate::gzip;
use crate::sniff::is_plaintext;
use crate::types::{
    header_pairs, BodyDescriptor, Classification, ContentEncoding, RequestView, ResponseView,
};
use crate::ExchangeLoggerConfig;

/// Builds a snapshot of an outgoing request.
///
/// The body is inspected through a clone, so `body` itself is never polled. All
/// header work happens up front; the returned future owns everything it needs.
pub fn snapshot_request<B>(
    method: &Method,
    uri: &Uri,
    version: Version,
    headers: &HeaderMap,
    body: &B,
    config: &ExchangeLoggerConfig,
) -> impl Future<Output = RequestView>
where
    B: Body<Data = Bytes> + Clone,
    B::Error: std::fmt::Display,
{
    let present = !body.is_end_stream();
    let encoding = ContentEncoding::from_headers(headers);
    let content_type = header_string(headers, &CONTENT_TYPE);
    let content_length = declared_length(headers).or_else(|| body.size_hint().exact());
    let copy = (present && !matches!(encoding, ContentEncoding::Unknown(_)))
        .then(|| copy_body(body));

    let mut view = RequestView {
        method: method.clone(),
        uri: uri.clone(),
        protocol: config.include_protocol.then_some(version),
        headers: header_pairs(headers),
        body: None,
    };

    async move {
        if !present {
            return view;
        }

        let (buffer, classification) = match copy {
            None => (Bytes::new(), Classification::UnknownEncoding),
            Some(copy) => match copy.await {
                Ok(copy) => {
                    let classification = classify(&copy);
                    (copy, classification)
                }
                Err(e) => {
                    debug!(error = %e, "could not copy request body for logging");
                    (Bytes::new(), Classification::Binary)
                }
            },
        };

        view.body = Some(BodyDescriptor {
            content_type,
            content_length,
            encoding,
            buffer,
            preview: None,
            classification,
        });
        view
    }
}

/// Renders the request half of the log line.
pub fn render_request(view: &RequestView, config: &ExchangeLoggerConfig) -> Vec<String> {
    let protocol = view
        .protocol
        .map(|v| format!(" {v:?}"))
        .unwrap_or_default();
    let mut segments = vec![format!(
        "Request Summary: [ {} {}{} ]",
        view.method, view.uri, protocol
    )];

    if let Some(body) = &view.body {
        if let Some(content_type) = &body.content_type {
            segments.push(format!("Content-Type: [{content_type}]"));
        }
        if let Some(length) = body.content_length {
            segments.push(format!("Content-Length: [{length}]"));
        }
    }

    // Content-Type and Content-Length are reported above, never as generic headers.
    for (name, value) in &view.headers {
        if *name == CONTENT_TYPE || *name == CONTENT_LENGTH {
            continue;
        }
        segments.push(format!(
            "requestheader:[{}: {}]",
            display_name(name),
            String::from_utf8_lossy(value.as_bytes())
        ));
    }

    let body_segment = match &view.body {
        None => "requestbody:[ NONE ]".to_string(),
        Some(body) => match body.classification {
            Classification::UnknownEncoding => {
                "requestbody:[NONE (encoded body omitted)]".to_string()
            }
            Classification::Binary => format!(
                "requestbody:[length: {} -- byte body omitted]",
                body.content_length.unwrap_or(body.buffer.len() as u64)
            ),
            Classification::Plaintext => {
                format!("requestbody:[{}]", decode_text(body, body.classified_bytes(), config))
            }
        },
    };
    segments.push(body_segment);

    segments
}

/// Builds a snapshot of an incoming response.
///
/// When the body is inspected it is drained into memory, and the returned response
/// carries an [`InspectedBody`] replaying the same bytes. Status, version, headers and
/// extensions are handed back untouched.
pub async fn snapshot_response<B>(
    response: Response<B>,
    request_method: &Method,
    request_uri: &Uri,
    elapsed_ms: u128,
    config: &ExchangeLoggerConfig,
) -> (Response<InspectedBody<B>>, ResponseView)
where
    B: Body<Data = Bytes>,
{
    let (parts, body) = response.into_parts();

    let message = parts
        .extensions
        .get::<hyper::ext::ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
        .unwrap_or_default();

    let (body, descriptor) = if !has_body(request_method, parts.status, &parts.headers) {
        (InspectedBody::passthrough(body), None)
    } else {
        let encoding = ContentEncoding::from_headers(&parts.headers);
        let content_type = header_string(&parts.headers, &CONTENT_TYPE);
        let content_length = declared_length(&parts.headers);

        match encoding {
            ContentEncoding::Unknown(_) => (
                InspectedBody::passthrough(body),
                Some(BodyDescriptor {
                    content_type,
                    content_length,
                    encoding,
                    buffer: Bytes::new(),
                    preview: None,
                    classification: Classification::UnknownEncoding,
                }),
            ),
            _ => {
                let inspected = buffer_body(body).await;
                if inspected.is_truncated() {
                    debug!("response body failed mid-stream, logging the bytes received");
                }
                let buffer = inspected.peek().unwrap_or_default();

                let (preview, classification) = if encoding == ContentEncoding::Gzip {
                    match gzip::decompress(&buffer, config.max_preview_bytes) {
                        Some(decoded) => {
                            let classification = classify(&decoded);
                            (Some(decoded), classification)
                        }
                        None => (None, Classification::Binary),
                    }
                } else {
                    (None, classify(&buffer))
                };

                (
                    inspected,
                    Some(BodyDescriptor {
                        content_type,
                        content_length,
                        encoding,
                        buffer,
                        preview,
                        classification,
                    }),
                )
            }
        }
    };

    let view = ResponseView {
        status: parts.status,
        message,
        uri: request_uri.clone(),
        headers: header_pairs(&parts.headers),
        body: descriptor,
        elapsed_ms,
    };

    (Response::from_parts(parts, body), view)
}

/// Renders the response half of the log line.
pub fn render_response(view: &ResponseView, config: &ExchangeLoggerConfig) -> Vec<String> {
    let message = if view.message.is_empty() {
        String::new()
    } else {
        format!(" {}", view.message)
    };
    let mut segments = vec![format!(
        "Response Summary[ {}{} {} (took {}ms )",
        view.status.as_u16(),
        message,
        view.uri,
        view.elapsed_ms
    )];

    for (name, value) in &view.headers {
        segments.push(format!(
            "responseheader:[{}: {}]",
            display_name(name),
            String::from_utf8_lossy(value.as_bytes())
        ));
    }

    match &view.body {
        None => segments.push("responsebody:[ NONE ]".to_string()),
        Some(body) => match body.classification {
            Classification::UnknownEncoding => {
                segments.push("responsebody:[NONE (encoded body omitted)]".to_string())
            }
            Classification::Binary => segments.push(format!(
                "responsebody:[length: {} -- byte body omitted]",
                body.classified_bytes().len()
            )),
            Classification::Plaintext => {
                let text = body.classified_bytes();
                if body.content_length != Some(0) {
                    segments.push(format!("responsebody:[{}]", decode_text(body, text, config)));
                }
                if let Some(preview) = &body.preview {
                    segments.push(format!(
                        "responsebody:[{}-byte, {}-gzipped-byte body]",
                        preview.len(),
                        body.buffer.len()
                    ));
                }
            }
        },
    }

    segments
}

fn classify(bytes: &[u8]) -> Classification {
    if is_plaintext(bytes) {
        Classification::Plaintext
    } else {
        Classification::Binary
    }
}

/// Whether a response carries a body, following the HTTP message length rules.
pub(crate) fn has_body(request_method: &Method, status: StatusCode, headers: &HeaderMap) -> bool {
    if *request_method == Method::HEAD {
        return false;
    }

    let code = status.as_u16();
    if (code < 100 || code >= 200)
        && status != StatusCode::NO_CONTENT
        && status != StatusCode::NOT_MODIFIED
    {
        return true;
    }

    // Some servers send a body with 1xx/204/304 anyway; honour explicit framing.
    let chunked = headers
        .get(TRANSFER_ENCODING)
        .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(b"chunked"));
    declared_length(headers).is_some() || chunked
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn header_string(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

/// Resolves the charset declared on a content type, falling back to `default`.
pub(crate) fn charset_for(
    content_type: Option<&str>,
    default: &'static Encoding,
) -> &'static Encoding {
    content_type
        .and_then(|ct| {
            ct.split(';').skip(1).find_map(|param| {
                let (key, value) = param.split_once('=')?;
                key.trim()
                    .eq_ignore_ascii_case("charset")
                    .then(|| value.trim().trim_matches('"'))
            })
        })
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(default)
}

fn decode_text(body: &BodyDescriptor, bytes: &Bytes, config: &ExchangeLoggerConfig) -> String {
    let encoding = charset_for(body.content_type.as_deref(), config.default_charset);
    encoding
        .decode_without_bom_handling(bytes)
        .0
        .into_owned()
}

/// Renders a header name in canonical title case, e.g. `content-type` as `Content-Type`.
pub(crate) fn display_name(name: &HeaderName) -> String {
    name.as_str()
        .split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
