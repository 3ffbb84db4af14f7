//! # traffic-tap
//!
//! A Tower middleware for HTTP clients that writes one log line per request/response
//! exchange, without changing what the caller receives.
//!
//! ## Features
//!
//! - **Non-consuming**: request bodies are inspected through a clone, response bodies are
//!   buffered and replayed byte for byte
//! - **Binary-aware**: only bodies that look like text are written to the log
//! - **Transparent gzip preview**: gzip responses are decoded for the log line only, the
//!   caller still receives the compressed bytes
//! - **Failure-transparent**: transport errors are logged with their cause chain and
//!   returned unchanged
//! - **Extensible**: log lines go to any [`ExchangeSink`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use http_body_util::Full;
//! use hyper_util::client::legacy::Client;
//! use hyper_util::rt::TokioExecutor;
//! use tower::{ServiceBuilder, ServiceExt};
//! use traffic_tap::{ExchangeLoggerConfig, ExchangeLoggerLayer, LoggingSink};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     tracing_subscriber::fmt::init();
//!
//!     let client = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();
//!     let client = ServiceBuilder::new()
//!         .layer(ExchangeLoggerLayer::new(ExchangeLoggerConfig::default(), LoggingSink))
//!         .service(client);
//!
//!     let request = http::Request::get("http://localhost:3000/hello")
//!         .header("accept", "text/plain")
//!         .body(Full::new(Bytes::new()))?;
//!     let response = client.oneshot(request).await?;
//!     println!("status: {}", response.status());
//!     Ok(())
//! }
//! ```
//!
//! ## Custom Sinks
//!
//! Implement the [`ExchangeSink`] trait to send log lines somewhere else:
//!
//! ```rust
//! use traffic_tap::{ExchangeSink, types::ExchangeLine};
//!
//! #[derive(Debug)]
//! struct StderrSink;
//!
//! impl ExchangeSink for StderrSink {
//!     fn emit(&self, line: &ExchangeLine) {
//!         eprintln!("{line}");
//!     }
//! }
//! ```

use bytes::Bytes;
use encoding_rs::Encoding;
use futures::future::BoxFuture;
use http::{Request, Response};
use http_body::Body;
use std::{
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};
use tower::{Layer, Service};
use tracing::{debug, debug_span, Instrument};

pub mod types;
use types::ExchangeLine;

pub mod body_wrapper;
pub use body_wrapper::InspectedBody;

pub mod gzip;
pub mod sniff;

pub mod snapshot;
use snapshot::{render_request, render_response, snapshot_request, snapshot_response};

pub mod logging_sink;
pub use logging_sink::LoggingSink;

pub mod multi_sink;
pub use multi_sink::MultiSink;

/// Default upper bound on the size of a decompressed gzip preview.
pub const DEFAULT_MAX_PREVIEW_BYTES: usize = 1024 * 1024;

/// Error building an [`ExchangeLoggerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown charset label: {0}")]
    UnknownCharset(String),
}

/// Configuration for the exchange logging middleware.
///
/// # Examples
///
/// ```rust
/// use traffic_tap::ExchangeLoggerConfig;
///
/// // Default configuration
/// let config = ExchangeLoggerConfig::default();
///
/// // Custom configuration
/// let config = ExchangeLoggerConfig::default()
///     .with_default_charset("iso-8859-1")
///     .unwrap()
///     .with_protocol(true);
/// ```
#[derive(Clone, Debug)]
pub struct ExchangeLoggerConfig {
    /// Charset used for bodies whose content type does not declare one
    pub default_charset: &'static Encoding,
    /// Whether the request summary includes the request's HTTP version
    pub include_protocol: bool,
    /// Gzip previews that would decode to more than this many bytes are omitted
    pub max_preview_bytes: usize,
}

impl Default for ExchangeLoggerConfig {
    fn default() -> Self {
        Self {
            default_charset: encoding_rs::UTF_8,
            include_protocol: false,
            max_preview_bytes: DEFAULT_MAX_PREVIEW_BYTES,
        }
    }
}

impl ExchangeLoggerConfig {
    /// Sets the fallback charset from a WHATWG label such as `"utf-8"` or `"latin1"`.
    pub fn with_default_charset(mut self, label: &str) -> Result<Self, ConfigError> {
        self.default_charset = Encoding::for_label(label.trim().as_bytes())
            .ok_or_else(|| ConfigError::UnknownCharset(label.to_string()))?;
        Ok(self)
    }

    pub fn with_protocol(mut self, include: bool) -> Self {
        self.include_protocol = include;
        self
    }

    pub fn with_max_preview_bytes(mut self, limit: usize) -> Self {
        self.max_preview_bytes = limit;
        self
    }
}

/// Destination for rendered exchange lines.
///
/// `emit` is called once per exchange, synchronously, from the task driving the
/// request. Implementations must not assume any particular thread.
pub trait ExchangeSink: Send + Sync + 'static {
    /// Receives the complete line for one exchange.
    fn emit(&self, line: &ExchangeLine);
}

impl<K: ExchangeSink + ?Sized> ExchangeSink for Arc<K> {
    fn emit(&self, line: &ExchangeLine) {
        (**self).emit(line)
    }
}

/// Tower layer for the exchange logging middleware.
///
/// # Examples
///
/// ```rust
/// use traffic_tap::{ExchangeLoggerConfig, ExchangeLoggerLayer, LoggingSink};
/// use tower::ServiceBuilder;
///
/// let layer = ExchangeLoggerLayer::new(ExchangeLoggerConfig::default(), LoggingSink);
/// let builder = ServiceBuilder::new().layer(layer);
/// ```
pub struct ExchangeLoggerLayer<K> {
    config: Arc<ExchangeLoggerConfig>,
    sink: Arc<K>,
}

impl<K: ExchangeSink> ExchangeLoggerLayer<K> {
    pub fn new(config: ExchangeLoggerConfig, sink: K) -> Self {
        Self {
            config: Arc::new(config),
            sink: Arc::new(sink),
        }
    }
}

impl<K> Clone for ExchangeLoggerLayer<K> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<S, K> Layer<S> for ExchangeLoggerLayer<K> {
    type Service = ExchangeLoggerService<S, K>;

    fn layer(&self, inner: S) -> Self::Service {
        ExchangeLoggerService {
            inner,
            config: self.config.clone(),
            sink: self.sink.clone(),
        }
    }
}

/// Tower service implementation for the exchange logging middleware.
///
/// Holds no per-exchange state: every buffer, segment and timer lives in the future
/// returned by `call`, so any number of calls may run concurrently.
///
/// Users typically don't interact with this type directly - it's created by
/// [`ExchangeLoggerLayer`].
pub struct ExchangeLoggerService<S, K> {
    inner: S,
    config: Arc<ExchangeLoggerConfig>,
    sink: Arc<K>,
}

impl<S: Clone, K> Clone for ExchangeLoggerService<S, K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: self.config.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<S, K, ReqBody, ResBody> Service<Request<ReqBody>> for ExchangeLoggerService<S, K>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: std::error::Error + Send + 'static,
    K: ExchangeSink,
    ReqBody: Body<Data = Bytes> + Clone + Send + 'static,
    ReqBody::Error: std::fmt::Display + Send,
    ResBody: Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Send,
{
    type Response = Response<InspectedBody<ResBody>>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let method = request.method().clone();
        let uri = request.uri().clone();
        let span = debug_span!("exchange", method = %method, uri = %uri);

        let config = self.config.clone();
        let sink = self.sink.clone();

        // Snapshot works on a clone of the body; the request goes to the transport as-is.
        let request_snapshot = snapshot_request(
            &method,
            &uri,
            request.version(),
            request.headers(),
            request.body(),
            &config,
        );

        let future = self.inner.call(request);

        Box::pin(
            async move {
                let request_view = request_snapshot.await;
                let mut line = ExchangeLine::default();
                line.extend(render_request(&request_view, &config));

                debug!("Awaiting inner service response");
                let started = Instant::now();
                match future.await {
                    Ok(response) => {
                        let elapsed_ms = started.elapsed().as_millis();
                        let (response, response_view) =
                            snapshot_response(response, &method, &uri, elapsed_ms, &config).await;
                        line.extend(render_response(&response_view, &config));

                        debug!(
                            status = %response_view.status,
                            elapsed_ms = elapsed_ms as u64,
                            "Exchange completed"
                        );
                        sink.emit(&line);
                        Ok(response)
                    }
                    Err(e) => {
                        line.push(format!("response:[HTTPFAILED, {}]", cause_chain(&e)));

                        debug!(error = %e, "Exchange failed");
                        sink.emit(&line);
                        Err(e)
                    }
                }
            }
            .instrument(span),
        )
    }
}

/// Renders an error followed by each of its sources, separated by `": "`.
pub fn cause_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
