use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tower::{ServiceBuilder, ServiceExt};
use tracing::{info, Level};
use traffic_tap::{
    types::ExchangeLine, ExchangeLoggerConfig, ExchangeLoggerLayer, ExchangeSink, LoggingSink,
    MultiSink,
};

/// Sink that keeps the last few lines in memory, in addition to logging them
#[derive(Debug, Clone, Default)]
struct RecentLines {
    lines: Arc<Mutex<Vec<String>>>,
}

impl ExchangeSink for RecentLines {
    fn emit(&self, line: &ExchangeLine) {
        let mut lines = self.lines.lock().unwrap();
        lines.push(line.to_string());
        if lines.len() > 10 {
            lines.remove(0);
        }
    }
}

async fn hello() -> &'static str {
    "Hello, World!"
}

async fn echo(body: Bytes) -> impl IntoResponse {
    format!("Echo: {}", String::from_utf8_lossy(&body))
}

async fn image() -> impl IntoResponse {
    // PNG signature followed by junk, enough to look binary
    let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00];
    png.extend_from_slice(&[0u8; 54]);
    Response::builder()
        .header(header::CONTENT_TYPE, "image/png")
        .body(Body::from(png))
        .unwrap()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let app = Router::new()
        .route("/hello", get(hello))
        .route("/echo", post(echo))
        .route("/image.png", get(image));

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });
    info!("Demo server listening on {}", addr);

    let recent = RecentLines::default();
    let sink = MultiSink::new().with(LoggingSink).with(recent.clone());
    let config = ExchangeLoggerConfig::default().with_protocol(true);

    let client = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();
    let client = ServiceBuilder::new()
        .layer(ExchangeLoggerLayer::new(config, sink))
        .service(client);

    let requests = vec![
        http::Request::get(format!("http://{addr}/hello"))
            .header(header::ACCEPT, "text/plain")
            .body(Full::new(Bytes::new()))?,
        http::Request::post(format!("http://{addr}/echo"))
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Full::new(Bytes::from("hello from the demo")))?,
        http::Request::get(format!("http://{addr}/image.png")).body(Full::new(Bytes::new()))?,
    ];

    for request in requests {
        let response = client.clone().oneshot(request).await?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();
        info!(%status, received = body.len(), "Caller received response");
    }

    let unreachable = http::Request::get("http://127.0.0.1:9/")
        .body(Full::new(Bytes::new()))?;
    if let Err(e) = client.oneshot(unreachable).await {
        info!(error = %e, "Caller received transport error");
    }

    info!("Captured {} exchange lines", recent.lines.lock().unwrap().len());
    Ok(())
}
