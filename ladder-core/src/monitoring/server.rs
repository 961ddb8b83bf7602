//! HTTP endpoint exposing the metrics registry for Prometheus scraping.

use super::EngineMetrics;
use anyhow::{Context, Result};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    pub listen_addr: SocketAddr,
    pub metrics_path: String,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9464)),
            metrics_path: "/metrics".to_string(),
        }
    }
}

pub struct MetricsServer {
    config: MetricsServerConfig,
    metrics: EngineMetrics,
}

impl MetricsServer {
    pub fn new(config: MetricsServerConfig, metrics: EngineMetrics) -> Self {
        Self { config, metrics }
    }

    /// Serve forever. Spawn on its own task.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .context("failed to bind metrics server")?;
        info!(
            "metrics server listening on http://{}{}",
            self.config.listen_addr, self.config.metrics_path
        );

        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "metrics accept failed");
                    continue;
                }
            };
            let metrics = self.metrics.clone();
            let path = self.config.metrics_path.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let metrics = metrics.clone();
                    let path = path.clone();
                    async move { handle(req, metrics, path) }
                });
                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(remote = %remote, error = %err, "metrics connection error");
                }
            });
        }
    }
}

fn handle(
    req: Request<hyper::body::Incoming>,
    metrics: EngineMetrics,
    path: String,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    if req.uri().path() != path {
        return Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from_static(b"not found")))
            .unwrap_or_default());
    }
    Ok(render(&metrics))
}

fn render(metrics: &EngineMetrics) -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let families = metrics.registry().gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buf) {
        error!(error = %e, "metrics encode failed");
        return Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Full::new(Bytes::from_static(b"encode error")))
            .unwrap_or_default();
    }
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", encoder.format_type())
        .body(Full::new(Bytes::from(buf)))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_produces_text_exposition() {
        let metrics = EngineMetrics::new().unwrap();
        metrics.orders_canceled.inc();
        let resp = render(&metrics);
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
