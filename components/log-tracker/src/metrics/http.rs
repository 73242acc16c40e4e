// External crates
use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    body::Incoming,
    header::CONTENT_TYPE,
    http::{Method, Request, Response, StatusCode},
    service::service_fn,
};
use hyper_util::{rt::TokioExecutor, server::conn::auto::Builder as HyperServerBuilder};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Render every registered collector in the prometheus text format.
pub fn render_metrics() -> Result<(String, Vec<u8>)> {
    let metric_families = prometheus::gather();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("Failed to encode prometheus metrics")?;

    Ok((encoder.format_type().to_string(), buffer))
}

#[instrument(
    name = "metrics_server::handler",
    target = "metrics::http",
    skip_all,
    level = "debug"
)]
async fn handle(req: Request<Incoming>) -> hyper::http::Result<Response<Full<Bytes>>> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => match render_metrics() {
            Ok((content_type, body)) => {
                tracing::debug!(body_len = body.len(), "Serving /metrics");
                Response::builder()
                    .header(CONTENT_TYPE, content_type)
                    .body(Full::new(Bytes::from(body)))
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to render metrics");
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Full::new(Bytes::from_static(b"Internal Server Error")))
            }
        },
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from_static(b"Not Found"))),
    }
}

/// Bind `addr` and serve `/metrics` until `cancel` fires.
#[instrument(
    name = "metrics_server::serve",
    target = "metrics::http",
    skip_all,
    level = "debug"
)]
pub async fn start_metrics_server(addr: SocketAddr, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics endpoint on {addr}"))?;

    tracing::info!(
        metrics_endpoint = %addr,
        "Log tracker metrics available at http://{addr}/metrics"
    );

    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept metrics connection");
                    continue;
                }
            },
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        tokio::spawn(async move {
            if let Err(err) = HyperServerBuilder::new(TokioExecutor::new())
                .serve_connection(io, service_fn(handle))
                .await
            {
                tracing::error!(error = %err, peer = %peer, "Metrics connection error");
            }
        });
    }

    tracing::debug!("Metrics server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::metrics::CHECK_CYCLES_TOTAL;

    #[test]
    fn render_includes_registered_collectors() {
        CHECK_CYCLES_TOTAL.with_label_values(&["render-test"]).inc();

        let (content_type, body) = render_metrics().unwrap();
        let body = String::from_utf8(body).unwrap();

        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("logtracker_check_cycles_total"));
        assert!(body.contains("render-test"));
    }
}
